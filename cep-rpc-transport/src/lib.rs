pub mod transport;
pub mod codec;
pub mod memory;
pub mod packet;
pub mod tcp;
pub mod threaded;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use codec::{CodecError, EventLineCodec};
pub use memory::{pair, MemoryPeer, MemoryTransport};
pub use packet::{Packet, SocketPacket};
pub use tcp::TcpTransport;
pub use threaded::ThreadedTransport;
pub use transport::{EventFrame, Transport, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::SocketIoTransport;
