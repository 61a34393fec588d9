//! Wire-level building blocks for talking to objects that live inside a
//! CEP panel's JavaScript runtime.

pub mod codec;
pub mod error;
pub mod handle;
pub mod ids;
pub mod msg;

pub use codec::{
    decode_payload, decode_request, decode_response, decode_result, encode_payload,
    encode_request, encode_response,
};
pub use error::{ErrorCode, RpcError};
pub use handle::{is_handle, RemoteHandle, ENUMERATOR_TAG, UNIQUE_ID_KEY};
pub use ids::{CallId, CallIdAllocator, Uid};
pub use msg::{channel, Method, Request, Response, JSONRPC_VERSION};
