pub mod fixtures;
pub mod remote;

pub use fixtures::{HostFn, HostModel, HostObject, Slot};
pub use remote::{FakeRemote, Responder};
