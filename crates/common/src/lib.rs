//! Shared identifiers and interface identity for the component runtime.

pub mod code;
pub mod interface;
pub mod types;

pub use code::ErrorCode;
pub use interface::{ErasedHandle, InterfaceId};
pub use types::{ComponentId, ContextId, TransactionId};
