//! Purpose: Define the operation-shaped API boundary for gravel.
//! Exports: Wire envelopes, the request validator, and the dispatcher.
//! Role: Everything the transport layer needs; storage internals stay behind
//! `core::store::Store`.
//! Invariants: Responses are only ever produced through `dispatch`.

mod dispatch;
mod request;
mod validation;

pub use dispatch::dispatch;
pub use request::{
    ItemRequest, ItemResponse, Operation, ResponseBody, StreamError, WriteOperation,
};
pub use validation::{RANGE_PLACEHOLDER, validate_request};
