//! Purpose: Shared core library crate used by the `gravel` server binary and tests.
//! Exports: `core` (keys, values, storage, transactions, errors), `api`
//! (wire envelopes, validation, dispatch), `serve` (HTTP/JSONL server).
//! Role: Internal library backing the binary; not yet a stable public SDK.
//! Invariants: All storage access goes through `core::store::Store`.
//! Invariants: The dispatcher never executes an operation that failed validation.
pub mod api;
pub mod core;
pub mod serve;
