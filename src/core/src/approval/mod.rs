//! Approve/cancel flow on the viewing side.
//!
//! [`ApprovalController`] registers requests found by the marker parser,
//! sends commands through an [`ApprovalTransport`] with optimistic status,
//! and hands the call to the synchronizer once the server accepts.

mod context;
mod controller;
mod errors;

pub use context::CallContext;
pub use controller::{ApprovalController, ApprovalOutcome, ApprovalTransport};
pub use errors::{classify, ApprovalError, TransportError, TransportErrorKind};
