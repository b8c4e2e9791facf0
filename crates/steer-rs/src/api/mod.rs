//! Backend interaction layer: the [`Backend`] seam and error classification.
//!
//! - [`backend`]: the dyn-compatible [`Backend`] trait, its
//!   [`ChatClient`](crate::ChatClient) implementation, [`FnBackend`] for
//!   closures, and [`complete_within`] for per-call deadlines.
//! - [`error`]: [`BackendError`] with a [`BackendErrorKind`] that separates
//!   credential, rate-limit and quota failures from transient ones.

pub mod backend;
pub mod error;

pub use backend::{Backend, BackendFuture, FnBackend, complete_within};
pub use error::{BackendError, BackendErrorKind, classify_http};
