//! # pairlink-core
//!
//! State machine and collaborator ports for linking a new device to a
//! messaging account via a scannable code.
//!
//! The crate manages exactly one login attempt at a time, process-wide. An
//! attempt is a short-lived record (scannable code, transport session,
//! freshness window) that a caller drives with two operations:
//!
//! - [`LinkDeviceUseCase::start`] obtains and renders a linking code,
//! - [`LinkDeviceUseCase::wait_for_completion`] polls until the attempt
//!   settles (linked, failed, logged out) or the caller's budget lapses.
//!
//! Both operations return plain result records; every transport, timeout,
//! and render failure is folded into the returned message rather than
//! surfaced as an error.
//!
//! All I/O lives behind traits ([`Transport`], [`TransportHandle`],
//! [`CredentialStore`], [`CodeRenderer`], [`Notifier`]); this crate has no
//! network, file, or terminal dependencies of its own.

pub mod application;
pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `pairlink_core::LinkDeviceUseCase` instead of the full module path.
pub use application::link_device::{
    CodeRenderer, CredentialStore, LinkDeviceUseCase, StartOptions, Transport, WaitOptions,
};
pub use application::session_store::{LoginAttempt, LoginSessionStore, Notifier, TransportHandle};
pub use domain::linking::{
    AttemptId, LinkError, LinkedIdentity, StartOutcome, TransportFailure, WaitOutcome,
};
