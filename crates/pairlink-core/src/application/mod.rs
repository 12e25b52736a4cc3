//! Application layer use cases for device linking.
//!
//! # What lives here (for beginners)
//!
//! The *application* layer sits between the domain (pure rules) and the
//! infrastructure (network, storage, terminal). Code in this layer:
//!
//! - **Orchestrates** the linking attempt through its state machine.
//! - **Depends on abstractions** (traits) rather than concrete
//!   implementations, so the gateway transport, credential file, renderer,
//!   and notifier can all be swapped without touching this code.
//! - **Contains no network I/O and no file system access** of its own.
//!
//! # Sub-modules
//!
//! - **`session_store`** – The process-wide singleton slot holding at most
//!   one [`session_store::LoginAttempt`], plus the collaborator traits the
//!   store itself needs (transport handle, notifier).
//!
//! - **`link_device`** – The two public operations, `start` and
//!   `wait_for_completion`, and the transport watcher that carries each
//!   session's verdict into the slot.

pub mod link_device;
pub mod session_store;
