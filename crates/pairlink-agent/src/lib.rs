//! pairlink-agent library crate.
//!
//! Everything the `pairlink-agent` binary needs besides the linking state
//! machine itself, which lives in `pairlink-core` behind collaborator traits.
//! This crate supplies the concrete half of each trait:
//!
//! ```text
//! pairlink-agent (this crate)
//!   ├── domain/            Gateway wire envelopes (JSON message enums)
//!   └── infrastructure/
//!         ├── gateway/     WebSocket session against the link gateway → Transport
//!         ├── storage/     TOML config + JSON credential file → CredentialStore
//!         ├── render/      Linking code → scannable SVG data URI → CodeRenderer
//!         └── notify/      ANSI-coloured terminal output → Notifier
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async; it only describes the wire format.
//! - `infrastructure` depends on `domain`, `pairlink-core`, and the outside
//!   world (`tokio`, `tungstenite`, the file system, the terminal).
//!
//! The binary in `main.rs` wires these adapters into a
//! [`pairlink_core::LinkDeviceUseCase`] and drives it from the CLI.

/// Domain layer: gateway wire message types (no I/O).
pub mod domain;

/// Infrastructure layer: gateway transport, storage, rendering, notification.
pub mod infrastructure;
