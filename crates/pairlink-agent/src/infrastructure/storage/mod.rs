//! On-disk state for the agent.
//!
//! Two files live side by side in the platform config directory:
//!
//! | File          | Format | Contents                                  |
//! |---------------|--------|-------------------------------------------|
//! | `config.toml` | TOML   | Gateway URL, timeouts, log level          |
//! | `creds.json`  | JSON   | Link credentials written on pair success  |
//!
//! The config file is read once at startup and never written by the linking
//! flow; the credential file is written by the gateway session on a
//! successful pairing and removed on `unlink` or a logged-out verdict.

pub mod config;
pub mod credentials;
