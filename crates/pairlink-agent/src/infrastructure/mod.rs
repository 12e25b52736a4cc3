//! Infrastructure layer for pairlink-agent.
//!
//! Concrete implementations of the collaborator traits `pairlink-core`
//! defines, plus the config file the binary reads at startup.
//!
//! # Responsibilities
//!
//! - Dialling the link gateway over WebSocket and pumping its frames
//!   ([`gateway`] → `Transport` / `TransportHandle`)
//! - Loading and saving the agent's TOML config ([`storage::config`])
//! - Persisting link credentials as JSON ([`storage::credentials`] →
//!   `CredentialStore`)
//! - Turning linking codes into scannable artifacts ([`render`] →
//!   `CodeRenderer`)
//! - Writing severity-tagged lines to the user's terminal ([`notify`] →
//!   `Notifier`)
//!
//! # What does NOT belong here?
//!
//! - The linking state machine (that is `pairlink-core`)
//! - Wire message definitions (that is the `domain` module)
//! - CLI parsing (that is done in `main.rs`)

pub mod gateway;
pub mod notify;
pub mod render;
pub mod storage;

// Re-export the concrete adapters so `main.rs` can wire them up concisely.
pub use gateway::WsGateway;
pub use notify::ConsoleNotifier;
pub use render::SvgCodeRenderer;
pub use storage::credentials::FileCredentialStore;
