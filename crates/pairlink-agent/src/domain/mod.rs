//! Domain layer for the agent: pure wire-format types, no I/O.

pub mod messages;

pub use messages::{AgentToGatewayMsg, GatewayToAgentMsg};
