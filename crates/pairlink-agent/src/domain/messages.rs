//! JSON message types for the link-gateway WebSocket protocol.
//!
//! The gateway speaks newline-free JSON text frames. Every frame is a JSON
//! object with a `"type"` field naming the variant in kebab-case; all other
//! fields sit beside it in the same object:
//!
//! ```json
//! {"type":"qr","code":"2@kXv9…"}
//! {"type":"pair-success","device":"+15551234567"}
//! {"type":"stream-error","status":515}
//! ```
//!
//! Serde's `#[serde(tag = "type", rename_all = "kebab-case")]` produces this
//! representation automatically.
//!
//! # Why separate agent→gateway and gateway→agent message types?
//!
//! The two directions carry different information: the agent only ever sends
//! its `hello` introduction, while the gateway streams linking events back.
//! Two distinct enums make it a compile-time error to send a gateway-only
//! message from the agent, and vice versa.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Agent → Gateway messages ──────────────────────────────────────────────────

/// Messages the agent sends to the link gateway.
///
/// # Serde representation
///
/// ```json
/// {"type":"hello","device_id":"0c6c5a…","resume":false}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentToGatewayMsg {
    /// The first frame on every session: introduces the device registration
    /// this session is about.
    Hello {
        /// UUID v4 identifying the registration this device is opening.
        ///
        /// A fresh id starts a new registration; repeating an id with
        /// `resume = true` asks the gateway to pick up the one already in
        /// flight (the reconnect path after a restart-required error).
        device_id: Uuid,

        /// `true` to resume the registration `device_id` already started
        /// instead of opening a new one.
        resume: bool,
    },
}

// ── Gateway → Agent messages ──────────────────────────────────────────────────

/// Messages the gateway streams back over an open session.
///
/// # Serde representation
///
/// ```json
/// {"type":"qr","code":"2@kXv9…"}
/// {"type":"pair-success","device":"+15551234567"}
/// {"type":"stream-error","status":515,"message":"restart required"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayToAgentMsg {
    /// A linking code the user's primary device can scan.
    ///
    /// The gateway may send several of these while a session is open (codes
    /// rotate before they expire); the agent only consumes the first.
    Qr {
        /// Opaque linking-code payload to render into a scannable artifact.
        code: String,
    },

    /// The primary device scanned the code and approved the link.
    PairSuccess {
        /// Account handle the device is now linked to, e.g. a phone number.
        device: String,
    },

    /// The session failed; no further frames follow.
    StreamError {
        /// Protocol status code, when the gateway has one. `515` means
        /// "reconnect and retry", `401` means the account logged this
        /// device out.
        status: Option<u16>,
        /// Human-readable detail, when the gateway provides one.
        message: Option<String>,
    },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
