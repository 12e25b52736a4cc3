//! Device-linking domain rules.
//!
//! A linking attempt is a short-lived, single-use process: the messaging
//! network issues a scannable code, the user scans it from their primary
//! device, and the transport reports a terminal verdict. This module defines
//! the timing rules for that window, the status codes the transport is known
//! to emit, the error taxonomy, and the result records returned to callers.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for one linking attempt, derived from UUID v4.
pub type AttemptId = Uuid;

/// How long a linking attempt stays usable after it was started.
///
/// The remote network expires scannable codes on roughly this horizon, so an
/// older attempt is discarded rather than shown to the user. Staleness is
/// evaluated lazily on access, never by a background timer.
pub const ATTEMPT_TTL: Duration = Duration::from_secs(180);

/// Stream status meaning "reconnect and retry"; transient, not a failure.
pub const STATUS_RESTART_REQUIRED: u16 = 515;

/// Stream status meaning the account was unlinked from the primary device.
pub const STATUS_LOGGED_OUT: u16 = 401;

/// Smallest accepted wait for the linking code to arrive, in milliseconds.
pub const CODE_WAIT_FLOOR_MS: u64 = 5_000;

/// Linking-code wait applied when the caller does not pass a budget.
pub const CODE_WAIT_DEFAULT_MS: u64 = 30_000;

/// Smallest accepted wait for one completion poll, in milliseconds.
pub const COMPLETION_WAIT_FLOOR_MS: u64 = 1_000;

/// Completion-poll wait applied when the caller does not pass a budget.
pub const COMPLETION_WAIT_DEFAULT_MS: u64 = 120_000;

/// Resolves the caller-supplied linking-code budget against floor and default.
pub fn code_wait_budget(timeout_ms: Option<u64>) -> Duration {
    Duration::from_millis(timeout_ms.unwrap_or(CODE_WAIT_DEFAULT_MS).max(CODE_WAIT_FLOOR_MS))
}

/// Resolves the caller-supplied completion-poll budget against floor and default.
pub fn completion_wait_budget(timeout_ms: Option<u64>) -> Duration {
    Duration::from_millis(
        timeout_ms
            .unwrap_or(COMPLETION_WAIT_DEFAULT_MS)
            .max(COMPLETION_WAIT_FLOOR_MS),
    )
}

/// Terminal rejection reported by a transport handle's ready signal.
///
/// Carries the numeric stream status when the gateway sent one; two values
/// have dedicated handling ([`STATUS_RESTART_REQUIRED`] and
/// [`STATUS_LOGGED_OUT`]), everything else is treated as a plain failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportFailure {
    /// Numeric status from the stream error, when one was present.
    pub status: Option<u16>,
    /// Human-readable description of what went wrong.
    pub message: String,
}

impl TransportFailure {
    /// Creates a failure record from a status code and description.
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// Returns `true` for the transient reconnect-and-retry status.
    pub fn is_restart_required(&self) -> bool {
        self.status == Some(STATUS_RESTART_REQUIRED)
    }

    /// Returns `true` when the account was unlinked remotely.
    pub fn is_logged_out(&self) -> bool {
        self.status == Some(STATUS_LOGGED_OUT)
    }
}

/// Errors that can occur while driving a linking attempt.
///
/// None of these escape the public operations: they are rendered into the
/// returned message at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The transport session could not be opened.
    #[error("could not open transport session: {0}")]
    Open(String),

    /// No linking code arrived within the wait budget.
    #[error("no linking code received within {} ms", .0.as_millis())]
    CodeTimeout(Duration),

    /// The transport dropped the code channel without ever emitting a code.
    #[error("transport closed before producing a linking code")]
    CodeChannelClosed,

    /// The linking code could not be rendered into a displayable artifact.
    #[error("could not render linking code: {0}")]
    Render(String),

    /// The transport's ready signal rejected.
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

/// The account identity a previous linking attempt persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkedIdentity {
    /// Display form of the linked account (phone number or handle), if known.
    pub display_id: Option<String>,
}

/// Result record returned by `start`.
///
/// `artifact` is present exactly when a scannable code is pending; `message`
/// is always present and safe to show to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    /// Rendered linking artifact (a base64 `data:` URI), when one is pending.
    pub artifact: Option<String>,
    /// Human-readable outcome line.
    pub message: String,
}

/// Result record returned by `wait_for_completion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitOutcome {
    /// `true` exactly when the device finished linking during this poll.
    pub connected: bool,
    /// Human-readable outcome line.
    pub message: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
