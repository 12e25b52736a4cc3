//! The login session store: at most one linking attempt, process-wide.
//!
//! The store owns a single slot (`Mutex<Option<LoginAttempt>>`). Every path
//! that replaces or removes the occupant routes through [`LoginSessionStore`]
//! so the attempt's transport handle is always closed exactly when the
//! attempt leaves the slot. A [`tokio::sync::Notify`] on the store wakes
//! parked completion pollers whenever an attempt settles or is disposed.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::domain::linking::{AttemptId, TransportFailure, ATTEMPT_TTL};
use uuid::Uuid;

/// Live transport session feeding one linking attempt.
///
/// Implementations wrap whatever connection the messaging network requires;
/// the core only needs the terminal verdict and a way to let go.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Resolves when the session reaches its terminal outcome.
    ///
    /// `Ok(())` means the device finished linking. `Err` carries the stream
    /// failure, including the numeric status when the gateway sent one.
    /// Settles at most once; the store awaits it once per handle.
    async fn ready(&self) -> Result<(), TransportFailure>;

    /// Closes the session.
    ///
    /// Idempotent and best-effort: the remote side may already have closed
    /// the connection, so implementations swallow close errors.
    async fn close(&self);
}

/// Severity-tagged sink for user-facing progress lines.
///
/// Distinct from `tracing`: these lines are part of the product surface
/// (shown to the person linking the device), not diagnostics.
pub trait Notifier: Send + Sync {
    /// Neutral progress information.
    fn info(&self, message: &str);
    /// A successful terminal outcome.
    fn success(&self, message: &str);
    /// A failure the user has to act on.
    fn danger(&self, message: &str);
}

/// One in-flight device-linking attempt.
///
/// Mutated in place by the transport watcher and the restart path; replaced
/// wholesale everywhere else.
pub struct LoginAttempt {
    /// Unique token for this attempt, never reused.
    pub id: AttemptId,
    /// Transport session exclusively owned by this attempt.
    pub transport: Arc<dyn TransportHandle>,
    /// When the attempt was created; fixes the freshness window.
    pub started_at: Instant,
    /// The raw linking code, once the transport emitted one.
    pub linking_code: Option<String>,
    /// Rendered scannable artifact. Set at most once per attempt.
    pub artifact: Option<String>,
    /// Terminal success marker. Mutually exclusive with `error`.
    pub connected: bool,
    /// Terminal failure description, when the ready signal rejected.
    pub error: Option<String>,
    /// Numeric stream status attached to `error`, when one was present.
    pub error_status: Option<u16>,
    /// Whether the one-time silent reconnect has been spent.
    pub restart_attempted: bool,
}

impl LoginAttempt {
    /// Creates a fresh attempt owning `transport`, with a new unique id.
    pub fn new(transport: Arc<dyn TransportHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            started_at: Instant::now(),
            linking_code: None,
            artifact: None,
            connected: false,
            error: None,
            error_status: None,
            restart_attempted: false,
        }
    }

    /// Returns `true` while the attempt is inside its usable window.
    ///
    /// Staleness is checked lazily at each access; nothing expires attempts
    /// in the background.
    pub fn is_fresh(&self) -> bool {
        self.started_at.elapsed() < ATTEMPT_TTL
    }
}

/// Holds the process-wide singleton linking attempt.
pub struct LoginSessionStore {
    /// The singleton slot. `None` when no attempt is in flight.
    pub current: Mutex<Option<LoginAttempt>>,
    /// Woken whenever an attempt settles or leaves the slot.
    settled: Notify,
    notifier: Arc<dyn Notifier>,
}

impl LoginSessionStore {
    /// Creates an empty store wired to the given user-facing sink.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            current: Mutex::new(None),
            settled: Notify::new(),
            notifier,
        }
    }

    /// Returns `true` while the slot holds an attempt.
    pub async fn is_active(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Disposes the current attempt, if any, and clears the slot.
    ///
    /// Idempotent: calling with an empty slot does nothing beyond emitting
    /// the optional `reason`. This is the only path that releases a transport
    /// handle still sitting in the slot.
    pub async fn reset(&self, reason: Option<&str>) {
        let taken = self.current.lock().await.take();
        if let Some(reason) = reason {
            self.notifier.info(reason);
        }
        if let Some(attempt) = taken {
            self.dispose(attempt).await;
        }
    }

    /// Closes a taken-out attempt's transport and wakes parked pollers.
    ///
    /// The attempt must already be out of the slot, so the handle is closed
    /// without holding the slot lock.
    pub async fn dispose(&self, attempt: LoginAttempt) {
        debug!("closing transport for login attempt {}", attempt.id);
        attempt.transport.close().await;
        self.settled.notify_waiters();
    }

    /// Signals that the current attempt reached a terminal marker.
    pub fn mark_settled(&self) {
        self.settled.notify_waiters();
    }

    /// Subscribes to the next settle/dispose edge.
    ///
    /// Callers must pin and enable the future before inspecting the slot so
    /// an edge between inspection and parking is not lost.
    pub fn settled(&self) -> Notified<'_> {
        self.settled.notified()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
