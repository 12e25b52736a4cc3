//! LinkDeviceUseCase: drives one device-linking attempt end to end.
//!
//! This use case is the heart of PairLink. `start` obtains a scannable
//! linking code from the transport and installs the attempt in the
//! [`LoginSessionStore`]; `wait_for_completion` polls the attempt's state
//! machine until a terminal outcome or the caller's budget runs out.
//!
//! ```text
//!   start()                              wait_for_completion()
//!     │                                    │
//!     ├─ already linked? ─► message        ├─ no attempt ──► "no login"
//!     ├─ fresh artifact? ─► reuse it       ├─ stale ───────► dispose, "expired"
//!     ├─ reset store, open session         ├─ error 515 ───► silent restart, once
//!     ├─ race code vs. budget              ├─ error 401 ───► clear credentials
//!     └─ install attempt, render code      ├─ other error ─► dispose, failure
//!                                          ├─ connected ───► dispose, success
//!                                          └─ awaiting ────► park, loop
//! ```
//!
//! # Architecture
//!
//! The use case depends only on traits ([`Transport`], [`CredentialStore`],
//! [`CodeRenderer`], [`Notifier`]) plus the session store. All infrastructure
//! implementations are injected at construction time, making the whole state
//! machine unit-testable with scripted doubles.
//!
//! # Concurrency rule
//!
//! Each transport handle gets one spawned watcher that awaits its ready
//! signal. The watcher captures the attempt id at spawn time and re-checks it
//! under the slot lock before writing a terminal marker, so a watcher that
//! outlives its attempt is a guaranteed no-op. This identity guard is the
//! principal race-safety mechanism; the slot mutex only makes each
//! inspect-and-mutate step atomic.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::{timeout, timeout_at};
use tracing::{debug, warn};

use crate::application::session_store::{
    LoginAttempt, LoginSessionStore, Notifier, TransportHandle,
};
use crate::domain::linking::{
    code_wait_budget, completion_wait_budget, AttemptId, LinkError, LinkedIdentity, StartOutcome,
    WaitOutcome, STATUS_LOGGED_OUT, STATUS_RESTART_REQUIRED,
};

/// Prompt shown alongside a freshly rendered (or reused) linking artifact.
const SCAN_PROMPT: &str = "Scan this QR code to link this device (valid for about 3 minutes).";

/// Returned when `wait_for_completion` finds no attempt to wait on.
const NO_LOGIN_IN_PROGRESS: &str = "No login in progress.";

/// Returned when the attempt outlived its usable window.
const CODE_EXPIRED: &str = "QR expired. Start a new login to get a fresh code.";

/// Returned when the poll budget lapsed with the attempt still pending.
const STILL_WAITING: &str = "Still waiting for the link to complete. Try again in a moment.";

/// Returned when the account was unlinked from the primary device.
const LOGGED_OUT: &str = "Logged out. Scan a new QR code to relink.";

/// Returned when the device finished linking.
const LINKED: &str = "✅ Linked! This device is now connected.";

/// Opens transport sessions against the messaging network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a session.
    ///
    /// `resume_existing` asks the network to pick up the registration this
    /// attempt already started (set by the silent restart path). When
    /// `linking_code_tx` is supplied, the transport sends the first linking
    /// code the network issues through it; the restart path passes `None`
    /// because the code was already delivered.
    async fn open_session(
        &self,
        resume_existing: bool,
        verbose: bool,
        linking_code_tx: Option<oneshot::Sender<String>>,
    ) -> Result<Arc<dyn TransportHandle>, String>;
}

/// Persisted-credential queries the linking flow needs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns `true` when a previous attempt already linked this device.
    async fn has_credentials(&self) -> bool;

    /// Resolves the linked account identity, when one can be read back.
    async fn identity(&self) -> Option<LinkedIdentity>;

    /// Removes persisted credentials (called on the logged-out outcome).
    async fn clear(&self) -> Result<(), String>;
}

/// Renders a linking code into a displayable artifact.
#[cfg_attr(test, mockall::automock)]
pub trait CodeRenderer: Send + Sync {
    /// Returns a base64 `data:` URI the caller can display or save.
    fn render(&self, code: &str) -> Result<String, String>;
}

/// Options accepted by [`LinkDeviceUseCase::start`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Log transport frames while the session is open.
    pub verbose: bool,
    /// Linking-code wait budget in milliseconds (floor 5000, default 30000).
    pub timeout_ms: Option<u64>,
    /// Open a new attempt even when credentials are already persisted.
    pub force: bool,
}

/// Options accepted by [`LinkDeviceUseCase::wait_for_completion`].
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Completion wait budget in milliseconds (floor 1000, default 120000).
    pub timeout_ms: Option<u64>,
}

/// What one inspection of the slot tells the completion poller to do.
enum Verdict {
    NoAttempt,
    Stale,
    Connected,
    LoggedOut,
    Restart,
    Failed(String),
    Awaiting,
}

/// The two public linking operations, wired to injected collaborators.
///
/// Both operations always return a result record; transport, timeout, and
/// render failures are captured into the returned message and never escape
/// as errors.
pub struct LinkDeviceUseCase {
    store: Arc<LoginSessionStore>,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    renderer: Arc<dyn CodeRenderer>,
    notifier: Arc<dyn Notifier>,
}

impl LinkDeviceUseCase {
    /// Creates the use case from its collaborators.
    pub fn new(
        store: Arc<LoginSessionStore>,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        renderer: Arc<dyn CodeRenderer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { store, transport, credentials, renderer, notifier }
    }

    /// Starts (or re-polls) a linking attempt.
    ///
    /// Returns exactly one of: an "already linked" message, the artifact of a
    /// fresh attempt that is still pending, a newly rendered artifact, or a
    /// failure message. Repeated calls while a code is pending reuse the
    /// existing attempt instead of opening a second transport session.
    pub async fn start(&self, options: StartOptions) -> StartOutcome {
        if !options.force && self.credentials.has_credentials().await {
            let message = match self.credentials.identity().await.and_then(|who| who.display_id)
            {
                Some(display) => {
                    format!("Already linked as {display}. Start again with force to relink.")
                }
                None => "Already linked. Start again with force to relink.".to_string(),
            };
            return StartOutcome { artifact: None, message };
        }

        // A fresh attempt that already rendered its code is returned as-is,
        // so polling `start` never multiplies transport sessions.
        {
            let slot = self.store.current.lock().await;
            if let Some(attempt) = slot.as_ref() {
                if attempt.is_fresh() {
                    if let Some(artifact) = attempt.artifact.clone() {
                        return StartOutcome {
                            artifact: Some(artifact),
                            message: SCAN_PROMPT.to_string(),
                        };
                    }
                }
            }
        }

        match self.begin_new_attempt(&options).await {
            Ok(outcome) => outcome,
            Err(error) => StartOutcome {
                artifact: None,
                message: format!("Failed to get QR: {error}"),
            },
        }
    }

    /// Opens a session, waits for its linking code, and installs the attempt.
    ///
    /// Every failure path resets the store before returning, so a failed
    /// start never leaves a dangling attempt behind.
    async fn begin_new_attempt(&self, options: &StartOptions) -> Result<StartOutcome, LinkError> {
        // Whatever occupied the slot (stale attempt, codeless attempt) is
        // superseded by this call.
        self.store.reset(None).await;

        let (code_tx, code_rx) = oneshot::channel();
        let handle = match self
            .transport
            .open_session(false, options.verbose, Some(code_tx))
            .await
        {
            Ok(handle) => handle,
            Err(reason) => {
                self.store.reset(None).await;
                return Err(LinkError::Open(reason));
            }
        };

        let budget = code_wait_budget(options.timeout_ms);
        let code = match timeout(budget, code_rx).await {
            Ok(Ok(code)) => code,
            Ok(Err(_)) => {
                handle.close().await;
                self.store.reset(None).await;
                return Err(LinkError::CodeChannelClosed);
            }
            Err(_) => {
                handle.close().await;
                self.store.reset(None).await;
                return Err(LinkError::CodeTimeout(budget));
            }
        };

        let mut attempt = LoginAttempt::new(Arc::clone(&handle));
        attempt.linking_code = Some(code.clone());
        let attempt_id = attempt.id;
        debug!("installing login attempt {}", attempt_id);

        let displaced = { self.store.current.lock().await.replace(attempt) };
        if let Some(displaced) = displaced {
            self.store.dispose(displaced).await;
        }
        self.attach_completion_watch(attempt_id, handle);

        let artifact = match self.renderer.render(&code) {
            Ok(artifact) => artifact,
            Err(reason) => {
                self.store.reset(None).await;
                return Err(LinkError::Render(reason));
            }
        };

        // Store the artifact only while this attempt still owns the slot.
        {
            let mut slot = self.store.current.lock().await;
            if let Some(current) = slot.as_mut() {
                if current.id == attempt_id {
                    current.artifact = Some(artifact.clone());
                }
            }
        }

        Ok(StartOutcome { artifact: Some(artifact), message: SCAN_PROMPT.to_string() })
    }

    /// Polls the current attempt until it settles or `timeout_ms` lapses.
    ///
    /// Status 515 from the transport is a protocol-level "reconnect and
    /// retry" hint, not a real failure; it is absorbed by one silent restart
    /// per attempt. Every other settled error, a second 515, staleness, and
    /// the logged-out status are terminal and dispose the attempt. A lapsed
    /// budget leaves the attempt alive for a later poll.
    pub async fn wait_for_completion(&self, options: WaitOptions) -> WaitOutcome {
        let budget = completion_wait_budget(options.timeout_ms);
        let deadline = tokio::time::Instant::now() + budget;

        loop {
            // Subscribe before inspecting the slot: a settle edge landing
            // between inspection and parking must not be lost.
            let settled = self.store.settled();
            tokio::pin!(settled);
            settled.as_mut().enable();

            let mut slot = self.store.current.lock().await;
            let verdict = match slot.as_ref() {
                None => Verdict::NoAttempt,
                Some(attempt) if !attempt.is_fresh() => Verdict::Stale,
                Some(attempt) if attempt.connected => Verdict::Connected,
                Some(attempt) => match (attempt.error.as_ref(), attempt.error_status) {
                    (Some(_), Some(STATUS_LOGGED_OUT)) => Verdict::LoggedOut,
                    (Some(_), Some(STATUS_RESTART_REQUIRED)) if !attempt.restart_attempted => {
                        Verdict::Restart
                    }
                    (Some(error), _) => Verdict::Failed(error.clone()),
                    (None, _) => Verdict::Awaiting,
                },
            };

            match verdict {
                Verdict::NoAttempt => {
                    return WaitOutcome {
                        connected: false,
                        message: NO_LOGIN_IN_PROGRESS.to_string(),
                    };
                }
                Verdict::Stale => {
                    let taken = slot.take();
                    drop(slot);
                    if let Some(attempt) = taken {
                        self.store.dispose(attempt).await;
                    }
                    return WaitOutcome { connected: false, message: CODE_EXPIRED.to_string() };
                }
                Verdict::Connected => {
                    let taken = slot.take();
                    drop(slot);
                    if let Some(attempt) = taken {
                        self.store.dispose(attempt).await;
                    }
                    self.notifier.success(LINKED);
                    return WaitOutcome { connected: true, message: LINKED.to_string() };
                }
                Verdict::LoggedOut => {
                    let taken = slot.take();
                    drop(slot);
                    if let Err(reason) = self.credentials.clear().await {
                        warn!("could not clear persisted credentials: {}", reason);
                    }
                    if let Some(attempt) = taken {
                        self.store.dispose(attempt).await;
                    }
                    self.notifier.danger(LOGGED_OUT);
                    return WaitOutcome { connected: false, message: LOGGED_OUT.to_string() };
                }
                Verdict::Failed(error) => {
                    let taken = slot.take();
                    drop(slot);
                    if let Some(attempt) = taken {
                        self.store.dispose(attempt).await;
                    }
                    let message = format!("Login failed: {error}");
                    self.notifier.danger(&message);
                    return WaitOutcome { connected: false, message };
                }
                Verdict::Restart => {
                    let Some(attempt) = slot.as_mut() else {
                        continue;
                    };
                    debug!("restarting transport for login attempt {}", attempt.id);
                    attempt.restart_attempted = true;
                    attempt.error = None;
                    attempt.error_status = None;

                    // The slot lock is held across the reopen so no other
                    // path observes the half-cleared attempt.
                    let old = Arc::clone(&attempt.transport);
                    old.close().await;
                    match self.transport.open_session(true, false, None).await {
                        Ok(new_handle) => {
                            attempt.transport = Arc::clone(&new_handle);
                            if attempt.is_fresh() {
                                let id = attempt.id;
                                drop(slot);
                                self.attach_completion_watch(id, new_handle);
                                continue;
                            }
                            // The linking window lapsed while reconnecting.
                            let taken = slot.take();
                            drop(slot);
                            if let Some(attempt) = taken {
                                self.store.dispose(attempt).await;
                            }
                            let message =
                                "Login failed: linking window expired during reconnect"
                                    .to_string();
                            self.notifier.danger(&message);
                            return WaitOutcome { connected: false, message };
                        }
                        Err(reason) => {
                            let taken = slot.take();
                            drop(slot);
                            if let Some(attempt) = taken {
                                self.store.dispose(attempt).await;
                            }
                            let message =
                                format!("Login failed: {}", LinkError::Open(reason));
                            self.notifier.danger(&message);
                            return WaitOutcome { connected: false, message };
                        }
                    }
                }
                Verdict::Awaiting => {
                    drop(slot);
                    if timeout_at(deadline, settled).await.is_err() {
                        return WaitOutcome {
                            connected: false,
                            message: STILL_WAITING.to_string(),
                        };
                    }
                }
            }
        }
    }

    /// Spawns the watcher that carries `handle`'s verdict into the slot.
    ///
    /// The watcher captures `attempt_id` and compares it against the slot's
    /// current occupant before mutating anything, so a watcher whose attempt
    /// was superseded or disposed changes nothing.
    fn attach_completion_watch(&self, attempt_id: AttemptId, handle: Arc<dyn TransportHandle>) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let verdict = handle.ready().await;
            let mut slot = store.current.lock().await;
            let Some(attempt) = slot.as_mut() else {
                return;
            };
            if attempt.id != attempt_id {
                debug!("ignoring verdict for superseded login attempt {}", attempt_id);
                return;
            }
            match verdict {
                Ok(()) => attempt.connected = true,
                Err(failure) => {
                    attempt.error = Some(failure.to_string());
                    attempt.error_status = failure.status;
                }
            }
            drop(slot);
            store.mark_settled();
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
