//! The client connection/request state machine.
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ Disconnected │◄───────────────┐
//!                 └──────────────┘                │
//!                        │                        │
//!                        │ connect(host, port)    │
//!                        ▼                        │
//!                 ┌──────────────┐  error /       │
//!    ┌───────────►│  Connecting  │  mismatch──────┤
//!    │            └──────────────┘                │
//!    │                   │                        │
//!    │ connect           │ resolved ok            │
//!    │                   ▼                        │
//!    │            ┌──────────────┐  endpoint down │
//!    └────────────│   Running    │────────────────┘
//!                 └──────────────┘
//! ```
//!
//! The machine is a pure transition function: it consumes one [`Event`]
//! at a time from its ordered input stream and returns the [`Effect`]s
//! the driver must perform. It never touches a socket, a clock, or a
//! task — which is what makes every transition testable in isolation.

use std::time::Duration;

use tracing::trace;

use crate::message::Task;
use crate::network::endpoint::{EndpointHandle, EndpointId};
use crate::state::queue::{Submission, TaskQueue};

// ── Phase ────────────────────────────────────────────────────────

/// The current phase of the client lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// No server. Submissions buffer. Initial state.
    #[default]
    Disconnected,

    /// A resolve call is in flight for this address.
    Connecting { host: String, port: u16 },

    /// Connected; submissions dispatch immediately.
    Running { server: EndpointHandle },
}

impl Phase {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting { .. } => write!(f, "Connecting"),
            Self::Running { .. } => write!(f, "Running"),
        }
    }
}

// ── Events and effects ───────────────────────────────────────────

/// Everything that can arrive on the machine's single input stream.
///
/// Commands (`Submit`, `Connect`) come from the front end; the rest are
/// completions fed back by the driver's spawned work.
#[derive(Debug, Clone)]
pub enum Event {
    /// Submit a task; buffered or dispatched depending on phase.
    Submit(Submission),
    /// Connect to a (new) server address.
    Connect { host: String, port: u16 },
    /// The resolver produced an endpoint (possibly with missing
    /// capabilities).
    Resolved {
        endpoint: EndpointHandle,
        mismatches: Vec<String>,
    },
    /// The resolver failed outright.
    ResolveFailed {
        host: String,
        port: u16,
        reason: String,
    },
    /// A dispatched request completed with a value.
    RequestSucceeded {
        endpoint: EndpointId,
        task: Task,
        value: i64,
    },
    /// A dispatched request failed or timed out.
    RequestFailed {
        endpoint: EndpointId,
        submission: Submission,
        reason: String,
    },
    /// The failure detector reports an endpoint as unreachable.
    EndpointDown { endpoint: EndpointId },
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start resolving; the driver suspends the event loop on this one
    /// call until the resolver answers.
    Resolve { host: String, port: u16 },
    /// Watch the endpoint and feed `EndpointDown` when it dies.
    Monitor { endpoint: EndpointHandle },
    /// Issue the request; feed back `RequestSucceeded`/`RequestFailed`.
    Dispatch {
        endpoint: EndpointHandle,
        submission: Submission,
    },
    /// Surface a computed result to the front end.
    Report { task: Task, value: i64 },
    /// Re-enter the submission at the end of the command stream,
    /// optionally after a delay.
    Resubmit {
        submission: Submission,
        delay: Option<Duration>,
    },
    /// Surface a user-facing notice (connects, losses, drops).
    Notice(String),
}

// ── Retry policy ─────────────────────────────────────────────────

/// What to do with a failed or timed-out request.
///
/// The default retries unconditionally, immediately, forever: an
/// unreachable server keeps a task cycling until the server returns.
/// Bounded mode is an explicit opt-in, never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    Unbounded,
    Bounded {
        /// Total dispatch attempts per task, including the first.
        max_attempts: u32,
        /// Fixed delay before each re-entry into the command stream.
        backoff: Duration,
    },
}

// ── ClientCore ───────────────────────────────────────────────────

/// Client state: the phase, the pending-task buffer, and the failure
/// detection subscription token. Exclusively owned by the driver task;
/// no other component reads or writes it.
#[derive(Debug, Default)]
pub struct ClientCore {
    phase: Phase,
    queue: TaskQueue,
    /// The endpoint whose failure notifications we accept. Replaced on
    /// every new connection, so a notification for an abandoned server
    /// can never match.
    monitored: Option<EndpointId>,
    retry: RetryPolicy,
}

impl ClientCore {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// The server currently believed live, if any.
    pub fn current_server(&self) -> Option<&EndpointHandle> {
        match &self.phase {
            Phase::Running { server } => Some(server),
            _ => None,
        }
    }

    /// Number of buffered, not-yet-sent tasks.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Process one event. Total: every (phase, event) pair is handled;
    /// inputs that are meaningless in the current phase are ignored.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Submit(submission) => self.on_submit(submission),
            Event::Connect { host, port } => self.on_connect(host, port),
            Event::Resolved {
                endpoint,
                mismatches,
            } => self.on_resolved(endpoint, mismatches),
            Event::ResolveFailed { host, port, reason } => {
                self.on_resolve_failed(host, port, reason)
            }
            Event::RequestSucceeded { task, value, .. } => {
                vec![Effect::Report { task, value }]
            }
            Event::RequestFailed {
                submission, reason, ..
            } => self.on_request_failed(submission, reason),
            Event::EndpointDown { endpoint } => self.on_endpoint_down(endpoint),
        }
    }

    fn on_submit(&mut self, submission: Submission) -> Vec<Effect> {
        match &self.phase {
            Phase::Running { server } => vec![Effect::Dispatch {
                endpoint: server.clone(),
                submission,
            }],
            // Buffered until a connection is established. Submissions
            // arriving while Connecting only reach us after resolution
            // completes (the driver suspends on resolve), but the
            // transition is defined for them regardless.
            Phase::Disconnected | Phase::Connecting { .. } => {
                self.queue.push(submission);
                Vec::new()
            }
        }
    }

    fn on_connect(&mut self, host: String, port: u16) -> Vec<Effect> {
        // A stale reference must never serve a new attempt: drop the
        // current server and its subscription token before resolving.
        self.monitored = None;
        self.phase = Phase::Connecting {
            host: host.clone(),
            port,
        };
        vec![Effect::Resolve { host, port }]
    }

    fn on_resolved(&mut self, endpoint: EndpointHandle, mismatches: Vec<String>) -> Vec<Effect> {
        let Phase::Connecting { host, port } = &self.phase else {
            trace!("ignoring resolver completion in phase {}", self.phase);
            return Vec::new();
        };

        if !mismatches.is_empty() {
            let notice = format!(
                "service found at \"{host}\":{port}, but it does not provide {}",
                mismatches.join(", ")
            );
            self.phase = Phase::Disconnected;
            return vec![Effect::Notice(notice)];
        }

        self.monitored = Some(endpoint.id());
        self.phase = Phase::Running {
            server: endpoint.clone(),
        };

        let mut effects = vec![
            Effect::Notice("successfully connected to server".to_string()),
            Effect::Monitor {
                endpoint: endpoint.clone(),
            },
        ];
        // Flush everything buffered while unconnected, in submission
        // order. The queue must be empty for as long as we are Running.
        for submission in self.queue.drain() {
            effects.push(Effect::Dispatch {
                endpoint: endpoint.clone(),
                submission,
            });
        }
        effects
    }

    fn on_resolve_failed(&mut self, host: String, port: u16, reason: String) -> Vec<Effect> {
        if !matches!(self.phase, Phase::Connecting { .. }) {
            trace!("ignoring resolver failure in phase {}", self.phase);
            return Vec::new();
        }
        self.phase = Phase::Disconnected;
        vec![Effect::Notice(format!(
            "cannot connect to \"{host}\":{port} => {reason}"
        ))]
    }

    fn on_request_failed(&mut self, submission: Submission, reason: String) -> Vec<Effect> {
        let retried = submission.retried();
        match self.retry {
            RetryPolicy::Unbounded => vec![Effect::Resubmit {
                submission: retried,
                delay: None,
            }],
            RetryPolicy::Bounded {
                max_attempts,
                backoff,
            } => {
                if retried.attempt >= max_attempts {
                    vec![Effect::Notice(format!(
                        "giving up on {} after {} attempts: {reason}",
                        submission.task, max_attempts
                    ))]
                } else {
                    vec![Effect::Resubmit {
                        submission: retried,
                        delay: Some(backoff),
                    }]
                }
            }
        }
    }

    fn on_endpoint_down(&mut self, endpoint: EndpointId) -> Vec<Effect> {
        if self.monitored != Some(endpoint) {
            // A subscription from a previously abandoned server; its
            // notifications are void.
            trace!("ignoring stale down notification for endpoint {endpoint}");
            return Vec::new();
        }
        self.monitored = None;
        self.phase = Phase::Disconnected;
        vec![Effect::Notice("lost connection to server".to_string())]
    }
}
