//! The async client driver.
//!
//! One tokio task owns the [`ClientCore`] and its mailbox; it processes
//! one event at a time, so no locking is needed around client state.
//! The driver's job is purely mechanical: interpret the effects the
//! core returns. Resolution is the single suspending effect — the loop
//! awaits the resolver inline, and commands arriving meanwhile queue in
//! the mailbox until it answers. Everything else (request waits, the
//! endpoint monitor, delayed resubmissions) runs on spawned tasks that
//! feed completions back into the mailbox.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TallyError;
use crate::message::Task;
use crate::network::endpoint::{Endpoint, EndpointId};
use crate::network::resolver::{Resolved, Resolver};
use crate::state::machine::{ClientCore, Effect, Event, RetryPolicy};
use crate::state::queue::Submission;

/// Default bounded timeout applied to every task request (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// ── Options / outputs / handle ───────────────────────────────────

/// Tunables for a client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Deadline for each task request. The resolver call is deliberately
    /// not bounded by this (or anything).
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Events the client emits toward the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutput {
    /// A task completed: `task` evaluated to `value`.
    Result { task: Task, value: i64 },
    /// Connection lifecycle notice worth showing to the user.
    Notice(String),
}

/// Cheap cloneable handle for feeding commands to a running client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl ClientHandle {
    /// Submit a task. Always succeeds while the client task is alive:
    /// buffered when disconnected, dispatched when running.
    pub fn submit(&self, task: Task) -> Result<(), TallyError> {
        self.tx
            .send(Event::Submit(Submission::new(task)))
            .map_err(|_| TallyError::ChannelClosed)
    }

    /// Connect to a server, abandoning any current one.
    pub fn connect(&self, host: impl Into<String>, port: u16) -> Result<(), TallyError> {
        self.tx
            .send(Event::Connect {
                host: host.into(),
                port,
            })
            .map_err(|_| TallyError::ChannelClosed)
    }
}

// ── TallyClient ──────────────────────────────────────────────────

/// The driver. Constructed via [`TallyClient::spawn`]; lives until the
/// process exits (the machine has no terminal state of its own).
pub struct TallyClient {
    core: ClientCore,
    resolver: Arc<dyn Resolver>,
    options: ClientOptions,
    mailbox_tx: mpsc::UnboundedSender<Event>,
    output_tx: mpsc::UnboundedSender<ClientOutput>,
    /// The live endpoint backing `core.current_server()`, if any.
    current: Option<Endpoint>,
}

impl TallyClient {
    /// Spawn a client onto the runtime. Returns the command handle and
    /// the stream of results/notices for the front end to print.
    pub fn spawn(
        resolver: Arc<dyn Resolver>,
        options: ClientOptions,
    ) -> (ClientHandle, mpsc::UnboundedReceiver<ClientOutput>) {
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let driver = Self {
            core: ClientCore::new(options.retry),
            resolver,
            options,
            mailbox_tx: mailbox_tx.clone(),
            output_tx,
            current: None,
        };
        tokio::spawn(driver.run(mailbox_rx));

        (ClientHandle { tx: mailbox_tx }, output_rx)
    }

    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = mailbox.recv().await {
            let effects = self.core.handle(event);
            self.run_effects(effects).await;
            self.reconcile_endpoint();
        }
    }

    /// Drop the live endpoint once the core no longer points at it
    /// (new connect, endpoint down). Spawned request tasks keep their
    /// own clones until they finish; the monitor holds none.
    fn reconcile_endpoint(&mut self) {
        let core_id = self.core.current_server().map(|h| h.id());
        let live_id = self.current.as_ref().map(|e| e.id());
        if core_id != live_id {
            if let Some(endpoint) = self.current.take() {
                debug!("abandoning endpoint {}", endpoint.handle());
            }
        }
    }

    async fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Resolve { host, port } => {
                    // The one suspending call: the mailbox waits while
                    // the resolver works.
                    let event = self.resolve(host, port).await;
                    let next = self.core.handle(event);
                    for effect in next {
                        self.perform(effect).await;
                    }
                    self.reconcile_endpoint();
                }
                other => self.perform(other).await,
            }
        }
    }

    async fn resolve(&mut self, host: String, port: u16) -> Event {
        info!("resolving \"{host}\":{port}");
        match self.resolver.resolve(&host, port).await {
            Ok(Resolved {
                endpoint,
                mismatches,
            }) => {
                let handle = endpoint.handle().clone();
                // Staged before the core decides; reconcile_endpoint
                // drops it again if the core rejects the capabilities.
                self.current = Some(endpoint);
                Event::Resolved {
                    endpoint: handle,
                    mismatches,
                }
            }
            Err(e) => Event::ResolveFailed {
                host,
                port,
                reason: e.to_string(),
            },
        }
    }

    /// Interpret one non-suspending effect.
    async fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Resolve { host, port } => {
                // Unreachable by construction: only `Connect` produces
                // Resolve, and run_effects intercepts it.
                warn!("unexpected nested resolve for \"{host}\":{port}");
            }
            Effect::Monitor { endpoint } => match &self.current {
                Some(live) if live.id() == endpoint.id() => {
                    let signal = live.closed_signal();
                    let tx = self.mailbox_tx.clone();
                    tokio::spawn(async move {
                        let id = signal.wait().await;
                        let _ = tx.send(Event::EndpointDown { endpoint: id });
                    });
                }
                _ => warn!("cannot monitor {endpoint}: endpoint not live"),
            },
            Effect::Dispatch {
                endpoint,
                submission,
            } => self.dispatch(endpoint.id(), submission).await,
            Effect::Report { task, value } => {
                let _ = self.output_tx.send(ClientOutput::Result { task, value });
            }
            Effect::Resubmit { submission, delay } => {
                let tx = self.mailbox_tx.clone();
                match delay {
                    // Appended to the end of the mailbox: a retry
                    // interleaves with whatever was submitted meanwhile.
                    None => {
                        let _ = tx.send(Event::Submit(submission));
                    }
                    Some(delay) => {
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(Event::Submit(submission));
                        });
                    }
                }
            }
            Effect::Notice(message) => {
                info!("{message}");
                let _ = self.output_tx.send(ClientOutput::Notice(message));
            }
        }
    }

    /// Send the request frame now (issuance order is effect order) and
    /// await the answer on a spawned task.
    async fn dispatch(&mut self, endpoint: EndpointId, submission: Submission) {
        let Some(live) = self.current.as_ref().filter(|e| e.id() == endpoint) else {
            // Defensive: the core believes in a server the driver no
            // longer holds. Fail the request through the normal path.
            warn!("dispatch for {endpoint} with no live endpoint");
            let _ = self.mailbox_tx.send(Event::RequestFailed {
                endpoint,
                submission,
                reason: TallyError::EndpointClosed.to_string(),
            });
            return;
        };

        let pending = match live.begin(submission.task).await {
            Ok(pending) => pending,
            Err(e) => {
                let _ = self.mailbox_tx.send(Event::RequestFailed {
                    endpoint,
                    submission,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let timeout = self.options.request_timeout;
        let tx = self.mailbox_tx.clone();
        tokio::spawn(async move {
            let event = match pending.wait(timeout).await {
                Ok(value) => Event::RequestSucceeded {
                    endpoint,
                    task: submission.task,
                    value,
                },
                Err(e) => Event::RequestFailed {
                    endpoint,
                    submission,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_design_constants() {
        let options = ClientOptions::default();
        assert_eq!(options.request_timeout, Duration::from_secs(10));
        assert_eq!(options.retry, RetryPolicy::Unbounded);
    }
}
