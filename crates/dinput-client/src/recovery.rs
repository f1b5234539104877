//! Background recovery: death notices, availability changes and reconciliation.
//!
//! A supervisor task turns death notices, availability events and the
//! optional health tick into [`RecoveryTask`]s on two per-role queues. Each
//! queue is drained by its own task, so a slow source reconnect never delays
//! the sink and vice versa. Tasks hold only a weak reference to the client
//! and stop once it is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::Duration;

use dinput_ipc::AvailabilityEvent;
use dinput_types::{ProxyToken, ServiceRole};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::DistributedInputClient;

/// Work posted to a role's recovery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTask {
    /// Reacquire the proxy and replay registrations if it changed.
    Reconcile,
    /// Stop draining the queue.
    Stop,
}

struct Queue {
    tx: mpsc::UnboundedSender<RecoveryTask>,
    queued: AtomicBool,
}

impl Queue {
    fn schedule(&self, role: ServiceRole) -> bool {
        if self.queued.swap(true, Ordering::AcqRel) {
            debug!(role = %role, "reconcile already queued");
            return false;
        }
        if self.tx.send(RecoveryTask::Reconcile).is_err() {
            self.queued.store(false, Ordering::Release);
            return false;
        }
        debug!(role = %role, "reconcile queued");
        true
    }
}

/// Sending halves of the two recovery queues.
pub struct RecoveryQueues {
    source: Queue,
    sink: Queue,
}

/// Receiving halves, consumed by [`spawn`].
pub(crate) struct RecoveryReceivers {
    source: mpsc::UnboundedReceiver<RecoveryTask>,
    sink: mpsc::UnboundedReceiver<RecoveryTask>,
}

impl RecoveryQueues {
    pub(crate) fn new() -> (Self, RecoveryReceivers) {
        let (source_tx, source_rx) = mpsc::unbounded_channel();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let queues = Self {
            source: Queue {
                tx: source_tx,
                queued: AtomicBool::new(false),
            },
            sink: Queue {
                tx: sink_tx,
                queued: AtomicBool::new(false),
            },
        };
        let receivers = RecoveryReceivers {
            source: source_rx,
            sink: sink_rx,
        };
        (queues, receivers)
    }

    fn queue(&self, role: ServiceRole) -> &Queue {
        match role {
            ServiceRole::Source => &self.source,
            ServiceRole::Sink => &self.sink,
        }
    }

    /// Post a reconcile for `role` unless one is already waiting.
    pub fn schedule(&self, role: ServiceRole) -> bool {
        self.queue(role).schedule(role)
    }

    /// Mark the waiting reconcile for `role` as taken.
    pub(crate) fn take(&self, role: ServiceRole) {
        self.queue(role).queued.store(false, Ordering::Release);
    }

    pub fn is_queued(&self, role: ServiceRole) -> bool {
        self.queue(role).queued.load(Ordering::Acquire)
    }

    pub(crate) fn stop(&self) {
        for role in ServiceRole::BOTH {
            let _ = self.queue(role).tx.send(RecoveryTask::Stop);
        }
    }
}

/// Inputs of the supervisor task.
pub(crate) struct SupervisorInputs {
    pub deaths: mpsc::UnboundedReceiver<ProxyToken>,
    pub availability: mpsc::UnboundedReceiver<AvailabilityEvent>,
    pub health_check: Option<Duration>,
    pub shutdown: watch::Receiver<bool>,
}

/// Start the supervisor and both queue workers.
pub(crate) fn spawn(
    client: Weak<DistributedInputClient>,
    receivers: RecoveryReceivers,
    inputs: SupervisorInputs,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(drain(ServiceRole::Source, client.clone(), receivers.source)),
        tokio::spawn(drain(ServiceRole::Sink, client.clone(), receivers.sink)),
        tokio::spawn(supervise(client, inputs)),
    ]
}

async fn drain(
    role: ServiceRole,
    client: Weak<DistributedInputClient>,
    mut rx: mpsc::UnboundedReceiver<RecoveryTask>,
) {
    while let Some(task) = rx.recv().await {
        match task {
            RecoveryTask::Reconcile => {
                let Some(client) = client.upgrade() else {
                    break;
                };
                client.reconcile(role).await;
            }
            RecoveryTask::Stop => break,
        }
    }
    debug!(role = %role, "recovery queue stopped");
}

async fn next_tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn supervise(client: Weak<DistributedInputClient>, inputs: SupervisorInputs) {
    let SupervisorInputs {
        mut deaths,
        mut availability,
        health_check,
        mut shutdown,
    } = inputs;
    let mut interval = health_check.map(|period| {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    info!("recovery supervisor running");
    loop {
        tokio::select! {
            Some(token) = deaths.recv() => {
                let Some(client) = client.upgrade() else { break };
                client.handle_remote_died(token).await;
            }
            Some(event) = availability.recv() => {
                let Some(client) = client.upgrade() else { break };
                client.handle_availability(event).await;
            }
            () = next_tick(&mut interval) => {
                let Some(client) = client.upgrade() else { break };
                client.health_check().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("recovery supervisor stopped");
}
