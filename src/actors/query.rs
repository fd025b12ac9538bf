//! Scatter/gather collection of readings across one group's devices.
//!
//! A ReadingsQuery is spawned per collect-all request with a frozen snapshot
//! of the group's device handles. It fans a read out to every target, then
//! merges three event classes into one map: the target's answer, the
//! target's termination, and a single one-shot deadline. Exactly one
//! terminal reply leaves the query, whichever of completion or deadline
//! comes first.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::actors::{ActorHandle, HandleId};
use crate::messages::{DeviceMsg, ReadingsCollected};
use crate::types::{DeviceId, Reading, RequestId};

/// Request id used for the fan-out reads. Only the query consumes those
/// replies, so a fixed value is enough.
pub(crate) const READ_REQUEST_ID: RequestId = 0;

/// Per-target signal merged by the query loop. Each relay task emits
/// exactly one of these for its target.
#[derive(Debug)]
enum TargetEvent {
    Answered { target: HandleId, value: Option<f64> },
    Stopped { target: HandleId },
}

/// Collection state: `pending` and `results` partition the snapshot keys at
/// every step, and a target leaves `pending` exactly once.
struct QueryState {
    target_to_id: HashMap<HandleId, DeviceId>,
    pending: HashSet<HandleId>,
    results: HashMap<DeviceId, Reading>,
}

impl QueryState {
    fn new(target_to_id: HashMap<HandleId, DeviceId>) -> Self {
        let pending = target_to_id.keys().copied().collect();
        Self {
            target_to_id,
            pending,
            results: HashMap::new(),
        }
    }

    /// Records the outcome for a still-pending target. Events for targets
    /// already resolved (or never in the snapshot) are ignored: a device
    /// stopping after it answered is expected traffic, not an error.
    fn merge(&mut self, target: HandleId, reading: Reading) -> bool {
        if !self.pending.remove(&target) {
            trace!(%target, ?reading, "ignoring event for already-resolved target");
            return false;
        }
        match self.target_to_id.get(&target) {
            Some(device_id) => {
                self.results.insert(device_id.clone(), reading);
            }
            None => {
                // Unreachable while pending is derived from the snapshot.
                warn!(%target, "pending target missing from snapshot");
            }
        }
        true
    }

    /// Deadline expiry: every target still pending becomes TimedOut.
    fn time_out_pending(&mut self) {
        for target in std::mem::take(&mut self.pending) {
            if let Some(device_id) = self.target_to_id.get(&target) {
                self.results.insert(device_id.clone(), Reading::TimedOut);
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

pub struct ReadingsQuery;

impl ReadingsQuery {
    /// Spawns a query over a frozen target snapshot. The reply goes straight
    /// to `requester`; the spawning registry is out of the loop from here.
    pub fn spawn(
        targets: Vec<(DeviceId, ActorHandle<DeviceMsg>)>,
        request_id: RequestId,
        requester: oneshot::Sender<ReadingsCollected>,
        deadline: Duration,
    ) {
        tokio::spawn(Self::run(targets, request_id, requester, deadline));
    }

    async fn run(
        targets: Vec<(DeviceId, ActorHandle<DeviceMsg>)>,
        request_id: RequestId,
        requester: oneshot::Sender<ReadingsCollected>,
        deadline: Duration,
    ) {
        debug!(request_id, targets = targets.len(), ?deadline, "collecting readings");

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut target_to_id = HashMap::with_capacity(targets.len());
        let mut relays: HashMap<HandleId, AbortHandle> = HashMap::with_capacity(targets.len());
        for (device_id, handle) in targets {
            target_to_id.insert(handle.id(), device_id);
            relays.insert(handle.id(), Self::scatter(handle, event_tx.clone()));
        }
        drop(event_tx);

        let mut state = QueryState::new(target_to_id);
        if state.is_complete() {
            // Nothing to wait on; answer with an empty map right away.
            Self::reply(requester, request_id, state.results, relays);
            return;
        }

        let timeout = tokio::time::sleep(deadline);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                // Outcomes that arrived by the deadline tick are kept; the
                // event stream is finite (one per target), so the timer
                // cannot be starved.
                biased;
                event = event_rx.recv() => {
                    match event {
                        Some(TargetEvent::Answered { target, value }) => {
                            let reading = match value {
                                Some(value) => Reading::Value { value },
                                None => Reading::Unavailable,
                            };
                            if state.merge(target, reading) {
                                relays.remove(&target);
                            }
                        }
                        Some(TargetEvent::Stopped { target }) => {
                            if state.merge(target, Reading::Lost) {
                                relays.remove(&target);
                            }
                        }
                        // All relays are accounted for; nothing left to merge.
                        None => break,
                    }
                    if state.is_complete() {
                        break;
                    }
                }
                _ = &mut timeout => break,
            }
        }

        // No-op on the completion path; on the deadline path this fills
        // every straggler with TimedOut, keeping the aggregate total.
        state.time_out_pending();
        Self::reply(requester, request_id, state.results, relays);
    }

    /// Sends the read to one target and waits for whichever comes first:
    /// the answer or the target's termination. Emits exactly one event.
    fn scatter(handle: ActorHandle<DeviceMsg>, events: mpsc::UnboundedSender<TargetEvent>) -> AbortHandle {
        let target = handle.id();
        let stopped = handle.lifecycle();
        let (tx, rx) = oneshot::channel();
        // If the target is already gone the message is dropped along with
        // its reply sender, and rx resolves to a loss below.
        handle.send(DeviceMsg::Read {
            request_id: READ_REQUEST_ID,
            reply: tx,
        });

        tokio::spawn(async move {
            let event = tokio::select! {
                // An answer that raced the device's termination still counts.
                biased;
                answer = rx => match answer {
                    Ok(report) => TargetEvent::Answered { target, value: report.value },
                    Err(_) => TargetEvent::Stopped { target },
                },
                _ = stopped.stopped() => TargetEvent::Stopped { target },
            };
            let _ = events.send(event);
        })
        .abort_handle()
    }

    /// The single terminal reply; consuming the oneshot sender makes a
    /// second reply unrepresentable. Leftover relays (targets that timed
    /// out) are unsubscribed by aborting their tasks.
    fn reply(
        requester: oneshot::Sender<ReadingsCollected>,
        request_id: RequestId,
        readings: HashMap<DeviceId, Reading>,
        relays: HashMap<HandleId, AbortHandle>,
    ) {
        for (_, relay) in relays {
            relay.abort();
        }
        debug!(request_id, results = readings.len(), "query complete");
        let _ = requester.send(ReadingsCollected { request_id, readings });
    }
}
