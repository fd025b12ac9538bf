//! Message and reply types for every actor in the system.
//!
//! Each actor owns one closed enum and matches it exhaustively in its run
//! loop. Requests that expect an answer carry a oneshot reply sender;
//! dropping that sender without sending is the silent-drop path for
//! misaddressed requests.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::actors::{ActorHandle, HandleId};
use crate::types::{DeviceId, GroupId, Reading, RequestId};

/// Device actor messages
#[derive(Debug)]
pub enum DeviceMsg {
    /// Track request, forwarded by the owning group. `handle` is the
    /// device's own address, attached by the registry so the confirmation
    /// can hand it to the original caller.
    Register {
        group_id: GroupId,
        device_id: DeviceId,
        handle: ActorHandle<DeviceMsg>,
        reply: oneshot::Sender<DeviceRegistered>,
    },
    /// Record a new reading, replacing the previous one wholesale.
    Record {
        request_id: RequestId,
        value: f64,
        reply: oneshot::Sender<ReadingRecorded>,
    },
    /// Read the last recorded value, if any.
    Read {
        request_id: RequestId,
        reply: oneshot::Sender<ReadingReport>,
    },
    /// End the device's run loop.
    Stop,
}

/// Device group registry messages
#[derive(Debug)]
pub enum GroupMsg {
    Track {
        group_id: GroupId,
        device_id: DeviceId,
        reply: oneshot::Sender<DeviceRegistered>,
    },
    ListDevices {
        request_id: RequestId,
        reply: oneshot::Sender<DeviceList>,
    },
    CollectReadings {
        request_id: RequestId,
        deadline: Duration,
        reply: oneshot::Sender<ReadingsCollected>,
    },
    /// Lifecycle notification: a watched device stopped.
    DeviceStopped { handle: HandleId },
    Stop,
}

/// Device manager (root registry) messages
#[derive(Debug)]
pub enum ManagerMsg {
    Track {
        group_id: GroupId,
        device_id: DeviceId,
        reply: oneshot::Sender<DeviceRegistered>,
    },
    ListDevices {
        group_id: GroupId,
        request_id: RequestId,
        reply: oneshot::Sender<DeviceList>,
    },
    CollectReadings {
        group_id: GroupId,
        request_id: RequestId,
        deadline: Duration,
        reply: oneshot::Sender<ReadingsCollected>,
    },
    /// Lifecycle notification: a watched group stopped.
    GroupStopped { handle: HandleId },
    Stop,
}

/// Confirmation that a track request reached the right device.
#[derive(Debug)]
pub struct DeviceRegistered {
    pub handle: ActorHandle<DeviceMsg>,
}

/// Acknowledgement of a recorded reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingRecorded {
    pub request_id: RequestId,
}

/// A device's answer to a read: its last recorded value, verbatim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingReport {
    pub request_id: RequestId,
    pub value: Option<f64>,
}

/// Snapshot of the device ids currently tracked by a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList {
    pub request_id: RequestId,
    pub ids: BTreeSet<DeviceId>,
}

/// The single terminal reply of a collect-all query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingsCollected {
    pub request_id: RequestId,
    pub readings: HashMap<DeviceId, Reading>,
}
