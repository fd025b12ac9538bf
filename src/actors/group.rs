//! Registry of the devices belonging to one group.
//!
//! Devices are created lazily on first track request and watched for
//! termination; the twin id<->handle indices are only ever touched from
//! this actor's own run loop, which is what keeps them mutual inverses.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::actors::{self, ActorHandle, Device, HandleId, Mailbox, ReadingsQuery};
use crate::messages::{DeviceList, DeviceMsg, DeviceRegistered, GroupMsg, ReadingsCollected};
use crate::types::{DeviceId, GroupId, RequestId};

pub struct DeviceGroup {
    group_id: GroupId,
    by_id: HashMap<DeviceId, ActorHandle<DeviceMsg>>,
    by_handle: HashMap<HandleId, DeviceId>,
    /// Weak self-address handed to device watches.
    self_watch: mpsc::WeakUnboundedSender<GroupMsg>,
}

impl DeviceGroup {
    pub fn spawn(group_id: GroupId) -> ActorHandle<GroupMsg> {
        let (handle, mailbox) = actors::mailbox();
        let group = DeviceGroup {
            group_id,
            by_id: HashMap::new(),
            by_handle: HashMap::new(),
            self_watch: handle.weak(),
        };
        tokio::spawn(group.run(mailbox));
        handle
    }

    async fn run(mut self, mut mailbox: Mailbox<GroupMsg>) {
        info!(group = %self.group_id, "device group started");

        while let Some(msg) = mailbox.recv().await {
            match msg {
                GroupMsg::Track { group_id, device_id, reply } => {
                    self.on_track(group_id, device_id, reply);
                }
                GroupMsg::ListDevices { request_id, reply } => {
                    self.on_list_devices(request_id, reply);
                }
                GroupMsg::CollectReadings { request_id, deadline, reply } => {
                    self.on_collect_readings(request_id, deadline, reply);
                }
                GroupMsg::DeviceStopped { handle } => {
                    self.on_device_stopped(handle);
                }
                GroupMsg::Stop => break,
            }
        }

        // The group takes its devices down with it.
        for (_, device) in self.by_id.drain() {
            device.send(DeviceMsg::Stop);
        }
        info!(group = %self.group_id, "device group stopped");
    }

    /// Create-or-forward: an unseen device id gets a fresh actor placed
    /// under lifecycle observation first; either way the request is
    /// forwarded and the device confirms to the original caller itself.
    fn on_track(&mut self, group_id: GroupId, device_id: DeviceId, reply: oneshot::Sender<DeviceRegistered>) {
        if group_id != self.group_id {
            warn!(
                requested_group = %group_id,
                group = %self.group_id,
                "ignoring track request addressed to another group"
            );
            return;
        }

        let device = match self.by_id.get(&device_id).cloned() {
            Some(existing) => existing,
            None => {
                info!(group = %self.group_id, device = %device_id, "creating device");
                let device = Device::spawn(self.group_id.clone(), device_id.clone());
                actors::observe_stop(&device, &self.self_watch, |handle| GroupMsg::DeviceStopped { handle });
                self.by_handle.insert(device.id(), device_id.clone());
                self.by_id.insert(device_id.clone(), device.clone());
                device
            }
        };

        device.send(DeviceMsg::Register {
            group_id,
            device_id,
            handle: device.clone(),
            reply,
        });
    }

    fn on_list_devices(&self, request_id: RequestId, reply: oneshot::Sender<DeviceList>) {
        let ids = self.by_id.keys().cloned().collect();
        let _ = reply.send(DeviceList { request_id, ids });
    }

    /// Hands a frozen copy of the current index to a fresh query; registry
    /// changes after this point cannot affect the in-flight collection.
    fn on_collect_readings(
        &self,
        request_id: RequestId,
        deadline: Duration,
        reply: oneshot::Sender<ReadingsCollected>,
    ) {
        let targets = self
            .by_id
            .iter()
            .map(|(device_id, handle)| (device_id.clone(), handle.clone()))
            .collect();
        ReadingsQuery::spawn(targets, request_id, reply, deadline);
    }

    /// Prunes both indices for a stopped device. Late or repeated
    /// notifications for an unknown handle are ignored.
    fn on_device_stopped(&mut self, handle: HandleId) {
        let Some(device_id) = self.by_handle.remove(&handle) else {
            return;
        };
        self.by_id.remove(&device_id);
        info!(group = %self.group_id, device = %device_id, "device terminated, removed from group");
    }
}
