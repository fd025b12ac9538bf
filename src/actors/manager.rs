//! Root registry over device groups: the same create-or-forward pattern as
//! the group, one level up.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::actors::{self, ActorHandle, DeviceGroup, HandleId, Mailbox};
use crate::messages::{GroupMsg, ManagerMsg, ReadingsCollected};
use crate::types::{GroupId, RequestId};

pub struct DeviceManager {
    by_id: HashMap<GroupId, ActorHandle<GroupMsg>>,
    by_handle: HashMap<HandleId, GroupId>,
    self_watch: mpsc::WeakUnboundedSender<ManagerMsg>,
}

impl DeviceManager {
    pub fn spawn() -> ActorHandle<ManagerMsg> {
        let (handle, mailbox) = actors::mailbox();
        let manager = DeviceManager {
            by_id: HashMap::new(),
            by_handle: HashMap::new(),
            self_watch: handle.weak(),
        };
        tokio::spawn(manager.run(mailbox));
        handle
    }

    async fn run(mut self, mut mailbox: Mailbox<ManagerMsg>) {
        info!("device manager started");

        while let Some(msg) = mailbox.recv().await {
            match msg {
                ManagerMsg::Track { group_id, device_id, reply } => {
                    self.group(&group_id).send(GroupMsg::Track {
                        group_id,
                        device_id,
                        reply,
                    });
                }
                ManagerMsg::ListDevices { group_id, request_id, reply } => {
                    self.group(&group_id).send(GroupMsg::ListDevices { request_id, reply });
                }
                ManagerMsg::CollectReadings { group_id, request_id, deadline, reply } => {
                    self.on_collect_readings(group_id, request_id, deadline, reply);
                }
                ManagerMsg::GroupStopped { handle } => {
                    self.on_group_stopped(handle);
                }
                ManagerMsg::Stop => break,
            }
        }

        for (_, group) in self.by_id.drain() {
            group.send(GroupMsg::Stop);
        }
        info!("device manager stopped");
    }

    /// Resolves the group for an id, creating and watching it on first
    /// reference. Group-level traffic is then forwarded untouched, so
    /// replies flow straight back to the original caller.
    fn group(&mut self, group_id: &str) -> ActorHandle<GroupMsg> {
        if let Some(existing) = self.by_id.get(group_id) {
            return existing.clone();
        }
        info!(group = %group_id, "creating device group");
        let group = DeviceGroup::spawn(group_id.to_owned());
        actors::observe_stop(&group, &self.self_watch, |handle| ManagerMsg::GroupStopped { handle });
        self.by_handle.insert(group.id(), group_id.to_owned());
        self.by_id.insert(group_id.to_owned(), group.clone());
        group
    }

    fn on_collect_readings(
        &mut self,
        group_id: GroupId,
        request_id: RequestId,
        deadline: Duration,
        reply: oneshot::Sender<ReadingsCollected>,
    ) {
        self.group(&group_id).send(GroupMsg::CollectReadings {
            request_id,
            deadline,
            reply,
        });
    }

    fn on_group_stopped(&mut self, handle: HandleId) {
        let Some(group_id) = self.by_handle.remove(&handle) else {
            return;
        };
        self.by_id.remove(&group_id);
        info!(group = %group_id, "device group terminated, removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DeviceList, DeviceMsg};
    use crate::types::Reading;

    async fn track(
        manager: &ActorHandle<ManagerMsg>,
        group_id: &str,
        device_id: &str,
    ) -> ActorHandle<DeviceMsg> {
        let (tx, rx) = oneshot::channel();
        manager.send(ManagerMsg::Track {
            group_id: group_id.into(),
            device_id: device_id.into(),
            reply: tx,
        });
        rx.await.expect("track was not confirmed").handle
    }

    async fn list(manager: &ActorHandle<ManagerMsg>, group_id: &str, request_id: RequestId) -> DeviceList {
        let (tx, rx) = oneshot::channel();
        manager.send(ManagerMsg::ListDevices {
            group_id: group_id.into(),
            request_id,
            reply: tx,
        });
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_tracks_devices_across_groups() {
        let manager = DeviceManager::spawn();
        let d1 = track(&manager, "group1", "device1").await;
        let d1_again = track(&manager, "group1", "device1").await;
        let d2 = track(&manager, "group2", "device1").await;

        assert_eq!(d1.id(), d1_again.id());
        assert_ne!(d1.id(), d2.id());

        assert_eq!(list(&manager, "group1", 1).await.ids.len(), 1);
        assert_eq!(list(&manager, "group2", 2).await.ids.len(), 1);
    }

    #[tokio::test]
    async fn test_list_devices_for_unseen_group_is_empty() {
        let manager = DeviceManager::spawn();
        let listing = list(&manager, "nowhere", 4).await;
        assert_eq!(listing.request_id, 4);
        assert!(listing.ids.is_empty());
    }

    #[tokio::test]
    async fn test_collect_readings_delegates_to_the_group() {
        let manager = DeviceManager::spawn();
        let device = track(&manager, "group1", "device1").await;

        let (tx, rx) = oneshot::channel();
        device.send(DeviceMsg::Record { request_id: 1, value: 3.5, reply: tx });
        rx.await.unwrap();

        let (tx, rx) = oneshot::channel();
        manager.send(ManagerMsg::CollectReadings {
            group_id: "group1".into(),
            request_id: 2,
            deadline: Duration::from_secs(3),
            reply: tx,
        });
        let response = rx.await.unwrap();
        assert_eq!(response.request_id, 2);
        assert_eq!(response.readings.get("device1"), Some(&Reading::Value { value: 3.5 }));
    }

    #[tokio::test]
    async fn test_tracking_again_after_device_stop_makes_a_fresh_device() {
        let manager = DeviceManager::spawn();
        let device = track(&manager, "group1", "device1").await;

        device.send(DeviceMsg::Stop);
        device.lifecycle().stopped().await;

        // Wait for the group to prune the dead device before re-tracking,
        // so the track cannot be forwarded to the stopped actor.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while list(&manager, "group1", 1).await.ids.contains("device1") {
            assert!(tokio::time::Instant::now() < deadline, "device1 never pruned");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let recreated = track(&manager, "group1", "device1").await;
        assert_ne!(recreated.id(), device.id());
    }

    #[tokio::test]
    async fn test_group_stopped_notification_prunes_both_indices() {
        let (handle, _mb) = actors::mailbox::<ManagerMsg>();
        let mut manager = DeviceManager {
            by_id: HashMap::new(),
            by_handle: HashMap::new(),
            self_watch: handle.weak(),
        };
        let group = manager.group("group1");
        assert!(manager.by_id.contains_key("group1"));
        assert!(manager.by_handle.contains_key(&group.id()));

        manager.on_group_stopped(group.id());
        assert!(manager.by_id.is_empty());
        assert!(manager.by_handle.is_empty());

        // A late duplicate notification is a no-op.
        manager.on_group_stopped(group.id());
        assert!(manager.by_id.is_empty());
    }

    #[tokio::test]
    async fn test_manager_stop_cascades() {
        let manager = DeviceManager::spawn();
        let device = track(&manager, "group1", "device1").await;

        manager.send(ManagerMsg::Stop);
        manager.lifecycle().stopped().await;
        device.lifecycle().stopped().await;
    }
}
