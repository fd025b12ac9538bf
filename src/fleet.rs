//! Public entry point: a `Fleet` owns the root registry actor and wraps the
//! message round-trips behind plain async methods. Every call here is a
//! fire-and-forget send plus an awaited oneshot reply; nothing blocks any
//! actor while a caller waits.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::actors::{ActorHandle, DeviceManager};
use crate::config::Settings;
use crate::messages::{DeviceMsg, ManagerMsg, ReadingsCollected};
use crate::types::{DeviceId, Error, RequestId, Result};

pub struct Fleet {
    manager: ActorHandle<ManagerMsg>,
    settings: Settings,
}

impl Fleet {
    pub fn new(settings: Settings) -> Self {
        Self {
            manager: DeviceManager::spawn(),
            settings,
        }
    }

    /// Registers a device, creating its group and the device itself on
    /// first reference, and returns the device's handle. Tracking an
    /// already-known id returns a handle to the same device.
    pub async fn track(&self, group_id: &str, device_id: &str) -> Result<ActorHandle<DeviceMsg>> {
        let (tx, rx) = oneshot::channel();
        if !self.manager.send(ManagerMsg::Track {
            group_id: group_id.to_owned(),
            device_id: device_id.to_owned(),
            reply: tx,
        }) {
            return Err(Error::MailboxClosed("device manager"));
        }
        let registered = rx.await.map_err(|_| Error::RequestDropped)?;
        Ok(registered.handle)
    }

    /// Records a reading on a device (created on demand) and returns the
    /// echoed request id once the device acknowledged it.
    pub async fn record(
        &self,
        group_id: &str,
        device_id: &str,
        request_id: RequestId,
        value: f64,
    ) -> Result<RequestId> {
        let device = self.track(group_id, device_id).await?;
        let (tx, rx) = oneshot::channel();
        if !device.send(DeviceMsg::Record { request_id, value, reply: tx }) {
            return Err(Error::MailboxClosed("device"));
        }
        let ack = rx.await.map_err(|_| Error::RequestDropped)?;
        Ok(ack.request_id)
    }

    /// Reads a device's last recorded value, `None` if it has none yet.
    pub async fn read(
        &self,
        group_id: &str,
        device_id: &str,
        request_id: RequestId,
    ) -> Result<Option<f64>> {
        let device = self.track(group_id, device_id).await?;
        let (tx, rx) = oneshot::channel();
        if !device.send(DeviceMsg::Read { request_id, reply: tx }) {
            return Err(Error::MailboxClosed("device"));
        }
        let report = rx.await.map_err(|_| Error::RequestDropped)?;
        Ok(report.value)
    }

    /// Ids of the devices currently tracked in a group.
    pub async fn list_devices(
        &self,
        group_id: &str,
        request_id: RequestId,
    ) -> Result<BTreeSet<DeviceId>> {
        let (tx, rx) = oneshot::channel();
        if !self.manager.send(ManagerMsg::ListDevices {
            group_id: group_id.to_owned(),
            request_id,
            reply: tx,
        }) {
            return Err(Error::MailboxClosed("device manager"));
        }
        let listing = rx.await.map_err(|_| Error::RequestDropped)?;
        Ok(listing.ids)
    }

    /// Collects one reading per device in the group, within the configured
    /// deadline. Always yields exactly one aggregate; degraded devices show
    /// up as `Unavailable`, `Lost` or `TimedOut` entries, never as an error.
    pub async fn collect_readings(
        &self,
        group_id: &str,
        request_id: RequestId,
    ) -> Result<ReadingsCollected> {
        self.collect_readings_within(group_id, request_id, self.settings.query.deadline())
            .await
    }

    /// Same as [`collect_readings`](Self::collect_readings) with an explicit
    /// per-request deadline.
    pub async fn collect_readings_within(
        &self,
        group_id: &str,
        request_id: RequestId,
        deadline: Duration,
    ) -> Result<ReadingsCollected> {
        let (tx, rx) = oneshot::channel();
        if !self.manager.send(ManagerMsg::CollectReadings {
            group_id: group_id.to_owned(),
            request_id,
            deadline,
            reply: tx,
        }) {
            return Err(Error::MailboxClosed("device manager"));
        }
        rx.await.map_err(|_| Error::RequestDropped)
    }

    /// Stops the manager, which cascades to groups and devices.
    pub fn shutdown(&self) {
        self.manager.send(ManagerMsg::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reading;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_record_then_read_roundtrip() {
        let fleet = Fleet::new(Settings::default());

        assert_eq!(fleet.read("home", "thermostat", 1).await.unwrap(), None);
        assert_eq!(fleet.record("home", "thermostat", 2, 20.5).await.unwrap(), 2);
        assert_eq!(fleet.record("home", "thermostat", 3, 21.0).await.unwrap(), 3);
        assert_eq!(fleet.read("home", "thermostat", 4).await.unwrap(), Some(21.0));
    }

    #[tokio::test]
    async fn test_collect_readings_over_a_group() {
        let fleet = Fleet::new(Settings::default());
        assert_ok!(fleet.record("home", "t1", 1, 1.0).await);
        assert_ok!(fleet.record("home", "t2", 2, 2.0).await);
        // A different group must not leak into the aggregate.
        assert_ok!(fleet.record("office", "t9", 3, 9.0).await);

        let response = fleet.collect_readings("home", 4).await.unwrap();
        assert_eq!(response.request_id, 4);
        assert_eq!(response.readings.len(), 2);
        assert_eq!(response.readings.get("t1"), Some(&Reading::Value { value: 1.0 }));
        assert_eq!(response.readings.get("t2"), Some(&Reading::Value { value: 2.0 }));
    }

    #[tokio::test]
    async fn test_collect_includes_unavailable_devices() {
        let fleet = Fleet::new(Settings::default());
        assert_ok!(fleet.track("home", "t1").await);
        assert_ok!(fleet.record("home", "t2", 1, 2.0).await);

        let response = fleet.collect_readings("home", 2).await.unwrap();
        assert_eq!(response.readings.get("t1"), Some(&Reading::Unavailable));
        assert_eq!(response.readings.get("t2"), Some(&Reading::Value { value: 2.0 }));
    }

    #[tokio::test]
    async fn test_collect_on_empty_group_is_empty() {
        let fleet = Fleet::new(Settings::default());
        let response = fleet.collect_readings("ghost-town", 1).await.unwrap();
        assert!(response.readings.is_empty());
    }

    #[tokio::test]
    async fn test_tracking_twice_returns_the_same_device() {
        let fleet = Fleet::new(Settings::default());
        let first = fleet.track("home", "t1").await.unwrap();
        let second = fleet.track("home", "t1").await.unwrap();
        assert_eq!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_shutdown_cascades_to_devices() {
        let fleet = Fleet::new(Settings::default());
        let device = fleet.track("home", "t1").await.unwrap();

        fleet.shutdown();
        device.lifecycle().stopped().await;
        assert!(fleet.track("home", "t1").await.is_err());
    }
}
