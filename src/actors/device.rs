//! The leaf device actor: holds the most recent reading for one
//! (group, device) identity.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::actors::{self, ActorHandle, Mailbox};
use crate::messages::{DeviceMsg, DeviceRegistered, ReadingRecorded, ReadingReport};
use crate::types::{DeviceId, GroupId};

pub struct Device {
    group_id: GroupId,
    device_id: DeviceId,
    last_reading: Option<f64>,
    recorded_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn spawn(group_id: GroupId, device_id: DeviceId) -> ActorHandle<DeviceMsg> {
        let (handle, mailbox) = actors::mailbox();
        let device = Device {
            group_id,
            device_id,
            last_reading: None,
            recorded_at: None,
        };
        tokio::spawn(device.run(mailbox));
        handle
    }

    async fn run(mut self, mut mailbox: Mailbox<DeviceMsg>) {
        info!(group = %self.group_id, device = %self.device_id, "device started");

        while let Some(msg) = mailbox.recv().await {
            match msg {
                DeviceMsg::Register { group_id, device_id, handle, reply } => {
                    self.on_register(group_id, device_id, handle, reply);
                }
                DeviceMsg::Record { request_id, value, reply } => {
                    self.on_record(request_id, value, reply);
                }
                DeviceMsg::Read { request_id, reply } => {
                    self.on_read(request_id, reply);
                }
                DeviceMsg::Stop => break,
            }
        }

        info!(group = %self.group_id, device = %self.device_id, "device stopped");
    }

    fn on_register(
        &self,
        group_id: GroupId,
        device_id: DeviceId,
        handle: ActorHandle<DeviceMsg>,
        reply: tokio::sync::oneshot::Sender<DeviceRegistered>,
    ) {
        if group_id == self.group_id && device_id == self.device_id {
            let _ = reply.send(DeviceRegistered { handle });
        } else {
            // Misaddressed registration: warn and drop the reply sender.
            // The registration protocol never answers a wrong target.
            warn!(
                requested_group = %group_id,
                requested_device = %device_id,
                group = %self.group_id,
                device = %self.device_id,
                "ignoring track request addressed to another device"
            );
        }
    }

    fn on_record(
        &mut self,
        request_id: u64,
        value: f64,
        reply: tokio::sync::oneshot::Sender<ReadingRecorded>,
    ) {
        info!(
            group = %self.group_id,
            device = %self.device_id,
            request_id,
            value,
            "recorded reading"
        );
        self.last_reading = Some(value);
        self.recorded_at = Some(Utc::now());
        let _ = reply.send(ReadingRecorded { request_id });
    }

    fn on_read(&self, request_id: u64, reply: tokio::sync::oneshot::Sender<ReadingReport>) {
        debug!(
            group = %self.group_id,
            device = %self.device_id,
            request_id,
            value = ?self.last_reading,
            recorded_at = ?self.recorded_at,
            "read reading"
        );
        let _ = reply.send(ReadingReport {
            request_id,
            value: self.last_reading,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    async fn read(device: &ActorHandle<DeviceMsg>, request_id: u64) -> ReadingReport {
        let (tx, rx) = oneshot::channel();
        assert!(device.send(DeviceMsg::Read { request_id, reply: tx }));
        rx.await.unwrap()
    }

    async fn record(device: &ActorHandle<DeviceMsg>, request_id: u64, value: f64) -> ReadingRecorded {
        let (tx, rx) = oneshot::channel();
        assert!(device.send(DeviceMsg::Record { request_id, value, reply: tx }));
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_reply_with_no_reading_before_first_record() {
        let device = Device::spawn("group".into(), "device1".into());
        let report = read(&device, 42).await;
        assert_eq!(report.request_id, 42);
        assert_eq!(report.value, None);
    }

    #[tokio::test]
    async fn test_read_returns_latest_of_multiple_records() {
        let device = Device::spawn("group".into(), "device1".into());

        let ack = record(&device, 1, 24.0).await;
        assert_eq!(ack.request_id, 1);
        let ack = record(&device, 2, 55.0).await;
        assert_eq!(ack.request_id, 2);

        let report = read(&device, 3).await;
        assert_eq!(report.request_id, 3);
        assert_eq!(report.value, Some(55.0));
    }

    #[tokio::test]
    async fn test_register_confirms_matching_identity() {
        let device = Device::spawn("group".into(), "device1".into());
        let (tx, rx) = oneshot::channel();
        device.send(DeviceMsg::Register {
            group_id: "group".into(),
            device_id: "device1".into(),
            handle: device.clone(),
            reply: tx,
        });
        let registered = rx.await.unwrap();
        assert_eq!(registered.handle.id(), device.id());
    }

    #[tokio::test]
    async fn test_register_drops_reply_for_wrong_identity() {
        let device = Device::spawn("group".into(), "device1".into());

        let (tx, rx) = oneshot::channel();
        device.send(DeviceMsg::Register {
            group_id: "wrong-group".into(),
            device_id: "device1".into(),
            handle: device.clone(),
            reply: tx,
        });
        assert!(rx.await.is_err());

        let (tx, rx) = oneshot::channel();
        device.send(DeviceMsg::Register {
            group_id: "group".into(),
            device_id: "wrong-device".into(),
            handle: device.clone(),
            reply: tx,
        });
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_stop_ends_the_run_loop() {
        let device = Device::spawn("group".into(), "device1".into());
        device.send(DeviceMsg::Stop);
        device.lifecycle().stopped().await;
        assert!(!device.send(DeviceMsg::Stop));
    }
}
