// SPDX-License-Identifier: MPL-2.0

use std::collections::{BTreeMap, HashMap};
use tokio::sync::oneshot;

use super::error::{MqttClientError, MqttClientResult};
use crate::mqtt_serde::control_packet::{ControlPacketType, EncodedPacket};
use crate::mqtt_serde::mqttv5::common::properties::Property;

/// What the in-flight request waits for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflightState {
    AwaitPubAck,
    AwaitPubRec,
    /// PUBREL sent, `packet` holds the PUBREL for resend
    AwaitPubComp,
    AwaitSubAck,
    AwaitUnsubAck,
}

impl InflightState {
    pub fn is_publish(&self) -> bool {
        matches!(
            self,
            Self::AwaitPubAck | Self::AwaitPubRec | Self::AwaitPubComp
        )
    }

    /// Ack packet type that moves this state forward.
    pub fn expected_ack(&self) -> ControlPacketType {
        match self {
            Self::AwaitPubAck => ControlPacketType::PUBACK,
            Self::AwaitPubRec => ControlPacketType::PUBREC,
            Self::AwaitPubComp => ControlPacketType::PUBCOMP,
            Self::AwaitSubAck => ControlPacketType::SUBACK,
            Self::AwaitUnsubAck => ControlPacketType::UNSUBACK,
        }
    }

    /// Before the first ack, an abandoned request can simply be forgotten.
    pub fn is_abandonable(&self) -> bool {
        !matches!(self, Self::AwaitPubComp)
    }
}

/// Final acknowledgment handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AckOutcome {
    pub packet_id: Option<u16>,
    pub reason_codes: Vec<u8>,
    pub properties: Vec<Property>,
}

pub type AckSender = oneshot::Sender<MqttClientResult<AckOutcome>>;
pub type AckReceiver = oneshot::Receiver<MqttClientResult<AckOutcome>>;

#[derive(Debug)]
pub struct InflightEntry {
    pub packet_id: u16,
    pub state: InflightState,
    pub packet: EncodedPacket,
    /// Reason codes the SUBACK/UNSUBACK must carry
    pub expected_codes: usize,
    reply: Option<AckSender>,
}

impl InflightEntry {
    pub fn new(
        packet_id: u16,
        state: InflightState,
        packet: EncodedPacket,
        expected_codes: usize,
        reply: AckSender,
    ) -> Self {
        Self {
            packet_id,
            state,
            packet,
            expected_codes,
            reply: Some(reply),
        }
    }

    /// The caller stopped waiting (cancelled or dropped).
    pub fn is_abandoned(&self) -> bool {
        self.reply.as_ref().map_or(true, |r| r.is_closed())
    }

    pub fn complete(&mut self, result: MqttClientResult<AckOutcome>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(result);
        }
    }
}

/// In-flight requests keyed by packet identifier, iterated in issue order.
#[derive(Debug, Default)]
pub struct InflightTable {
    order: BTreeMap<u64, u16>,
    entries: HashMap<u16, (u64, InflightEntry)>,
    next_seq: u64,
    publish_count: usize,
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: InflightEntry) -> MqttClientResult<()> {
        if self.entries.contains_key(&entry.packet_id) {
            return Err(MqttClientError::protocol(
                0x91,
                format!("packet identifier {} already in flight", entry.packet_id),
            ));
        }
        if entry.state.is_publish() {
            self.publish_count += 1;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, entry.packet_id);
        self.entries.insert(entry.packet_id, (seq, entry));
        Ok(())
    }

    pub fn get(&self, packet_id: u16) -> Option<&InflightEntry> {
        self.entries.get(&packet_id).map(|(_, e)| e)
    }

    pub fn get_mut(&mut self, packet_id: u16) -> Option<&mut InflightEntry> {
        self.entries.get_mut(&packet_id).map(|(_, e)| e)
    }

    /// Removes the entry if it is waiting for exactly this ack type.
    pub fn take_matching(
        &mut self,
        packet_id: u16,
        ack: ControlPacketType,
    ) -> Option<InflightEntry> {
        let matches = self
            .get(packet_id)
            .is_some_and(|e| e.state.expected_ack() == ack);
        if matches {
            self.remove(packet_id)
        } else {
            None
        }
    }

    pub fn remove(&mut self, packet_id: u16) -> Option<InflightEntry> {
        let (seq, entry) = self.entries.remove(&packet_id)?;
        self.order.remove(&seq);
        if entry.state.is_publish() {
            self.publish_count -= 1;
        }
        Some(entry)
    }

    /// Number of outbound QoS 1/2 publishes not yet completed.
    pub fn publish_count(&self) -> usize {
        self.publish_count
    }

    pub fn packet_ids(&self) -> Vec<u16> {
        self.order.values().copied().collect()
    }

    /// Removes everything, in issue order.
    pub fn drain(&mut self) -> Vec<InflightEntry> {
        let ids = self.packet_ids();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Drops abandoned entries that have not been acknowledged at all.
    /// Returns their packet identifiers.
    pub fn purge_abandoned(&mut self) -> Vec<u16> {
        let abandoned: Vec<u16> = self
            .order
            .values()
            .filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|(_, e)| e.state.is_abandonable() && e.is_abandoned())
            })
            .copied()
            .collect();
        for id in &abandoned {
            self.remove(*id);
        }
        abandoned
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt_serde::control_packet::MqttControlPacket;
    use crate::mqtt_serde::mqttv5::publishv5::MqttPublish;

    fn publish_entry(pid: u16, qos: u8) -> (InflightEntry, AckReceiver) {
        let packet = MqttPublish::new(qos, "t".to_string(), Some(pid), vec![], false, false)
            .encode()
            .unwrap();
        let (tx, rx) = oneshot::channel();
        let state = if qos == 1 {
            InflightState::AwaitPubAck
        } else {
            InflightState::AwaitPubRec
        };
        (InflightEntry::new(pid, state, packet, 0, tx), rx)
    }

    #[test]
    fn test_issue_order_and_counts() {
        let mut table = InflightTable::new();
        let (e1, _r1) = publish_entry(7, 1);
        let (e2, _r2) = publish_entry(3, 2);
        let (e3, _r3) = publish_entry(5, 1);
        table.insert(e1).unwrap();
        table.insert(e2).unwrap();
        table.insert(e3).unwrap();

        assert_eq!(table.packet_ids(), vec![7, 3, 5]);
        assert_eq!(table.publish_count(), 3);

        table.remove(3);
        assert_eq!(table.packet_ids(), vec![7, 5]);
        assert_eq!(table.publish_count(), 2);
    }

    #[test]
    fn test_duplicate_pid_rejected() {
        let mut table = InflightTable::new();
        let (e1, _r1) = publish_entry(1, 1);
        let (e2, _r2) = publish_entry(1, 1);
        table.insert(e1).unwrap();
        assert!(table.insert(e2).is_err());
    }

    #[test]
    fn test_take_matching_kind() {
        let mut table = InflightTable::new();
        let (e1, _r1) = publish_entry(1, 2);
        table.insert(e1).unwrap();

        assert!(table.take_matching(1, ControlPacketType::PUBACK).is_none());
        assert!(table.take_matching(1, ControlPacketType::PUBREC).is_some());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_complete_delivers_once() {
        let (mut entry, rx) = publish_entry(1, 1);
        let outcome = AckOutcome {
            packet_id: Some(1),
            reason_codes: vec![0],
            properties: vec![],
        };
        entry.complete(Ok(outcome.clone()));
        entry.complete(Err(MqttClientError::cancelled("publish")));
        assert_eq!(rx.await.unwrap(), Ok(outcome));
    }

    #[test]
    fn test_purge_abandoned() {
        let mut table = InflightTable::new();
        let (e1, r1) = publish_entry(1, 1);
        let (e2, _r2) = publish_entry(2, 1);
        let (mut e3, r3) = publish_entry(3, 2);
        e3.state = InflightState::AwaitPubComp;
        table.insert(e1).unwrap();
        table.insert(e2).unwrap();
        table.insert(e3).unwrap();
        drop(r1);
        drop(r3);

        // PUBREL already sent, must still run to completion
        assert_eq!(table.purge_abandoned(), vec![1]);
        assert_eq!(table.packet_ids(), vec![2, 3]);
    }
}
