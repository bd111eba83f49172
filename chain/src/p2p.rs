// chain/src/p2p.rs

//! Peer-transport surface consumed by the consensus core.
//!
//! The core does not manage topology, peer discovery or wire transport;
//! it talks to an abstract [`NetService`]. Registration yields a bounded
//! channel of incoming messages; deliveries into a full channel are
//! dropped (gossip is best-effort, producers are not flow-controlled).
//!
//! [`LoopbackNet`] is the in-process implementation used by tests and
//! single-node devnets: messages can be injected as if they arrived from
//! a peer, and everything sent outward is recorded for inspection.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identifier of a remote peer.
pub type PeerId = String;

/// Capacity of each registered incoming channel.
const INCOMING_CAPACITY: usize = 1024;

/// Message types used by the consensus core.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A freshly produced block, gossiped by its witness.
    NewBlock,
    /// Request for a range of blocks from a lagging node.
    SyncBlockRequest,
    /// A single block answering a sync request.
    SyncBlockResponse,
    /// A transaction published by a client.
    PublishTx,
}

/// Delivery priority hint for the transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Priority {
    Urgent,
    Normal,
}

/// A message delivered by the transport.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub from: PeerId,
    pub data: Vec<u8>,
    pub msg_type: MessageType,
}

/// Abstract transport consumed by the core.
pub trait NetService: Send + Sync {
    /// Subscribes to the given message types under a topic label.
    fn register(&self, topic: &str, types: &[MessageType]) -> mpsc::Receiver<IncomingMessage>;

    /// Gossips `data` to every connected peer.
    fn broadcast(&self, data: Vec<u8>, msg_type: MessageType, priority: Priority);

    /// Sends `data` to one peer.
    fn send_to_peer(&self, peer: &PeerId, data: Vec<u8>, msg_type: MessageType, priority: Priority);
}

type Subscription = (Vec<MessageType>, mpsc::Sender<IncomingMessage>);

/// In-process transport for tests and single-node devnets.
#[derive(Default)]
pub struct LoopbackNet {
    subs: Mutex<Vec<Subscription>>,
    broadcasts: Mutex<Vec<(MessageType, Priority, Vec<u8>)>>,
    directed: Mutex<Vec<(PeerId, MessageType, Priority, Vec<u8>)>>,
}

impl LoopbackNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a message to local subscribers as if `from` had sent it.
    pub fn inject(&self, from: &str, data: Vec<u8>, msg_type: MessageType) {
        let subs = self.subs.lock();
        for (types, sender) in subs.iter() {
            if !types.contains(&msg_type) {
                continue;
            }
            let msg = IncomingMessage {
                from: from.to_string(),
                data: data.clone(),
                msg_type,
            };
            if sender.try_send(msg).is_err() {
                tracing::warn!(?msg_type, "incoming channel full, dropping message");
            }
        }
    }

    /// Everything broadcast so far, in order.
    pub fn broadcast_log(&self) -> Vec<(MessageType, Priority, Vec<u8>)> {
        self.broadcasts.lock().clone()
    }

    /// Everything sent to specific peers so far, in order.
    pub fn directed_log(&self) -> Vec<(PeerId, MessageType, Priority, Vec<u8>)> {
        self.directed.lock().clone()
    }
}

impl NetService for LoopbackNet {
    fn register(&self, _topic: &str, types: &[MessageType]) -> mpsc::Receiver<IncomingMessage> {
        let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);
        self.subs.lock().push((types.to_vec(), tx));
        rx
    }

    fn broadcast(&self, data: Vec<u8>, msg_type: MessageType, priority: Priority) {
        self.broadcasts.lock().push((msg_type, priority, data));
    }

    fn send_to_peer(
        &self,
        peer: &PeerId,
        data: Vec<u8>,
        msg_type: MessageType,
        priority: Priority,
    ) {
        self.directed
            .lock()
            .push((peer.clone(), msg_type, priority, data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inject_reaches_matching_subscribers_only() {
        let net = LoopbackNet::new();
        let mut blocks = net.register("consensus", &[MessageType::NewBlock]);
        let mut txs = net.register("txpool", &[MessageType::PublishTx]);

        net.inject("peer-1", vec![1, 2, 3], MessageType::NewBlock);

        let msg = blocks.recv().await.expect("block subscriber");
        assert_eq!(msg.from, "peer-1");
        assert_eq!(msg.data, vec![1, 2, 3]);
        assert_eq!(msg.msg_type, MessageType::NewBlock);

        assert!(txs.try_recv().is_err());
    }

    #[test]
    fn outbound_traffic_is_recorded() {
        let net = LoopbackNet::new();
        net.broadcast(vec![9], MessageType::NewBlock, Priority::Urgent);
        net.send_to_peer(
            &"peer-2".to_string(),
            vec![7],
            MessageType::SyncBlockRequest,
            Priority::Normal,
        );

        let broadcasts = net.broadcast_log();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].0, MessageType::NewBlock);

        let directed = net.directed_log();
        assert_eq!(directed.len(), 1);
        assert_eq!(directed[0].0, "peer-2");
    }
}
