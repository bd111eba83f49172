//! Block synchronization.
//!
//! When the local head lags the announced best height by more than a
//! threshold, the synchronizer broadcasts a range request and tracks a
//! download mission per missing block number through the per-peer
//! [`DownloadController`]. Peers answer range requests with one
//! `SyncBlockResponse` per block, served from the finalized store or the
//! block cache.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blockcache::BlockCache;
use crate::p2p::{MessageType, NetService, PeerId, Priority};
use crate::storage::BlockStore;
use crate::types::codec;

pub mod download;

pub use download::DownloadController;

/// Tuning for the sync subsystem.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Head lag (in blocks) that triggers a range request.
    pub sync_gap: u64,
    /// Per-peer timeout for one requested block.
    pub block_timeout: Duration,
    /// Largest range requested or served in one go.
    pub batch_max: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_gap: 10,
            block_timeout: Duration::from_secs(2),
            batch_max: 100,
        }
    }
}

/// Wire payload of a `SyncBlockRequest`: an inclusive block-number range.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncRange {
    pub start: u64,
    pub end: u64,
}

/// The sync coordinator.
pub struct Synchronizer {
    cfg: SyncConfig,
    net: Arc<dyn NetService>,
    chain: Arc<dyn BlockStore>,
    dc: DownloadController,
}

impl Synchronizer {
    pub fn new(cfg: SyncConfig, net: Arc<dyn NetService>, chain: Arc<dyn BlockStore>) -> Self {
        let assign_net = Arc::clone(&net);
        let dc = DownloadController::new(
            cfg.block_timeout,
            Arc::new(move |peer: &PeerId, key: &str| {
                let Ok(number) = key.parse::<u64>() else {
                    return;
                };
                let range = SyncRange {
                    start: number,
                    end: number,
                };
                match codec::encode(&range) {
                    Ok(bytes) => assign_net.send_to_peer(
                        peer,
                        bytes,
                        MessageType::SyncBlockRequest,
                        Priority::Normal,
                    ),
                    Err(err) => tracing::warn!(%err, "failed to encode sync request"),
                }
            }),
        );
        Self {
            cfg,
            net,
            chain,
            dc,
        }
    }

    /// Makes a peer available for download assignments.
    pub fn ensure_peer(&self, peer: &PeerId) {
        self.dc.register_peer(peer);
    }

    /// Frees a peer; its in-flight requests are reassigned.
    pub fn peer_disconnected(&self, peer: &PeerId) {
        self.dc.unregister_peer(peer);
    }

    /// Should we sync, given the announced best height and our head?
    /// Returns the range to request when the lag exceeds the threshold.
    pub fn need_sync(&self, announced: u64, head: u64) -> Option<(u64, u64)> {
        if announced > head + self.cfg.sync_gap {
            let start = head + 1;
            let end = announced.min(start + self.cfg.batch_max - 1);
            Some((start, end))
        } else {
            None
        }
    }

    /// Broadcasts a range request and tracks one mission per number.
    pub fn sync_blocks(&self, start: u64, end: u64, prefer: Option<&PeerId>) {
        tracing::info!(start, end, "requesting sync range");
        let range = SyncRange { start, end };
        match codec::encode(&range) {
            Ok(bytes) => {
                self.net
                    .broadcast(bytes, MessageType::SyncBlockRequest, Priority::Normal)
            }
            Err(err) => tracing::warn!(%err, "failed to encode sync range"),
        }
        for number in start..=end {
            self.dc.create_mission(number.to_string(), prefer);
        }
    }

    /// Marks a requested block as received from `peer`.
    pub fn on_block_confirmed(&self, number: u64, peer: &PeerId) {
        self.dc.complete_mission(&number.to_string(), peer);
    }

    /// Serves a peer's range request from the finalized store, falling
    /// back to the cache for un-finalized numbers on the head chain.
    pub fn serve_range(&self, peer: &PeerId, range: &SyncRange, cache: &BlockCache) {
        let end = range.end.min(range.start.saturating_add(self.cfg.batch_max - 1));
        for number in range.start..=end {
            let block = match self.chain.get_block_by_number(number) {
                Ok(block) => Some(block),
                Err(_) => cache.get_block_by_number(number).cloned(),
            };
            let Some(block) = block else {
                break;
            };
            match block.canonical_bytes() {
                Ok(bytes) => self.net.send_to_peer(
                    peer,
                    bytes,
                    MessageType::SyncBlockResponse,
                    Priority::Normal,
                ),
                Err(err) => tracing::warn!(%err, "failed to encode block for sync response"),
            }
        }
    }
}
