//! Per-peer download controller.
//!
//! Missions (blocks to fetch, keyed by a string id) move through
//! `Wait -> Working(peer) -> Done`. Each registered peer runs its own
//! task fed by a command channel; an assigned mission starts a timeout
//! timer on that task, and on expiry the mission moves back to `Wait`
//! and the peer is freed for reassignment. A central dispatch pairs
//! waiting missions with free peers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::p2p::PeerId;

/// Callback fired when a mission is assigned to a peer; sends the actual
/// request over the transport.
pub type AssignFn = Arc<dyn Fn(&PeerId, &str) + Send + Sync>;

#[derive(Clone, Debug, Eq, PartialEq)]
enum MissionState {
    Wait,
    Working(PeerId),
    Done,
}

enum PeerCmd {
    Assign(String),
    Complete(String),
    Stop,
}

struct PeerEntry {
    tx: mpsc::UnboundedSender<PeerCmd>,
    busy: bool,
}

struct DcInner {
    timeout: Duration,
    missions: Mutex<HashMap<String, MissionState>>,
    peers: Mutex<HashMap<PeerId, PeerEntry>>,
    on_assign: AssignFn,
}

impl DcInner {
    /// Pairs waiting missions with free peers, preferring `prefer` when
    /// it is free.
    fn dispatch(&self, prefer: Option<&PeerId>) {
        let mut missions = self.missions.lock();
        let mut peers = self.peers.lock();
        for (key, state) in missions.iter_mut() {
            if *state != MissionState::Wait {
                continue;
            }
            let peer_id = prefer
                .filter(|p| peers.get(*p).map(|e| !e.busy).unwrap_or(false))
                .cloned()
                .or_else(|| {
                    peers
                        .iter()
                        .find(|(_, e)| !e.busy)
                        .map(|(id, _)| id.clone())
                });
            let Some(peer_id) = peer_id else {
                break;
            };
            let entry = peers.get_mut(&peer_id).expect("free peer entry");
            if entry.tx.send(PeerCmd::Assign(key.clone())).is_ok() {
                entry.busy = true;
                *state = MissionState::Working(peer_id);
            }
        }
    }

    fn timeout_mission(&self, key: &str, peer: &PeerId) {
        {
            let mut missions = self.missions.lock();
            match missions.get_mut(key) {
                Some(state) if *state == MissionState::Working(peer.clone()) => {
                    *state = MissionState::Wait;
                }
                _ => return,
            }
            if let Some(entry) = self.peers.lock().get_mut(peer) {
                entry.busy = false;
            }
        }
        tracing::debug!(%peer, mission = key, "sync request timed out, requeueing");
        self.dispatch(None);
    }
}

async fn peer_task(inner: Arc<DcInner>, peer: PeerId, mut rx: mpsc::UnboundedReceiver<PeerCmd>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            PeerCmd::Stop => break,
            PeerCmd::Complete(_) => {}
            PeerCmd::Assign(key) => {
                (inner.on_assign)(&peer, &key);
                let deadline = tokio::time::sleep(inner.timeout);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        cmd = rx.recv() => match cmd {
                            Some(PeerCmd::Complete(done)) if done == key => break,
                            Some(PeerCmd::Complete(_)) => {}
                            Some(PeerCmd::Assign(other)) => {
                                // The controller never assigns to a busy
                                // peer; treat a stray assign as waiting.
                                tracing::warn!(%peer, mission = other, "assign to busy peer dropped");
                            }
                            Some(PeerCmd::Stop) | None => return,
                        },
                        _ = &mut deadline => {
                            inner.timeout_mission(&key, &peer);
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Central mission queue plus per-peer workers.
pub struct DownloadController {
    inner: Arc<DcInner>,
}

impl DownloadController {
    pub fn new(timeout: Duration, on_assign: AssignFn) -> Self {
        Self {
            inner: Arc::new(DcInner {
                timeout,
                missions: Mutex::new(HashMap::new()),
                peers: Mutex::new(HashMap::new()),
                on_assign,
            }),
        }
    }

    /// Registers a peer and spawns its worker; a no-op if already known.
    pub fn register_peer(&self, peer: &PeerId) {
        {
            let mut peers = self.inner.peers.lock();
            if peers.contains_key(peer) {
                return;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            peers.insert(peer.clone(), PeerEntry { tx, busy: false });
            tokio::spawn(peer_task(Arc::clone(&self.inner), peer.clone(), rx));
        }
        self.inner.dispatch(Some(peer));
    }

    /// Drops a peer; its in-flight mission goes back to `Wait`.
    pub fn unregister_peer(&self, peer: &PeerId) {
        let removed = self.inner.peers.lock().remove(peer);
        if let Some(entry) = removed {
            let _ = entry.tx.send(PeerCmd::Stop);
        }
        let mut requeued = false;
        {
            let mut missions = self.inner.missions.lock();
            for state in missions.values_mut() {
                if *state == MissionState::Working(peer.clone()) {
                    *state = MissionState::Wait;
                    requeued = true;
                }
            }
        }
        if requeued {
            self.inner.dispatch(None);
        }
    }

    /// Enqueues a mission unless it is already tracked.
    pub fn create_mission(&self, key: String, prefer: Option<&PeerId>) {
        {
            let mut missions = self.inner.missions.lock();
            if missions.contains_key(&key) {
                return;
            }
            missions.insert(key, MissionState::Wait);
        }
        self.inner.dispatch(prefer);
    }

    /// Marks a mission done and frees its peer.
    pub fn complete_mission(&self, key: &str, peer: &PeerId) {
        {
            let mut missions = self.inner.missions.lock();
            let Some(state) = missions.get_mut(key) else {
                return;
            };
            *state = MissionState::Done;
        }
        let mut peers = self.inner.peers.lock();
        if let Some(entry) = peers.get_mut(peer) {
            entry.busy = false;
            let _ = entry.tx.send(PeerCmd::Complete(key.to_string()));
        }
        drop(peers);
        self.inner.dispatch(None);
    }

    /// Forgets all missions (peers stay registered).
    pub fn reset(&self) {
        self.inner.missions.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_controller(timeout: Duration) -> (DownloadController, Arc<Mutex<Vec<(PeerId, String)>>>) {
        let calls: Arc<Mutex<Vec<(PeerId, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let dc = DownloadController::new(
            timeout,
            Arc::new(move |peer: &PeerId, key: &str| {
                recorded.lock().push((peer.clone(), key.to_string()));
            }),
        );
        (dc, calls)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(30), async {
            while !cond() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition within virtual time budget");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn missions_are_assigned_to_free_peers() {
        let (dc, calls) = recording_controller(Duration::from_secs(2));
        let peer = "peer-1".to_string();
        dc.register_peer(&peer);

        dc.create_mission("7".to_string(), Some(&peer));
        wait_until(|| calls.lock().len() == 1).await;
        assert_eq!(calls.lock()[0], (peer.clone(), "7".to_string()));

        // The peer is busy: a second mission waits...
        dc.create_mission("8".to_string(), None);
        tokio::task::yield_now().await;
        assert_eq!(calls.lock().len(), 1);

        // ...until the first completes.
        dc.complete_mission("7", &peer);
        wait_until(|| calls.lock().len() == 2).await;
        assert_eq!(calls.lock()[1].1, "8");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn timed_out_missions_are_requeued() {
        let (dc, calls) = recording_controller(Duration::from_secs(2));
        let peer = "peer-1".to_string();
        dc.register_peer(&peer);

        dc.create_mission("42".to_string(), Some(&peer));
        wait_until(|| calls.lock().len() == 1).await;

        // No completion arrives; the timeout frees the peer and the
        // mission is reassigned.
        wait_until(|| calls.lock().len() >= 2).await;
        assert!(calls.lock().iter().all(|(_, k)| k == "42"));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn disconnect_requeues_in_flight_missions() {
        let (dc, calls) = recording_controller(Duration::from_secs(1_000));
        let gone = "peer-gone".to_string();
        dc.register_peer(&gone);
        dc.create_mission("5".to_string(), Some(&gone));
        wait_until(|| calls.lock().len() == 1).await;

        dc.unregister_peer(&gone);
        let other = "peer-2".to_string();
        dc.register_peer(&other);
        wait_until(|| calls.lock().len() == 2).await;
        assert_eq!(calls.lock()[1], (other, "5".to_string()));
    }
}
