//! The proof-of-believability service: admission loop and producer.
//!
//! Three long-lived tasks make up the consensus core at runtime:
//!
//! - the **admission loop** consumes incoming blocks from the transport
//!   and self-produced blocks from the producer over bounded channels.
//!   Every block-cache and finality mutation happens here, making the
//!   cache and the static property effectively single-writer;
//! - the **producer** sleeps until the next slot boundary and assembles
//!   a block when the local node is the elected witness, then enqueues
//!   it on the admission channel like any other block;
//! - the **pool maintenance** task periodically sweeps expired entries
//!   (spawned from the transaction pool module).
//!
//! Shutdown closes a watch channel observed by every loop.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use crate::account::Account;
use crate::blockcache::{BlockCache, NodeIndex, NodeType};
use crate::metrics::MetricsRegistry;
use crate::p2p::{IncomingMessage, MessageType, NetService, PeerId, Priority};
use crate::state::StateStore;
use crate::storage::BlockStore;
use crate::synchro::{SyncConfig, SyncRange, Synchronizer};
use crate::txpool::{self, TxPool};
use crate::types::block::Block;
use crate::types::codec;
use crate::types::Tx;
use crate::vm::Engine;

use super::algorithm::{
    calculate_confirm, generate_block, read_pending_witness_list, update_watermark, verify_basics,
    verify_block,
};
use super::config::ConsensusConfig;
use super::error::ConsensusError;
use super::property::{StaticProperty, slot_of_unix_sec};

/// Capacity of the self-produced block channel.
const GEN_BLOCK_CAPACITY: usize = 10;

/// Where a block entered the admission loop from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BlockOrigin {
    /// Assembled by the local producer.
    Produced,
    /// Arrived on the new-block gossip channel.
    Gossip(PeerId),
    /// Arrived as a sync response.
    SyncResponse(PeerId),
}

fn unix_now_sec() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Duration until the next slot boundary.
fn time_until_next_slot(slot_length: Duration) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let slot_ns = slot_length.as_nanos();
    let rem = now.as_nanos() % slot_ns;
    Duration::from_nanos((slot_ns - rem) as u64)
}

/// The admission half: single writer of the cache, property and LIB.
pub(crate) struct Admission<E: Engine> {
    pub(crate) account: Account,
    pub(crate) cfg: ConsensusConfig,
    pub(crate) cache: Arc<RwLock<BlockCache>>,
    pub(crate) property: Arc<RwLock<StaticProperty>>,
    pub(crate) pool: Arc<TxPool>,
    pub(crate) chain: Arc<dyn BlockStore>,
    pub(crate) verify_db: Box<dyn StateStore>,
    pub(crate) engine: Arc<E>,
    pub(crate) net: Arc<dyn NetService>,
    pub(crate) sync: Arc<Synchronizer>,
    pub(crate) metrics: Arc<MetricsRegistry>,
}

impl<E: Engine> Admission<E> {
    /// Processes one block through verification, linkage, finality and
    /// pool updates. Errors reject the block; nothing is retried.
    pub(crate) fn handle_block(
        &mut self,
        block: Block,
        _origin: BlockOrigin,
    ) -> Result<(), ConsensusError> {
        if self.cache.read().find(&block.hash()).is_some() {
            return Err(ConsensusError::DuplicateBlock);
        }
        verify_basics(&self.property.read(), &block)?;

        let parent_type = {
            let cache = self.cache.read();
            cache
                .find(&block.head.parent_hash)
                .map(|idx| cache.node(idx).node_type)
        };
        let slot = block.head.time;
        let number = block.head.number;
        let idx = self.cache.write().add(block)?;
        match parent_type {
            Some(NodeType::Linked) => self.link_verified_subtree(idx)?,
            _ => {
                // Ancestors still missing: the node stays Single, but
                // its slot is occupied from now on.
                tracing::debug!(number, slot, "cached block with missing ancestry");
                self.property.write().add_slot(slot);
            }
        }
        Ok(())
    }

    /// Verifies and links `start`, then walks its (previously single)
    /// descendants. Failures below `start` only remove the offending
    /// subtree; the first failure on `start` itself propagates.
    fn link_verified_subtree(&mut self, start: NodeIndex) -> Result<(), ConsensusError> {
        self.verify_and_link(start)?;
        let mut stack: Vec<NodeIndex> = self.cache.read().node(start).children.clone();
        while let Some(idx) = stack.pop() {
            match self.verify_and_link(idx) {
                Ok(()) => stack.extend(self.cache.read().node(idx).children.clone()),
                Err(err) => {
                    tracing::debug!(%err, "descendant block rejected");
                    self.metrics
                        .consensus
                        .rejected_block_count
                        .with_label_values(&[err.metric_label()])
                        .inc();
                }
            }
        }
        Ok(())
    }

    fn verify_and_link(&mut self, idx: NodeIndex) -> Result<(), ConsensusError> {
        let (block, parent_block) = {
            let cache = self.cache.read();
            let node = cache.node(idx);
            let parent = node.parent.expect("linked candidate has a parent");
            (node.block.clone(), cache.node(parent).block.clone())
        };

        if block.head.witness != self.account.id {
            let parent_tag = parent_block.hash().to_hex();
            if !self.verify_db.checkout(&parent_tag) {
                self.cache.write().del(idx)?;
                return Err(ConsensusError::MissingStateTag(parent_tag));
            }
            if let Err(err) = verify_block(
                &block,
                &parent_block,
                &self.pool,
                &mut *self.verify_db,
                &*self.engine,
                &self.cfg,
            ) {
                self.cache.write().del(idx)?;
                return Err(err);
            }
            self.verify_db.tag(&block.hash().to_hex());
        } else {
            // Locally produced: the state was tagged during assembly.
            let own_tag = block.hash().to_hex();
            if !self.verify_db.checkout(&own_tag) {
                self.cache.write().del(idx)?;
                return Err(ConsensusError::MissingStateTag(own_tag));
            }
        }

        self.cache.write().link(idx)?;
        self.update_info(idx)
    }

    /// Post-linkage bookkeeping: watermark and slot, pending witness
    /// snapshot, LIB advancement, pool reconciliation.
    fn update_info(&mut self, idx: NodeIndex) -> Result<(), ConsensusError> {
        {
            let mut cache = self.cache.write();
            let parent_list = cache
                .node(idx)
                .parent
                .map(|p| cache.node(p).pending_witness_list.clone())
                .unwrap_or_default();
            let mut property = self.property.write();
            let node = cache.node_mut(idx);
            property.add_slot(node.block.head.time);
            update_watermark(&mut property, node);
            // The verify db is checked out at this block's state.
            node.pending_witness_list =
                read_pending_witness_list(&*self.verify_db).unwrap_or(parent_list);
        }

        let confirmed = {
            let cache = self.cache.read();
            let property = self.property.read();
            calculate_confirm(
                &cache,
                idx,
                cache.linked_root(),
                property.confirm_limit(),
            )
        };
        if let Some(confirmed) = confirmed {
            self.flush_lib(confirmed)?;
        }

        let (block, head_block) = {
            let cache = self.cache.read();
            (
                cache.block(idx).clone(),
                cache.block(cache.head()).clone(),
            )
        };
        self.pool.add_linked_node(&block, &head_block);
        Ok(())
    }

    /// Advances the last irreversible block: persists the newly
    /// confirmed path, flushes the state store, re-roots the cache and
    /// adopts the confirmed block's pending witness schedule.
    fn flush_lib(&mut self, confirmed: NodeIndex) -> Result<(), ConsensusError> {
        let pending_list = self.cache.read().node(confirmed).pending_witness_list.clone();
        let flushed = self.cache.write().flush(confirmed)?;
        for block in &flushed {
            self.chain.push(block)?;
        }

        let root_block = {
            let cache = self.cache.read();
            cache.block(cache.linked_root()).clone()
        };
        tracing::info!(
            number = root_block.head.number,
            hash = %root_block.hash().to_hex(),
            "advanced last irreversible block"
        );
        self.verify_db.flush(&root_block.hash().to_hex())?;
        self.pool.set_lib(&root_block);
        {
            let mut property = self.property.write();
            property.update_witness_list(pending_list);
            property.prune_slots(root_block.head.time);
        }
        self.metrics
            .consensus
            .confirmed_blockchain_length
            .set(self.chain.length() as i64);
        Ok(())
    }

    fn handle_incoming(&mut self, msg: IncomingMessage) {
        self.sync.ensure_peer(&msg.from);
        match msg.msg_type {
            MessageType::NewBlock | MessageType::SyncBlockResponse => {
                let block = match Block::decode(&msg.data) {
                    Ok(block) => block,
                    Err(err) => {
                        tracing::debug!(%err, from = %msg.from, "undecodable block");
                        return;
                    }
                };
                self.metrics.consensus.received_block_count.inc();
                let number = block.head.number;
                let origin = match msg.msg_type {
                    MessageType::NewBlock => BlockOrigin::Gossip(msg.from.clone()),
                    _ => BlockOrigin::SyncResponse(msg.from.clone()),
                };
                if let Err(err) = self.handle_block(block, origin.clone()) {
                    tracing::debug!(%err, number, "rejected incoming block");
                    self.metrics
                        .consensus
                        .rejected_block_count
                        .with_label_values(&[err.metric_label()])
                        .inc();
                    return;
                }
                match origin {
                    BlockOrigin::SyncResponse(peer) => {
                        self.sync.on_block_confirmed(number, &peer);
                    }
                    BlockOrigin::Gossip(peer) => {
                        // Re-gossip at urgent priority, then check whether
                        // the announced height says we are behind.
                        self.net
                            .broadcast(msg.data, MessageType::NewBlock, Priority::Urgent);
                        let head_number = {
                            let cache = self.cache.read();
                            cache.block(cache.head()).head.number
                        };
                        if let Some((start, end)) = self.sync.need_sync(number, head_number) {
                            self.sync.sync_blocks(start, end, Some(&peer));
                        }
                    }
                    BlockOrigin::Produced => unreachable!("network origins only"),
                }
            }
            MessageType::SyncBlockRequest => match codec::decode::<SyncRange>(&msg.data) {
                Ok(range) => {
                    let cache = self.cache.read();
                    self.sync.serve_range(&msg.from, &range, &cache);
                }
                Err(err) => tracing::debug!(%err, "undecodable sync request"),
            },
            MessageType::PublishTx => match Tx::decode(&msg.data) {
                Ok(tx) => {
                    let _ = self.pool.add_network_tx(tx);
                }
                Err(err) => tracing::debug!(%err, "undecodable tx"),
            },
        }
    }

    async fn run(
        mut self,
        mut rx_net: mpsc::Receiver<IncomingMessage>,
        mut rx_gen: mpsc::Receiver<Block>,
        mut exit: watch::Receiver<bool>,
    ) {
        tracing::info!("admission loop started");
        loop {
            tokio::select! {
                incoming = rx_net.recv() => {
                    let Some(msg) = incoming else { break };
                    self.handle_incoming(msg);
                }
                produced = rx_gen.recv() => {
                    let Some(block) = produced else { break };
                    if let Err(err) = self.handle_block(block, BlockOrigin::Produced) {
                        tracing::warn!(%err, "self-produced block rejected");
                        self.metrics
                            .consensus
                            .rejected_block_count
                            .with_label_values(&[err.metric_label()])
                            .inc();
                    }
                }
                changed = exit.changed() => {
                    if changed.is_err() || *exit.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("admission loop stopped");
    }
}

/// The producer half: slot timer plus block assembly.
pub(crate) struct Producer<E: Engine> {
    pub(crate) account: Account,
    pub(crate) cfg: ConsensusConfig,
    pub(crate) cache: Arc<RwLock<BlockCache>>,
    pub(crate) property: Arc<RwLock<StaticProperty>>,
    pub(crate) pool: Arc<TxPool>,
    pub(crate) produce_db: Box<dyn StateStore>,
    pub(crate) engine: Arc<E>,
    pub(crate) net: Arc<dyn NetService>,
    pub(crate) gen_tx: mpsc::Sender<Block>,
    pub(crate) metrics: Arc<MetricsRegistry>,
}

impl<E: Engine> Producer<E> {
    /// Assembles a block for `slot` on top of the current head.
    fn produce(&mut self, slot: i64) -> Result<Block, ConsensusError> {
        let head_block = {
            let cache = self.cache.read();
            cache.block(cache.head()).clone()
        };
        generate_block(
            &self.account,
            &head_block,
            slot,
            &self.pool,
            &mut *self.produce_db,
            &*self.engine,
            &self.cfg,
        )
    }

    async fn run(mut self, mut exit: watch::Receiver<bool>) {
        tracing::info!(witness = %self.account.id, "schedule loop started");
        loop {
            let wait = time_until_next_slot(self.cfg.slot_length);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = exit.changed() => {
                    if changed.is_err() || *exit.borrow() {
                        break;
                    }
                }
            }

            let slot = slot_of_unix_sec(unix_now_sec(), self.cfg.slot_length.as_secs());
            let elected = self
                .property
                .read()
                .witness_of_slot(slot)
                .map(str::to_string);
            if elected.as_deref() != Some(self.account.id.as_str()) {
                continue;
            }

            match self.produce(slot) {
                Ok(block) => {
                    self.metrics.consensus.generated_block_count.inc();
                    tracing::info!(number = block.head.number, slot, "produced block");
                    match block.canonical_bytes() {
                        Ok(bytes) => {
                            self.net
                                .broadcast(bytes, MessageType::NewBlock, Priority::Urgent)
                        }
                        Err(err) => tracing::warn!(%err, "failed to encode produced block"),
                    }
                    if self.gen_tx.send(block).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(%err, slot, "block production failed"),
            }
        }
        tracing::info!("schedule loop stopped");
    }
}

/// The assembled consensus service, ready to run.
pub struct Pob<E: Engine + 'static> {
    admission: Admission<E>,
    producer: Producer<E>,
    pool: Arc<TxPool>,
    rx_net: mpsc::Receiver<IncomingMessage>,
    rx_gen: mpsc::Receiver<Block>,
}

/// Handle to a running [`Pob`]; dropping it does not stop the service,
/// call [`PobHandle::stop`].
pub struct PobHandle {
    exit: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl PobHandle {
    /// Signals every loop to drain and waits for them to return.
    pub async fn stop(self) {
        let _ = self.exit.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

impl<E: Engine + 'static> Pob<E> {
    /// Wires the consensus core around its collaborators.
    ///
    /// `root_block` is the cache root: the genesis block on first start,
    /// otherwise the top of the finalized store. `state_db` is the
    /// primary (verification) handle; the producer works on a fork.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: Account,
        cfg: ConsensusConfig,
        root_block: Block,
        state_db: Box<dyn StateStore>,
        chain: Arc<dyn BlockStore>,
        pool: Arc<TxPool>,
        engine: Arc<E>,
        net: Arc<dyn NetService>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let rx_net = net.register(
            "consensus",
            &[
                MessageType::NewBlock,
                MessageType::SyncBlockRequest,
                MessageType::SyncBlockResponse,
                MessageType::PublishTx,
            ],
        );
        let (gen_tx, rx_gen) = mpsc::channel(GEN_BLOCK_CAPACITY);

        let produce_db = state_db.fork();
        let cache = Arc::new(RwLock::new(BlockCache::new(
            root_block.clone(),
            cfg.witness_list.clone(),
        )));
        let property = Arc::new(RwLock::new(StaticProperty::new(
            account.id.clone(),
            cfg.witness_list.clone(),
        )));
        pool.set_lib(&root_block);
        if let Err(err) = chain.push(&root_block) {
            tracing::warn!(%err, "failed to persist cache root");
        }

        let sync = Arc::new(Synchronizer::new(
            SyncConfig {
                sync_gap: cfg.sync_gap,
                ..SyncConfig::default()
            },
            Arc::clone(&net),
            Arc::clone(&chain),
        ));

        let admission = Admission {
            account: account.clone(),
            cfg: cfg.clone(),
            cache: Arc::clone(&cache),
            property: Arc::clone(&property),
            pool: Arc::clone(&pool),
            chain,
            verify_db: state_db,
            engine: Arc::clone(&engine),
            net: Arc::clone(&net),
            sync,
            metrics: Arc::clone(&metrics),
        };
        let producer = Producer {
            account,
            cfg,
            cache,
            property,
            pool: Arc::clone(&pool),
            produce_db,
            engine,
            net,
            gen_tx,
            metrics,
        };
        Self {
            admission,
            producer,
            pool,
            rx_net,
            rx_gen,
        }
    }

    /// Spawns the admission loop, the schedule loop and the pool
    /// maintenance task.
    pub fn run(self) -> PobHandle {
        let (exit_tx, exit_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(self.admission.run(self.rx_net, self.rx_gen, exit_rx.clone())),
            tokio::spawn(self.producer.run(exit_rx.clone())),
            txpool::spawn_maintenance(self.pool, exit_rx),
        ];
        PobHandle {
            exit: exit_tx,
            tasks,
        }
    }
}
