//! Chain library crate.
//!
//! This crate provides the consensus core of a delegated
//! proof-of-believability blockchain node:
//!
//! - strongly-typed domain types (`types`),
//! - keypairs and witness identifiers (`account`),
//! - a fork-aware cache of un-finalized blocks (`blockcache`),
//! - a fork-scoped, priority-ordered transaction pool (`txpool`),
//! - the slot scheduler, producer and finality engine (`consensus`),
//! - block synchronization with per-peer download control (`synchro`),
//! - versioned state-store and execution-engine facades (`state`, `vm`),
//! - storage backends for the finalized chain (`storage`),
//! - the abstract peer transport surface (`p2p`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries can compose these pieces to build validator
//! nodes, simulators, and experiment harnesses.

pub mod account;
pub mod blockcache;
pub mod config;
pub mod consensus;
pub mod metrics;
pub mod p2p;
pub mod state;
pub mod storage;
pub mod synchro;
pub mod txpool;
pub mod types;
pub mod vm;

// Re-export top-level configuration types.
pub use config::{ChainConfig, MetricsConfig};

// Re-export "core" consensus types.
pub use consensus::{
    BlockOrigin, ConsensusConfig, ConsensusError, GenesisConfig, Pob, PobHandle, StaticProperty,
    build_genesis,
};

// Re-export identity helpers.
pub use account::{Account, id_by_pubkey, pubkey_by_id};

// Re-export cache and pool surfaces.
pub use blockcache::{BlockCache, BlockCacheNode, NodeType};
pub use txpool::{AddTxResult, TxExist, TxPool, TxPoolConfig};

// Re-export storage backends and facades.
pub use state::{MemStateStore, StateStore};
pub use storage::{BlockStore, InMemoryBlockStore, RocksDbBlockStore, RocksDbConfig};
pub use vm::{Engine, TransferEngine};

// Re-export the transport surface.
pub use p2p::{IncomingMessage, LoopbackNet, MessageType, NetService, Priority};

// Re-export metrics registry and exporter.
pub use metrics::{ConsensusMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the default execution engine behind the VM facade.
pub type DefaultEngine = TransferEngine;

/// Type alias for the default block store backend.
pub type DefaultBlockStore = RocksDbBlockStore;

/// Type alias for the default consensus service stack.
///
/// This uses the built-in token engine; nodes embedding a full virtual
/// machine substitute their own [`Engine`] implementation.
pub type DefaultPob = Pob<DefaultEngine>;
