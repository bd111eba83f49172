//! Proof-of-believability consensus.
//!
//! This module wires the fork-aware block cache, the transaction pool,
//! the slot scheduler and the finality engine into a running service:
//!
//! - configuration parameters ([`config::ConsensusConfig`]),
//! - global consensus state ([`property::StaticProperty`]),
//! - the core algorithms ([`algorithm`]): production, verification,
//!   watermarks and the LIB computation,
//! - genesis bootstrap ([`genesis`]),
//! - the admission/producer service ([`pob::Pob`]).

pub mod algorithm;
pub mod config;
pub mod error;
pub mod genesis;
pub mod pob;
pub mod property;

pub use algorithm::{calculate_confirm, generate_block, verify_basics, verify_block};
pub use config::ConsensusConfig;
pub use error::ConsensusError;
pub use genesis::{GenesisConfig, build_genesis};
pub use pob::{BlockOrigin, Pob, PobHandle};
pub use property::{StaticProperty, slot_of_unix_sec};
