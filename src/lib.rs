//! Library entry point for the mpc_escrow crate.
//
// Exposes modules for use by binaries, benchmarks and integration tests.

pub mod config;
pub mod crypto;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod holder;
pub mod reconstruct;
pub mod registry;
pub mod shards;
pub mod signing;
pub mod timelock;
pub mod types;

pub use config::{EngineSettings, EscrowConfig, MAX_SHARDS, MIN_THRESHOLD};
pub use engine::EscrowEngine;
pub use error::{ConfigurationError, EscrowError};
pub use holder::{HolderKey, SoftwareHolderKey};
pub use reconstruct::{reconstruct, reconstruct_released};
pub use shards::{create_shards, decrypt_shard, verify_shard};
pub use signing::{create_signature_share, verify_threshold_signature, SessionState, SigningSession};
pub use timelock::{
    create_time_lock, create_time_locked_shards, is_time_lock_expired, solve_release_token, solve_time_lock,
};
