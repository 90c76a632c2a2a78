//! Escrow orchestration on top of the pure primitives.
//!
//! [`EscrowEngine`] owns no global state: the escrow registry is injected at
//! construction so that independent engines (and tests) never share records.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use rand_core::CryptoRng;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::{EngineSettings, EscrowConfig};
use crate::error::{ConfigurationError, EscrowError};
use crate::holder::HolderKey;
use crate::reconstruct::{reconstruct, reconstruct_released};
use crate::registry::{EscrowRecord, EscrowRegistry, SessionRegistry};
use crate::shards::{create_shards, decrypt_shard};
use crate::signing::{create_signature_share, SessionState, SigningSession};
use crate::timelock::{create_time_locked_shards, is_time_lock_expired};
use crate::types::{
    EscrowId, EscrowStatus, HolderId, HolderPublicKey, KeyShard, RawShare, SessionId, ShardingResult,
    SignatureShare, ThresholdSignature, TimeLock, VerificationData,
};

pub struct EscrowEngine {
    settings: EngineSettings,
    escrows: Arc<EscrowRegistry>,
    sessions: SessionRegistry,
}

/// Moves a time-locked record to `Expired` once its release time passed.
fn refresh_status(record: &mut EscrowRecord, now: u64) {
    if record.status == EscrowStatus::TimeLocked {
        if let Some(lock) = &record.time_lock {
            if is_time_lock_expired(lock, now) {
                debug!(escrow_id = %record.escrow_id, "Time lock expired");
                record.status = EscrowStatus::Expired;
            }
        }
    }
}

impl EscrowEngine {
    pub fn new(settings: EngineSettings, escrows: Arc<EscrowRegistry>) -> Result<Self, EscrowError> {
        settings.validate()?;
        Ok(EscrowEngine {
            settings,
            escrows,
            sessions: SessionRegistry::new(),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<EscrowRegistry> {
        &self.escrows
    }

    /// Shards `secret` for the given holders and records the escrow.
    ///
    /// With `config.time_lock_until` set, the secret is additionally bound
    /// to a release token held behind a puzzle sized for the remaining
    /// delay (capped at `max_puzzle_difficulty`), and the escrow starts out
    /// `TimeLocked`. The engine keeps the token and uses it once the clock
    /// passes `release_at`.
    pub fn create_escrow<R: Rng + CryptoRng>(
        &self,
        secret: &[u8],
        config: &EscrowConfig,
        holder_public_keys: &BTreeMap<HolderId, HolderPublicKey>,
        now: u64,
        rng: &mut R,
    ) -> Result<ShardingResult, EscrowError> {
        config.validate()?;
        if secret.len() > self.settings.max_secret_len {
            return Err(ConfigurationError::SecretTooLong {
                len: secret.len(),
                max: self.settings.max_secret_len,
            }
            .into());
        }

        let (result, time_lock, release_token) = match config.time_lock_until {
            Some(release_at) => {
                let difficulty = self.settings.puzzle_difficulty_for(release_at.saturating_sub(now));
                let locked =
                    create_time_locked_shards(secret, config, holder_public_keys, release_at, difficulty, rng)?;
                (locked.sharding, Some(locked.time_lock), Some(locked.release_token))
            }
            None => (create_shards(secret, config, holder_public_keys, rng)?, None, None),
        };

        let mut record = EscrowRecord {
            escrow_id: result.escrow_id,
            config: config.clone(),
            verification_data: result.verification_data.clone(),
            roster: result.shards.iter().map(|s| (s.holder_id, s.index)).collect(),
            status: if time_lock.is_some() {
                EscrowStatus::TimeLocked
            } else {
                EscrowStatus::Created
            },
            time_lock,
            release_token,
            created_at: now,
        };
        refresh_status(&mut record, now);
        let status = record.status;
        self.escrows.insert(record)?;

        info!(escrow_id = %result.escrow_id, status = ?status, label = ?config.label, "Registered escrow");
        Ok(result)
    }

    /// Records that the shards have been handed to their holders.
    ///
    /// Only a `Created` escrow moves. Every other status, including
    /// `TimeLocked` and `Expired`, is returned unchanged: the time-lock
    /// states take precedence over distribution tracking.
    pub fn mark_distributed(&self, escrow_id: &EscrowId) -> Result<EscrowStatus, EscrowError> {
        self.escrows.with_record(escrow_id, |record| {
            if record.status == EscrowStatus::Created {
                record.status = EscrowStatus::ShardsDistributed;
                debug!(escrow_id = %escrow_id, "Shards distributed");
            }
            Ok(record.status)
        })
    }

    pub fn status(&self, escrow_id: &EscrowId, now: u64) -> Result<EscrowStatus, EscrowError> {
        self.escrows.with_record(escrow_id, |record| {
            refresh_status(record, now);
            Ok(record.status)
        })
    }

    pub fn verification_data(&self, escrow_id: &EscrowId) -> Result<VerificationData, EscrowError> {
        self.escrows
            .with_record(escrow_id, |record| Ok(record.verification_data.clone()))
    }

    pub fn time_lock(&self, escrow_id: &EscrowId) -> Result<Option<TimeLock>, EscrowError> {
        self.escrows.with_record(escrow_id, |record| Ok(record.time_lock.clone()))
    }

    /// Recovers the secret of a registered escrow.
    ///
    /// Refused with `TimeLockActive` while the escrow is time-locked. A
    /// failed attempt leaves the escrow `ReconstructionPending` so the
    /// caller can collect more shares and retry; an escrow that was already
    /// `Reconstructed` keeps that status.
    pub fn reconstruct(
        &self,
        escrow_id: &EscrowId,
        shares: &[RawShare],
        now: u64,
    ) -> Result<Zeroizing<Vec<u8>>, EscrowError> {
        self.escrows.with_record(escrow_id, |record| {
            refresh_status(record, now);
            if record.status == EscrowStatus::TimeLocked {
                let release_at = record.time_lock.as_ref().map(|l| l.release_at).unwrap_or_default();
                return Err(EscrowError::TimeLockActive { release_at });
            }
            let outcome = match &record.release_token {
                Some(token) => reconstruct_released(shares, &record.verification_data, &record.config, token),
                None => reconstruct(shares, &record.verification_data, &record.config),
            };
            match outcome {
                Ok(secret) => {
                    record.status = EscrowStatus::Reconstructed;
                    info!(escrow_id = %escrow_id, "Escrow reconstructed");
                    Ok(secret)
                }
                Err(e) => {
                    if record.status != EscrowStatus::Reconstructed {
                        record.status = EscrowStatus::ReconstructionPending;
                    }
                    debug!(escrow_id = %escrow_id, error = %e, "Reconstruction attempt failed");
                    Err(e)
                }
            }
        })
    }

    /// Starts collecting signature shares over `message` for one escrow.
    pub fn open_signing_session<R: Rng + CryptoRng>(
        &self,
        escrow_id: &EscrowId,
        message: &[u8],
        rng: &mut R,
    ) -> Result<SessionId, EscrowError> {
        let session = self.escrows.with_record(escrow_id, |record| {
            SigningSession::new(
                SessionId::random(rng),
                record.escrow_id,
                &record.verification_data,
                record.roster.clone(),
                message,
            )
        })?;
        let session_id = self.sessions.insert(session)?;
        info!(escrow_id = %escrow_id, session_id = %session_id, "Opened signing session");
        Ok(session_id)
    }

    pub fn submit_signature_share(
        &self,
        session_id: &SessionId,
        share: SignatureShare,
    ) -> Result<SessionState, EscrowError> {
        self.sessions.with_session(session_id, |session| session.submit(share))
    }

    pub fn combine_signatures(
        &self,
        session_id: &SessionId,
        message: &[u8],
        threshold: usize,
    ) -> Result<ThresholdSignature, EscrowError> {
        self.sessions
            .with_session(session_id, |session| session.combine(message, threshold))
    }

    pub fn session_state(&self, session_id: &SessionId) -> Result<SessionState, EscrowError> {
        self.sessions.with_session(session_id, |session| Ok(session.state()))
    }

    /// Holder side of a signing round: unwraps the holder's shard and signs
    /// with it. The key is reached only through the [`HolderKey`]
    /// capability.
    pub fn holder_signature_share<R: Rng + CryptoRng>(
        shard: &KeyShard,
        holder: &dyn HolderKey,
        message: &[u8],
        rng: &mut R,
    ) -> Result<SignatureShare, EscrowError> {
        let raw = decrypt_shard(shard, holder)?;
        create_signature_share(holder.holder_id(), &raw, message, rng)
    }
}
