//! Keyed stores for escrows and signing sessions.
//!
//! The outer lock only guards the map; each entry has its own mutex, so
//! work on different ids never contends while work on one id is
//! serialized. Entries are never removed.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::EscrowConfig;
use crate::error::EscrowError;
use crate::signing::SigningSession;
use crate::types::{EscrowId, EscrowStatus, HolderId, ReleaseToken, SessionId, TimeLock, VerificationData};

/// Append-only map from id to a lockable record.
pub struct KeyedStore<K, V> {
    entries: RwLock<HashMap<K, Arc<Mutex<V>>>>,
}

impl<K: Eq + Hash + Copy, V> Default for KeyedStore<K, V> {
    fn default() -> Self {
        KeyedStore {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Copy, V> KeyedStore<K, V> {
    /// Returns `false` and drops `value` if `key` is already present.
    pub fn insert(&self, key: K, value: V) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, Arc::new(Mutex::new(value)));
        true
    }

    pub fn get(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.entries.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Everything the engine remembers about one escrow. Apart from
/// `release_token`, which the engine keeps to release a time-locked escrow
/// on the clock, this is public material.
#[derive(Clone, Debug)]
pub struct EscrowRecord {
    pub escrow_id: EscrowId,
    pub config: EscrowConfig,
    pub verification_data: VerificationData,
    /// Shard index given to each holder.
    pub roster: BTreeMap<HolderId, u32>,
    pub time_lock: Option<TimeLock>,
    pub release_token: Option<ReleaseToken>,
    pub status: EscrowStatus,
    pub created_at: u64,
}

#[derive(Default)]
pub struct EscrowRegistry {
    store: KeyedStore<EscrowId, EscrowRecord>,
}

impl EscrowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: EscrowRecord) -> Result<(), EscrowError> {
        let escrow_id = record.escrow_id;
        if !self.store.insert(escrow_id, record) {
            return Err(EscrowError::DuplicateEscrow(escrow_id));
        }
        Ok(())
    }

    pub fn get(&self, escrow_id: &EscrowId) -> Result<Arc<Mutex<EscrowRecord>>, EscrowError> {
        self.store
            .get(escrow_id)
            .ok_or(EscrowError::UnknownEscrow(*escrow_id))
    }

    /// Runs `f` with exclusive access to one record.
    pub fn with_record<T>(
        &self,
        escrow_id: &EscrowId,
        f: impl FnOnce(&mut EscrowRecord) -> Result<T, EscrowError>,
    ) -> Result<T, EscrowError> {
        let record = self.get(escrow_id)?;
        let mut guard = record.lock();
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    store: KeyedStore<SessionId, SigningSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session ids are random, so a collision is treated as an internal
    /// failure rather than retried.
    pub fn insert(&self, session: SigningSession) -> Result<SessionId, EscrowError> {
        let session_id = session.session_id();
        if !self.store.insert(session_id, session) {
            return Err(EscrowError::InvalidShare(format!(
                "signing session {} already exists",
                session_id
            )));
        }
        Ok(session_id)
    }

    pub fn with_session<T>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut SigningSession) -> Result<T, EscrowError>,
    ) -> Result<T, EscrowError> {
        let session = self
            .store
            .get(session_id)
            .ok_or(EscrowError::UnknownSession(*session_id))?;
        let mut guard = session.lock();
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rand::thread_rng;

    use super::*;
    use crate::types::SealedSecret;

    fn record(escrow_id: EscrowId) -> EscrowRecord {
        EscrowRecord {
            escrow_id,
            config: EscrowConfig::new(2, 3),
            verification_data: VerificationData {
                coefficient_commitments: vec![[0u8; 32]; 2],
                secret_hash: [0u8; 32],
                threshold: 2,
                total_shards: 3,
                release_at: None,
                sealed_secret: SealedSecret {
                    nonce: [0u8; 24],
                    ciphertext: Vec::new(),
                },
            },
            roster: BTreeMap::new(),
            time_lock: None,
            release_token: None,
            status: EscrowStatus::Created,
            created_at: 0,
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let registry = EscrowRegistry::new();
        let id = EscrowId::random(&mut thread_rng());
        registry.insert(record(id)).unwrap();
        assert_eq!(registry.insert(record(id)).unwrap_err(), EscrowError::DuplicateEscrow(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let registry = EscrowRegistry::new();
        let id = EscrowId::random(&mut thread_rng());
        assert!(matches!(registry.get(&id), Err(EscrowError::UnknownEscrow(_))));

        let sessions = SessionRegistry::new();
        let sid = SessionId::random(&mut thread_rng());
        assert_eq!(
            sessions.with_session(&sid, |_| Ok(())).unwrap_err(),
            EscrowError::UnknownSession(sid)
        );
    }

    #[test]
    fn registries_are_isolated() {
        let a = EscrowRegistry::new();
        let b = EscrowRegistry::new();
        a.insert(record(EscrowId::random(&mut thread_rng()))).unwrap();
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn same_key_updates_are_serialized() {
        let registry = Arc::new(EscrowRegistry::new());
        let id = EscrowId::random(&mut thread_rng());
        registry.insert(record(id)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry
                            .with_record(&id, |r| {
                                r.created_at += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.with_record(&id, |r| Ok(r.created_at)).unwrap(), 800);
    }
}
