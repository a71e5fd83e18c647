//! The Vault: TTL-bounded, encrypted, session-scoped mapping store.
//!
//! Sessions are keyed by an opaque id. Each session's token mappings live
//! only as an AES-256-GCM ciphertext; plaintext exists transiently inside
//! a single read-decrypt-modify-encrypt-write commit performed under the
//! session's exclusive lock. The session table itself is guarded by a
//! read-write lock so lookups stay concurrent while the resize path is
//! exclusive.
//!
//! Lock poisoning indicates a panic in another thread, which is
//! unrecoverable for an encrypted store.

#![allow(clippy::missing_panics_doc)]

mod crypto;
mod error;

pub use crypto::{RootKey, ROOT_KEY_LEN};
pub use error::VaultError;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entity;
use crate::tokenizer::normalize_surface;

use crypto::SessionCipher;

/// Default session time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(900);

/// Default session capacity.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Vault configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Session time-to-live.
    pub ttl: Duration,

    /// Maximum live sessions; the least-recently-used session is evicted
    /// beyond this.
    pub max_sessions: usize,

    /// When true, `expires_at` is fixed at creation instead of sliding
    /// forward on each access.
    pub pin_expiry: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
            pin_expiry: false,
        }
    }
}

/// Time source, injectable for deterministic TTL tests.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Opaque caller-facing handle to a session's mapping. Carries no
/// sensitive values.
#[derive(Debug, Clone, Serialize)]
pub struct MappingHandle {
    /// The session this handle refers to.
    pub session_id: String,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session expires (may move forward on access).
    pub expires_at: DateTime<Utc>,
}

/// Decrypted per-session mapping state. Exists only transiently inside a
/// vault commit.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct SessionMap {
    /// token -> raw surface.
    forward: BTreeMap<String, String>,

    /// token prefix -> normalized surface -> token.
    reverse: BTreeMap<String, BTreeMap<String, String>>,

    /// token prefix -> next ordinal (0-based).
    ordinals: BTreeMap<String, u64>,
}

impl SessionMap {
    /// Existing token for (prefix, normalized surface), if any.
    pub(crate) fn token_for(&self, prefix: &str, normalized: &str) -> Option<&str> {
        self.reverse
            .get(prefix)
            .and_then(|m| m.get(normalized))
            .map(String::as_str)
    }

    /// Raw surface for a token, if any.
    pub(crate) fn surface_for(&self, token: &str) -> Option<&str> {
        self.forward.get(token).map(String::as_str)
    }

    /// Allocates the next ordinal in the prefix's namespace.
    pub(crate) fn next_ordinal(&mut self, prefix: &str) -> u64 {
        let counter = self.ordinals.entry(prefix.to_string()).or_insert(0);
        let ordinal = *counter;
        *counter += 1;
        ordinal
    }

    /// Records both directions of a token assignment.
    ///
    /// Idempotent for identical assignments; recording a token against a
    /// different surface (or vice versa) is a bijection violation.
    pub(crate) fn record(
        &mut self,
        session_id: &str,
        token: &str,
        raw_surface: &str,
        prefix: &str,
        normalized: &str,
    ) -> Result<(), VaultError> {
        if let Some(existing) = self.forward.get(token) {
            if existing != raw_surface {
                return Err(VaultError::BijectionViolation {
                    session_id: session_id.to_string(),
                    token: token.to_string(),
                });
            }
        }
        if let Some(existing) = self.token_for(prefix, normalized) {
            if existing != token {
                return Err(VaultError::BijectionViolation {
                    session_id: session_id.to_string(),
                    token: token.to_string(),
                });
            }
        }

        self.forward
            .insert(token.to_string(), raw_surface.to_string());
        self.reverse
            .entry(prefix.to_string())
            .or_default()
            .insert(normalized.to_string(), token.to_string());
        Ok(())
    }

    /// Records only the forward direction, keeping the first surface seen
    /// for the token. Used by MASK mode, which is not reversible beyond
    /// that by choice.
    pub(crate) fn record_forward_first_seen(&mut self, token: &str, raw_surface: &str) {
        self.forward
            .entry(token.to_string())
            .or_insert_with(|| raw_surface.to_string());
    }

    /// A copy of the token -> surface map.
    pub(crate) fn forward_map(&self) -> BTreeMap<String, String> {
        self.forward.clone()
    }
}

/// A session's sealed state. Mutation requires the slot mutex.
struct SealedEntry {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
    ciphertext: Vec<u8>,
}

struct SessionSlot {
    state: Mutex<SealedEntry>,
}

/// The session-keyed ephemeral mapping store.
pub struct Vault {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    quarantined: Mutex<HashSet<String>>,
    cipher: SessionCipher,
    ttl: chrono::Duration,
    config: VaultConfig,
    clock: Arc<dyn Clock>,
    evictions: AtomicU64,
}

impl Vault {
    /// Creates a vault sealed under `root_key`.
    ///
    /// # Errors
    ///
    /// Returns `VaultError` if the key derivation fails or the TTL is out
    /// of range.
    pub fn new(root_key: &RootKey, config: VaultConfig) -> Result<Self, VaultError> {
        Self::with_clock(root_key, config, Arc::new(SystemClock))
    }

    /// Creates a vault with an explicit time source (useful for TTL
    /// tests).
    ///
    /// # Errors
    ///
    /// Returns `VaultError` if the key derivation fails or the TTL is out
    /// of range.
    pub fn with_clock(
        root_key: &RootKey,
        config: VaultConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VaultError> {
        let ttl = chrono::Duration::from_std(config.ttl).map_err(|_| VaultError::Provider {
            reason: "session ttl out of range".to_string(),
        })?;
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            quarantined: Mutex::new(HashSet::new()),
            cipher: SessionCipher::new(root_key)?,
            ttl,
            config,
            clock,
            evictions: AtomicU64::new(0),
        })
    }

    /// Creates the session if missing, extends its TTL otherwise, and
    /// returns a handle.
    ///
    /// # Errors
    ///
    /// Returns `VaultError` on quarantine or crypto failure.
    pub fn begin_or_touch(&self, session_id: &str) -> Result<MappingHandle, VaultError> {
        let slot = self.get_or_create(session_id)?;
        let now = self.clock.now();
        let mut state = lock_state(&slot);

        if state.expires_at <= now {
            // Expired but not yet swept: recreate in place.
            *state = self.fresh_entry(session_id, now)?;
        } else {
            self.touch(&mut state, now);
        }

        Ok(MappingHandle {
            session_id: session_id.to_string(),
            created_at: state.created_at,
            expires_at: state.expires_at,
        })
    }

    /// Runs `f` over the session's decrypted map as a single commit under
    /// the session lock, creating the session if needed.
    ///
    /// Nothing is written until `f` returns `Ok`; an error inside the
    /// closure leaves the sealed state untouched.
    ///
    /// # Errors
    ///
    /// Propagates closure errors, and returns `VaultError::Crypto` (after
    /// quarantining the session) if the stored payload fails to open.
    pub(crate) fn update<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionMap) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let slot = self.get_or_create(session_id)?;
        let now = self.clock.now();
        let mut state = lock_state(&slot);

        if state.expires_at <= now {
            *state = self.fresh_entry(session_id, now)?;
        }

        let mut map = self.open_map(session_id, &state)?;
        let result = f(&mut map)?;

        let plaintext = serde_json::to_vec(&map).map_err(|e| VaultError::Codec {
            reason: e.to_string(),
        })?;
        state.ciphertext = self.cipher.seal(session_id, &plaintext)?;
        self.touch(&mut state, now);

        Ok(result)
    }

    /// Runs `f` over an immutable view of the session's decrypted map.
    ///
    /// Returns `Ok(None)` for unknown or expired sessions.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Crypto` (after quarantining) if decryption
    /// fails, or `VaultError::Quarantined` for quarantined sessions.
    pub(crate) fn read<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&SessionMap) -> T,
    ) -> Result<Option<T>, VaultError> {
        self.check_quarantine(session_id)?;

        let slot = {
            let sessions = read_sessions(&self.sessions);
            match sessions.get(session_id) {
                Some(slot) => Arc::clone(slot),
                None => return Ok(None),
            }
        };

        let now = self.clock.now();
        let mut state = lock_state(&slot);
        if state.expires_at <= now {
            return Ok(None);
        }

        let map = self.open_map(session_id, &state)?;
        self.touch(&mut state, now);
        Ok(Some(f(&map)))
    }

    /// Records a token assignment through the public API.
    ///
    /// Idempotent under the bijection invariant; violating it is a fatal
    /// internal error.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::BijectionViolation` on conflicting
    /// assignments, or crypto errors as for any commit.
    pub fn record(
        &self,
        session_id: &str,
        entity_type: &str,
        surface: &str,
        token: &str,
    ) -> Result<(), VaultError> {
        let prefix = entity::token_prefix(entity_type).to_string();
        let normalized = normalize_surface(surface);
        self.update(session_id, |map| {
            map.record(session_id, token, surface, &prefix, &normalized)
        })
    }

    /// The raw surface for `token`, or `None` for unknown tokens and
    /// unknown/expired sessions.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Crypto` if the session payload fails to open.
    pub fn lookup_forward(
        &self,
        session_id: &str,
        token: &str,
    ) -> Result<Option<String>, VaultError> {
        Ok(self
            .read(session_id, |map| map.surface_for(token).map(String::from))?
            .flatten())
    }

    /// The token previously assigned to (entity type, surface), if any.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Crypto` if the session payload fails to open.
    pub fn lookup_reverse(
        &self,
        session_id: &str,
        entity_type: &str,
        surface: &str,
    ) -> Result<Option<String>, VaultError> {
        let prefix = entity::token_prefix(entity_type);
        let normalized = normalize_surface(surface);
        Ok(self
            .read(session_id, |map| {
                map.token_for(prefix, &normalized).map(String::from)
            })?
            .flatten())
    }

    /// Removes a session and clears any quarantine mark. Returns whether
    /// anything was removed.
    pub fn purge(&self, session_id: &str) -> bool {
        let removed = write_sessions(&self.sessions).remove(session_id).is_some();
        let unquarantined = lock_quarantine(&self.quarantined).remove(session_id);
        removed || unquarantined
    }

    /// Eagerly removes expired sessions; returns how many were dropped.
    /// Driven on a bounded cadence by the embedding service.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = write_sessions(&self.sessions);
        let before = sessions.len();
        sessions.retain(|_, slot| lock_state(slot).expires_at > now);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "vault sweep");
        }
        removed
    }

    /// Number of live (possibly expired, not yet swept) sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        read_sessions(&self.sessions).len()
    }

    /// Whether the vault holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sessions evicted over capacity.
    #[must_use]
    pub fn evicted_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn check_quarantine(&self, session_id: &str) -> Result<(), VaultError> {
        if lock_quarantine(&self.quarantined).contains(session_id) {
            return Err(VaultError::Quarantined {
                session_id: session_id.to_string(),
            });
        }
        Ok(())
    }

    fn get_or_create(&self, session_id: &str) -> Result<Arc<SessionSlot>, VaultError> {
        self.check_quarantine(session_id)?;

        if let Some(slot) = read_sessions(&self.sessions).get(session_id) {
            return Ok(Arc::clone(slot));
        }

        let mut sessions = write_sessions(&self.sessions);
        if let Some(slot) = sessions.get(session_id) {
            return Ok(Arc::clone(slot));
        }

        if sessions.len() >= self.config.max_sessions {
            self.evict_lru(&mut sessions);
        }

        let now = self.clock.now();
        let slot = Arc::new(SessionSlot {
            state: Mutex::new(self.fresh_entry(session_id, now)?),
        });
        sessions.insert(session_id.to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    fn fresh_entry(&self, session_id: &str, now: DateTime<Utc>) -> Result<SealedEntry, VaultError> {
        let plaintext =
            serde_json::to_vec(&SessionMap::default()).map_err(|e| VaultError::Codec {
                reason: e.to_string(),
            })?;
        Ok(SealedEntry {
            created_at: now,
            expires_at: now + self.ttl,
            last_access: now,
            ciphertext: self.cipher.seal(session_id, &plaintext)?,
        })
    }

    fn open_map(&self, session_id: &str, state: &SealedEntry) -> Result<SessionMap, VaultError> {
        let plaintext = match self.cipher.open(session_id, &state.ciphertext) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(session_id, "vault payload failed authentication; quarantining session");
                lock_quarantine(&self.quarantined).insert(session_id.to_string());
                return Err(err);
            },
        };
        serde_json::from_slice(&plaintext).map_err(|e| VaultError::Codec {
            reason: e.to_string(),
        })
    }

    fn touch(&self, state: &mut SealedEntry, now: DateTime<Utc>) {
        state.last_access = now;
        if !self.config.pin_expiry {
            state.expires_at = now + self.ttl;
        }
    }

    /// Evicts the least-recently-used session. Called with the table
    /// write lock held.
    fn evict_lru(&self, sessions: &mut HashMap<String, Arc<SessionSlot>>) {
        let victim = sessions
            .iter()
            .min_by_key(|(_, slot)| lock_state(slot).last_access)
            .map(|(id, _)| id.clone());
        if let Some(id) = victim {
            sessions.remove(&id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            warn!(session_id = %id, "vault over capacity; evicted least-recently-used session");
        }
    }
}

fn lock_state(slot: &SessionSlot) -> std::sync::MutexGuard<'_, SealedEntry> {
    slot.state.lock().expect("session lock poisoned")
}

fn lock_quarantine(q: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    q.lock().expect("quarantine lock poisoned")
}

fn read_sessions(
    s: &RwLock<HashMap<String, Arc<SessionSlot>>>,
) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<SessionSlot>>> {
    s.read().expect("session table lock poisoned")
}

fn write_sessions(
    s: &RwLock<HashMap<String, Arc<SessionSlot>>>,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<SessionSlot>>> {
    s.write().expect("session table lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(now),
            })
        }

        fn advance(&self, duration: chrono::Duration) {
            let mut now = self.now.lock().unwrap();
            *now += duration;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn vault() -> Vault {
        Vault::new(&RootKey::generate().unwrap(), VaultConfig::default()).unwrap()
    }

    fn vault_with_clock(config: VaultConfig, clock: Arc<ManualClock>) -> Vault {
        Vault::with_clock(&RootKey::generate().unwrap(), config, clock).unwrap()
    }

    #[test]
    fn test_begin_creates_and_touch_reuses() {
        let vault = vault();
        let first = vault.begin_or_touch("s1").unwrap();
        let second = vault.begin_or_touch("s1").unwrap();
        assert_eq!(vault.len(), 1);
        assert_eq!(first.created_at, second.created_at);
        assert!(first.expires_at > first.created_at);
    }

    #[test]
    fn test_record_and_lookups() {
        let vault = vault();
        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();

        assert_eq!(
            vault.lookup_forward("s1", "[PATIENT_A]").unwrap().as_deref(),
            Some("John Doe")
        );
        assert_eq!(
            vault.lookup_reverse("s1", "PERSON", "John Doe").unwrap().as_deref(),
            Some("[PATIENT_A]")
        );
        assert_eq!(vault.lookup_forward("s1", "[PATIENT_B]").unwrap(), None);
        assert_eq!(vault.lookup_forward("other", "[PATIENT_A]").unwrap(), None);
    }

    #[test]
    fn test_record_is_idempotent() {
        let vault = vault();
        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();
        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();
    }

    #[test]
    fn test_bijection_violation_is_fatal() {
        let vault = vault();
        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();

        let conflicting_surface = vault.record("s1", "PERSON", "Jane Roe", "[PATIENT_A]");
        assert!(matches!(
            conflicting_surface,
            Err(VaultError::BijectionViolation { .. })
        ));

        let conflicting_token = vault.record("s1", "PERSON", "John Doe", "[PATIENT_B]");
        assert!(matches!(
            conflicting_token,
            Err(VaultError::BijectionViolation { .. })
        ));
    }

    #[test]
    fn test_failed_commit_writes_nothing() {
        let vault = vault();
        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();

        let result: Result<(), VaultError> = vault.update("s1", |map| {
            map.record("s1", "[PATIENT_B]", "Jane Roe", "PATIENT", "jane roe")?;
            // A later step in the same commit fails.
            Err(VaultError::Codec {
                reason: "synthetic failure".to_string(),
            })
        });
        assert!(result.is_err());

        // The partial insert from the failed commit is not visible.
        assert_eq!(vault.lookup_forward("s1", "[PATIENT_B]").unwrap(), None);
    }

    #[test]
    fn test_ttl_expiry_hides_mappings() {
        let clock = ManualClock::starting_at(Utc::now());
        let vault = vault_with_clock(VaultConfig::default(), Arc::clone(&clock));

        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();
        clock.advance(chrono::Duration::seconds(901));

        assert_eq!(vault.lookup_forward("s1", "[PATIENT_A]").unwrap(), None);
    }

    #[test]
    fn test_sliding_window_extends_on_access() {
        let clock = ManualClock::starting_at(Utc::now());
        let vault = vault_with_clock(VaultConfig::default(), Arc::clone(&clock));

        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();

        // Touch every 10 minutes; the 15-minute window keeps sliding.
        for _ in 0..3 {
            clock.advance(chrono::Duration::seconds(600));
            assert!(vault.lookup_forward("s1", "[PATIENT_A]").unwrap().is_some());
        }
    }

    #[test]
    fn test_pinned_expiry_does_not_slide() {
        let clock = ManualClock::starting_at(Utc::now());
        let config = VaultConfig {
            pin_expiry: true,
            ..VaultConfig::default()
        };
        let vault = vault_with_clock(config, Arc::clone(&clock));

        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();

        clock.advance(chrono::Duration::seconds(600));
        assert!(vault.lookup_forward("s1", "[PATIENT_A]").unwrap().is_some());

        // Another 10 minutes exceeds the original 15-minute deadline even
        // though the session was just accessed.
        clock.advance(chrono::Duration::seconds(600));
        assert_eq!(vault.lookup_forward("s1", "[PATIENT_A]").unwrap(), None);
    }

    #[test]
    fn test_expired_session_recreated_on_begin() {
        let clock = ManualClock::starting_at(Utc::now());
        let vault = vault_with_clock(VaultConfig::default(), Arc::clone(&clock));

        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();
        clock.advance(chrono::Duration::seconds(901));

        let handle = vault.begin_or_touch("s1").unwrap();
        assert!(handle.expires_at > clock.now());
        // The old mapping died with the old incarnation.
        assert_eq!(vault.lookup_forward("s1", "[PATIENT_A]").unwrap(), None);
    }

    #[test]
    fn test_sweep_removes_expired() {
        let clock = ManualClock::starting_at(Utc::now());
        let vault = vault_with_clock(VaultConfig::default(), Arc::clone(&clock));

        vault.begin_or_touch("s1").unwrap();
        vault.begin_or_touch("s2").unwrap();
        clock.advance(chrono::Duration::seconds(500));
        vault.begin_or_touch("s2").unwrap();
        clock.advance(chrono::Duration::seconds(500));

        // s1 is past its window, s2 slid forward.
        assert_eq!(vault.sweep(), 1);
        assert_eq!(vault.len(), 1);
    }

    #[test]
    fn test_lru_eviction_over_capacity() {
        let clock = ManualClock::starting_at(Utc::now());
        let config = VaultConfig {
            max_sessions: 2,
            ..VaultConfig::default()
        };
        let vault = vault_with_clock(config, Arc::clone(&clock));

        vault.begin_or_touch("old").unwrap();
        clock.advance(chrono::Duration::seconds(1));
        vault.begin_or_touch("newer").unwrap();
        clock.advance(chrono::Duration::seconds(1));
        vault.begin_or_touch("newest").unwrap();

        assert_eq!(vault.len(), 2);
        assert_eq!(vault.evicted_count(), 1);
        assert_eq!(vault.lookup_forward("old", "[X]").unwrap(), None);
        assert!(vault.begin_or_touch("newer").is_ok());
    }

    #[test]
    fn test_purge() {
        let vault = vault();
        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();

        assert!(vault.purge("s1"));
        assert!(!vault.purge("s1"));
        assert_eq!(vault.lookup_forward("s1", "[PATIENT_A]").unwrap(), None);
    }

    #[test]
    fn test_surface_normalization_in_reverse_lookup() {
        let vault = vault();
        // Trailing whitespace is trimmed before the reverse map lookup.
        vault.record("s1", "PERSON", "John Doe", "[PATIENT_A]").unwrap();
        assert_eq!(
            vault.lookup_reverse("s1", "PERSON", "John Doe  ").unwrap().as_deref(),
            Some("[PATIENT_A]")
        );
    }
}
