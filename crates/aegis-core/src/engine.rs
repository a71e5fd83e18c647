//! The engine: sanitize pipeline, reveal pipeline, and the failure gate.
//!
//! An [`Aegis`] value owns its vault and recognizer registry. There are
//! no process-wide singletons, so multiple engines can coexist in one
//! process (multi-tenant embeddings, deterministic tests).
//!
//! The public [`Aegis::sanitize`] is the failure gate: any internal error
//! is logged with its classification and translated into the opaque
//! blocked signal. The original text is never returned on failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::analyzer::{EntityAnalyzer, LexiconAnalyzer};
use crate::entity;
use crate::error::{AegisError, PipelineError};
use crate::policy::{validate_policy, AegisPolicy};
use crate::recognizer::{Recognizer, RecognizerRegistry};
use crate::resolver;
use crate::reveal;
use crate::tokenizer;
use crate::vault::{Clock, MappingHandle, RootKey, Vault, VaultConfig};

/// Default wall-clock budget for one sanitize call.
pub const DEFAULT_SANITIZE_BUDGET: Duration = Duration::from_secs(10);

/// Result of a successful sanitize call.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    /// The rewritten text.
    pub text: String,

    /// Handle for later desanitization. Contains no sensitive values.
    pub handle: MappingHandle,
}

/// Service health, as reported by [`Aegis::health`].
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    /// Overall status; `"protected"` when operational.
    pub status: String,

    /// Engine identifier.
    pub engine: String,

    /// NER model identifier.
    pub model: String,
}

/// The privacy filter engine.
pub struct Aegis {
    registry: RecognizerRegistry,
    vault: Vault,
    known_labels: std::collections::BTreeSet<String>,
    default_policy: AegisPolicy,
    sanitize_budget: Duration,
    reveal_misses: AtomicU64,
}

impl Aegis {
    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> AegisBuilder {
        AegisBuilder::default()
    }

    /// Scans `text` and rewrites every detected entity according to the
    /// policy (engine default when `None`).
    ///
    /// The session is created on first use and reused afterwards, so
    /// repeated calls with the same `session_id` assign consistent
    /// tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AegisError::Policy`] for invalid policies (before any
    /// vault access), or the opaque [`AegisError::SanitizationBlocked`]
    /// for every internal failure; the gate never leaks the original
    /// text.
    pub fn sanitize(
        &self,
        text: &str,
        session_id: &str,
        policy: Option<&AegisPolicy>,
    ) -> Result<SanitizeOutcome, AegisError> {
        let policy = policy.unwrap_or(&self.default_policy);
        validate_policy(policy, &self.known_labels)?;

        match self.sanitize_inner(text, session_id, policy) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let kind = err.kind();
                error!(
                    session_id,
                    kind = %kind,
                    error = %err,
                    "sanitize pipeline failed; blocking traffic"
                );
                Err(AegisError::SanitizationBlocked { kind })
            },
        }
    }

    fn sanitize_inner(
        &self,
        text: &str,
        session_id: &str,
        policy: &AegisPolicy,
    ) -> Result<SanitizeOutcome, PipelineError> {
        let started = Instant::now();

        let spans = self.registry.analyze(text, policy)?;
        if spans.iter().any(|s| s.entity_type == entity::SECRET_KEY) {
            warn!(session_id, "credential exposure attempt detected; redacting");
        }
        self.check_budget(started, "recognition")?;

        let spans = resolver::filter_allow_list(spans, text, policy);
        let resolved = resolver::resolve(spans, text, policy.confidence_score)?;
        self.check_budget(started, "resolution")?;

        // Token assignment and rewrite happen as one vault commit under
        // the session lock; cancellation before this point writes
        // nothing. An input with nothing to redact skips the commit
        // entirely.
        let sanitized = if resolved.is_empty() {
            text.to_string()
        } else {
            self.vault.update(session_id, |map| {
                tokenizer::rewrite(map, session_id, policy.mode, text, &resolved)
            })?
        };
        self.check_budget(started, "commit")?;

        let handle = self.vault.begin_or_touch(session_id)?;
        info!(
            session_id,
            entities = resolved.len(),
            mode = ?policy.mode,
            "sanitized text"
        );

        Ok(SanitizeOutcome {
            text: sanitized,
            handle,
        })
    }

    fn check_budget(&self, started: Instant, stage: &'static str) -> Result<(), PipelineError> {
        if started.elapsed() > self.sanitize_budget {
            return Err(PipelineError::Timeout { stage });
        }
        Ok(())
    }

    /// Substitutes vault-known tokens in `text` back to their original
    /// surfaces, gated on `authorized`.
    ///
    /// Unauthorized calls and unknown/expired sessions return the text
    /// unchanged; individual unknown tokens stay in place and are counted
    /// (see [`Aegis::reveal_misses`]).
    ///
    /// # Errors
    ///
    /// Returns [`AegisError::RevealFailed`] only when the session payload
    /// fails authenticated decryption.
    pub fn desanitize(
        &self,
        text: &str,
        session_id: &str,
        authorized: bool,
    ) -> Result<String, AegisError> {
        if text.is_empty() {
            return Ok(String::new());
        }
        if !authorized {
            debug!(session_id, "unauthorized reveal request; returning tokens");
            return Ok(text.to_string());
        }
        if !reveal::contains_token(text) {
            return Ok(text.to_string());
        }

        match self.vault.read(session_id, crate::vault::SessionMap::forward_map) {
            Ok(Some(forward)) => Ok(reveal::substitute(text, &forward, &self.reveal_misses)),
            Ok(None) => {
                self.reveal_misses
                    .fetch_add(reveal::count_tokens(text), Ordering::Relaxed);
                debug!(session_id, "no live session for reveal; returning tokens");
                Ok(text.to_string())
            },
            Err(err) => {
                error!(session_id, error = %err, "vault failure during reveal");
                Err(AegisError::RevealFailed {
                    session_id: session_id.to_string(),
                })
            },
        }
    }

    /// Destroys a session and its mappings. Returns whether anything was
    /// removed.
    pub fn purge(&self, session_id: &str) -> bool {
        let removed = self.vault.purge(session_id);
        if removed {
            info!(session_id, "session purged");
        }
        removed
    }

    /// Reports engine health.
    #[must_use]
    pub fn health(&self) -> Health {
        Health {
            status: "protected".to_string(),
            engine: "aegis-core".to_string(),
            model: self.registry.model_name().to_string(),
        }
    }

    /// The full token -> surface map for a session, or `None` when the
    /// session is unknown or expired.
    ///
    /// In-process callers only: this crosses the same trust boundary as
    /// an authorized reveal. Network surfaces expose the
    /// [`MappingHandle`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`AegisError::RevealFailed`] if the payload fails to
    /// decrypt.
    pub fn export_mappings(
        &self,
        session_id: &str,
    ) -> Result<Option<BTreeMap<String, String>>, AegisError> {
        self.vault
            .read(session_id, crate::vault::SessionMap::forward_map)
            .map_err(|err| {
                error!(session_id, error = %err, "vault failure during export");
                AegisError::RevealFailed {
                    session_id: session_id.to_string(),
                }
            })
    }

    /// Eagerly removes expired sessions; returns how many were dropped.
    /// Intended to be driven on a bounded cadence (the server ticks every
    /// 60 seconds).
    pub fn sweep_expired(&self) -> usize {
        self.vault.sweep()
    }

    /// Number of reveal lookups that found no mapping.
    #[must_use]
    pub fn reveal_misses(&self) -> u64 {
        self.reveal_misses.load(Ordering::Relaxed)
    }

    /// The configured per-call sanitize budget.
    #[must_use]
    pub fn sanitize_budget(&self) -> Duration {
        self.sanitize_budget
    }

    /// Number of live sessions in the vault.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.vault.len()
    }
}

/// Builder for [`Aegis`].
pub struct AegisBuilder {
    analyzer: Option<Arc<dyn EntityAnalyzer>>,
    recognizers: Vec<Box<dyn Recognizer>>,
    root_key: Option<RootKey>,
    vault_config: VaultConfig,
    default_policy: AegisPolicy,
    sanitize_budget: Duration,
    clock: Option<Arc<dyn Clock>>,
}

impl Default for AegisBuilder {
    fn default() -> Self {
        Self {
            analyzer: None,
            recognizers: Vec::new(),
            root_key: None,
            vault_config: VaultConfig::default(),
            default_policy: AegisPolicy::default(),
            sanitize_budget: DEFAULT_SANITIZE_BUDGET,
            clock: None,
        }
    }
}

impl AegisBuilder {
    /// Sets the NER backend. Defaults to [`LexiconAnalyzer`].
    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn EntityAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Registers an additional recognizer on top of the built-in set.
    #[must_use]
    pub fn recognizer(mut self, recognizer: Box<dyn Recognizer>) -> Self {
        self.recognizers.push(recognizer);
        self
    }

    /// Sets the vault root key. An ephemeral key is generated when
    /// omitted; service deployments should always supply one from the
    /// environment.
    #[must_use]
    pub fn root_key(mut self, root_key: RootKey) -> Self {
        self.root_key = Some(root_key);
        self
    }

    /// Sets the session time-to-live.
    #[must_use]
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.vault_config.ttl = ttl;
        self
    }

    /// Sets the maximum number of live sessions.
    #[must_use]
    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.vault_config.max_sessions = max_sessions;
        self
    }

    /// Pins `expires_at` at session creation instead of sliding it
    /// forward on access.
    #[must_use]
    pub fn pin_expiry(mut self, pin: bool) -> Self {
        self.vault_config.pin_expiry = pin;
        self
    }

    /// Sets the policy used when a sanitize call passes `None`.
    #[must_use]
    pub fn default_policy(mut self, policy: AegisPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Sets the per-call sanitize wall-clock budget.
    #[must_use]
    pub fn sanitize_budget(mut self, budget: Duration) -> Self {
        self.sanitize_budget = budget;
        self
    }

    /// Overrides the vault time source (deterministic TTL tests).
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`AegisError::Setup`] if key material is invalid, the
    /// default policy does not validate, or the vault cannot be
    /// constructed.
    pub fn build(self) -> Result<Aegis, AegisError> {
        let analyzer = self
            .analyzer
            .unwrap_or_else(|| Arc::new(LexiconAnalyzer::new()));
        let mut registry = RecognizerRegistry::builtin(analyzer);
        for recognizer in self.recognizers {
            registry.register(recognizer);
        }
        let known_labels = registry.known_labels();

        validate_policy(&self.default_policy, &known_labels)?;

        let root_key = match self.root_key {
            Some(key) => key,
            None => RootKey::generate().map_err(|e| AegisError::Setup {
                reason: e.to_string(),
            })?,
        };
        let clock: Arc<dyn Clock> = self
            .clock
            .unwrap_or_else(|| Arc::new(crate::vault::SystemClock));
        let vault = Vault::with_clock(&root_key, self.vault_config, clock).map_err(|e| {
            AegisError::Setup {
                reason: e.to_string(),
            }
        })?;

        Ok(Aegis {
            registry,
            vault,
            known_labels,
            default_policy: self.default_policy,
            sanitize_budget: self.sanitize_budget,
            reveal_misses: AtomicU64::new(0),
        })
    }
}
