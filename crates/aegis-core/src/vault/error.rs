//! Vault error types.

use thiserror::Error;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The root key material could not be parsed.
    #[error("invalid vault root key: {reason}")]
    InvalidRootKey {
        /// Why the key was rejected.
        reason: String,
    },

    /// The crypto provider failed outside of decryption (key derivation,
    /// nonce generation).
    #[error("crypto provider failure: {reason}")]
    Provider {
        /// What the provider reported.
        reason: String,
    },

    /// Authenticated decryption failed for a session payload. The
    /// session is quarantined; only `purge` clears it.
    #[error("vault crypto failure for session {session_id}")]
    Crypto {
        /// The affected session.
        session_id: String,
    },

    /// An operation targeted a quarantined session.
    #[error("session {session_id} is quarantined")]
    Quarantined {
        /// The quarantined session.
        session_id: String,
    },

    /// A token was recorded against two different surfaces (or a surface
    /// against two tokens) within one session. Fatal: the per-session
    /// bijection is a core invariant.
    #[error("token bijection violated in session {session_id} for token {token}")]
    BijectionViolation {
        /// The affected session.
        session_id: String,
        /// The conflicting token.
        token: String,
    },

    /// A session payload failed to serialize or deserialize.
    #[error("session payload codec failure: {reason}")]
    Codec {
        /// The serde error text.
        reason: String,
    },
}
