//! Encryption-at-rest for vault payloads.
//!
//! Each session's mapping is sealed with AES-256-GCM under a per-process
//! data-encryption key derived from the environment-provided root key via
//! HKDF-SHA256 with a random per-process salt. The 12-byte nonce is drawn
//! fresh for every write and prefixed to the ciphertext; the session id is
//! bound in as additional data so a ciphertext cannot be replayed into a
//! different session.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use super::error::VaultError;

/// Root key length in bytes.
pub const ROOT_KEY_LEN: usize = 32;

/// HKDF info string for the vault data-encryption key.
const DEK_INFO: &[u8] = b"aegis-vault-dek-v1";

/// The 32-byte root key the data-encryption key derives from.
///
/// Key bytes are zeroized on drop and never serialized.
pub struct RootKey(Zeroizing<[u8; ROOT_KEY_LEN]>);

impl RootKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; ROOT_KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parses an environment-provided key: 64 hex characters or standard
    /// base64 of exactly 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::InvalidRootKey` if the value is neither.
    pub fn parse(value: &str) -> Result<Self, VaultError> {
        let value = value.trim();

        if value.len() == 2 * ROOT_KEY_LEN && value.chars().all(|c| c.is_ascii_hexdigit()) {
            let mut bytes = Zeroizing::new([0u8; ROOT_KEY_LEN]);
            for (i, chunk) in value.as_bytes().chunks_exact(2).enumerate() {
                let hi = hex_digit(chunk[0]);
                let lo = hex_digit(chunk[1]);
                bytes[i] = (hi << 4) | lo;
            }
            return Ok(Self(bytes));
        }

        let decoded = BASE64
            .decode(value)
            .map_err(|e| VaultError::InvalidRootKey {
                reason: format!("not hex and not base64: {e}"),
            })?;
        if decoded.len() != ROOT_KEY_LEN {
            return Err(VaultError::InvalidRootKey {
                reason: format!("expected {ROOT_KEY_LEN} bytes, got {}", decoded.len()),
            });
        }
        let mut bytes = Zeroizing::new([0u8; ROOT_KEY_LEN]);
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Generates an ephemeral root key from the system RNG.
    ///
    /// Useful for embedded and test engines; a service deployment should
    /// supply the key through the environment instead.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Provider` if the system RNG fails.
    pub fn generate() -> Result<Self, VaultError> {
        let rng = SystemRandom::new();
        let mut bytes = Zeroizing::new([0u8; ROOT_KEY_LEN]);
        rng.fill(&mut *bytes).map_err(|_| VaultError::Provider {
            reason: "system rng unavailable".to_string(),
        })?;
        Ok(Self(bytes))
    }
}

const fn hex_digit(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        _ => c - b'A' + 10,
    }
}

/// AEAD sealer/opener for session payloads.
pub(super) struct SessionCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl SessionCipher {
    /// Derives the per-process data-encryption key and builds the cipher.
    pub(super) fn new(root: &RootKey) -> Result<Self, VaultError> {
        let rng = SystemRandom::new();

        let mut salt_bytes = [0u8; 32];
        rng.fill(&mut salt_bytes).map_err(|_| VaultError::Provider {
            reason: "system rng unavailable".to_string(),
        })?;

        let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &salt_bytes);
        let prk = salt.extract(&*root.0);
        let okm = prk
            .expand(&[DEK_INFO], hkdf::HKDF_SHA256)
            .map_err(|_| VaultError::Provider {
                reason: "hkdf expand failed".to_string(),
            })?;
        let mut dek = Zeroizing::new([0u8; ROOT_KEY_LEN]);
        okm.fill(&mut *dek).map_err(|_| VaultError::Provider {
            reason: "hkdf fill failed".to_string(),
        })?;

        let unbound = UnboundKey::new(&AES_256_GCM, &*dek).map_err(|_| VaultError::Provider {
            reason: "invalid derived key".to_string(),
        })?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng,
        })
    }

    /// Seals `plaintext`, binding it to `session_id`. Output layout:
    /// `nonce (12 bytes) || ciphertext || tag`.
    pub(super) fn seal(&self, session_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::Provider {
                reason: "nonce generation failed".to_string(),
            })?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::from(session_id.as_bytes()), &mut in_out)
            .map_err(|_| VaultError::Provider {
                reason: "seal failed".to_string(),
            })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    /// Opens a sealed payload for `session_id`.
    ///
    /// Any authentication failure maps to `VaultError::Crypto`; the
    /// caller is responsible for quarantining the session.
    pub(super) fn open(&self, session_id: &str, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
        if sealed.len() < NONCE_LEN {
            return Err(VaultError::Crypto {
                session_id: session_id.to_string(),
            });
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce_array: [u8; NONCE_LEN] =
            nonce_bytes.try_into().map_err(|_| VaultError::Crypto {
                session_id: session_id.to_string(),
            })?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(session_id.as_bytes()), &mut in_out)
            .map_err(|_| VaultError::Crypto {
                session_id: session_id.to_string(),
            })?;
        Ok(plaintext.to_vec())
    }
}
