//! Key derivation using Argon2id
//!
//! Derives the archive encryption key from a passphrase. Every archive gets
//! its own random salt, stored in the archive header next to the cost
//! parameters, so a restore only needs the passphrase.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, Params,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{BackupError, BackupResult};

/// Upper bound on memory cost accepted from an archive header (1 GiB)
const MAX_MEMORY_COST_KIB: u32 = 1 << 20;

/// Parameters for key derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDerivationParams {
    /// Salt for key derivation (base64, no padding)
    pub salt: String,
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            salt: String::new(),
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KeyDerivationParams {
    /// Create new params with a random salt
    pub fn new() -> Self {
        Self::default().with_fresh_salt()
    }

    /// Create params with specific costs and a random salt
    pub fn with_costs(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            salt: String::new(),
            memory_cost,
            time_cost,
            parallelism,
        }
        .with_fresh_salt()
    }

    /// Same costs, new random salt
    pub fn with_fresh_salt(&self) -> Self {
        Self {
            salt: SaltString::generate(&mut OsRng).to_string(),
            ..self.clone()
        }
    }
}

/// A derived 256-bit key, zeroed on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; 32],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Derive an encryption key from a passphrase
pub fn derive_key(passphrase: &str, params: &KeyDerivationParams) -> BackupResult<DerivedKey> {
    if params.memory_cost > MAX_MEMORY_COST_KIB {
        return Err(BackupError::Encryption(format!(
            "Argon2 memory cost too large: {} KiB",
            params.memory_cost
        )));
    }

    let salt = SaltString::from_b64(&params.salt)
        .map_err(|e| BackupError::Encryption(format!("Invalid salt: {}", e)))?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| BackupError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| BackupError::Encryption(format!("Key derivation failed: {}", e)))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| BackupError::Encryption("No hash output generated".to_string()))?;

    let hash_bytes = hash_output.as_bytes();
    if hash_bytes.len() < 32 {
        return Err(BackupError::Encryption(
            "Hash output too short for AES-256 key".to_string(),
        ));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(DerivedKey { key })
}

#[cfg(test)]
pub(crate) fn cheap_params() -> KeyDerivationParams {
    KeyDerivationParams::with_costs(1024, 1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_passphrase_same_key() {
        let params = cheap_params();
        let key1 = derive_key("test_passphrase", &params).unwrap();
        let key2 = derive_key("test_passphrase", &params).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let params = cheap_params();
        let key1 = derive_key("passphrase1", &params).unwrap();
        let key2 = derive_key("passphrase2", &params).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_fresh_salt_changes_key() {
        let params1 = cheap_params();
        let params2 = params1.with_fresh_salt();
        assert_ne!(params1.salt, params2.salt);
        assert_eq!(params1.memory_cost, params2.memory_cost);

        let key1 = derive_key("same_passphrase", &params1).unwrap();
        let key2 = derive_key("same_passphrase", &params2).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_rejects_hostile_memory_cost() {
        let mut params = cheap_params();
        params.memory_cost = u32::MAX;
        assert!(matches!(
            derive_key("x", &params),
            Err(BackupError::Encryption(_))
        ));
    }
}
