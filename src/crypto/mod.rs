//! Cryptographic functions for openclaw-backup
//!
//! Provides the archive encryption filter: AES-256-GCM with Argon2id key
//! derivation for client-key mode, and server-side parameters for
//! managed-key mode.

pub mod encryption;
pub mod filter;
pub mod key_derivation;
pub mod keys;
pub mod secure_memory;

pub use encryption::{decrypt_stream, encrypt_stream, is_encrypted};
pub use filter::{file_is_encrypted, EncryptionFilter, EncryptionPolicy};
pub use key_derivation::{derive_key, DerivedKey, KeyDerivationParams};
pub use keys::{KeyResolver, LocalKeyResolver, StaticKeyResolver};
pub use secure_memory::SecureString;
