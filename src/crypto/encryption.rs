//! Chunked AES-256-GCM archive envelope
//!
//! Layout:
//!
//! ```text
//! MAGIC (8) | header_len u32 BE | header JSON | frame*
//! frame = last_flag u8 | len u32 BE | ciphertext+tag
//! ```
//!
//! Each frame seals at most `chunk_size` bytes. The nonce is an 8-byte random
//! prefix followed by the frame counter; the counter and last flag are bound
//! as associated data, so reordered, dropped or truncated frames fail
//! authentication instead of decrypting to something else.

use std::io::{self, Read, Write};

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use super::key_derivation::{derive_key, KeyDerivationParams};
use crate::error::{BackupError, BackupResult};

/// Leading bytes of every encrypted archive
pub const MAGIC: &[u8; 8] = b"OCBKENC1";

/// Plaintext bytes per frame
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;

const NONCE_PREFIX_SIZE: usize = 8;
const TAG_SIZE: usize = 16;
const MAX_HEADER_LEN: u32 = 64 * 1024;
const MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

/// Envelope header, stored in the clear
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeHeader {
    version: u8,
    kdf: KeyDerivationParams,
    nonce_prefix: String,
    chunk_size: u32,
}

/// Check whether `prefix` starts with the envelope magic
pub fn is_encrypted(prefix: &[u8]) -> bool {
    prefix.len() >= MAGIC.len() && &prefix[..MAGIC.len()] == MAGIC
}

/// Encrypt everything from `reader` into `writer`, returning bytes written
pub fn encrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    passphrase: &str,
    params: &KeyDerivationParams,
    chunk_size: u32,
) -> BackupResult<u64> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(BackupError::Encryption(format!(
            "Invalid chunk size: {}",
            chunk_size
        )));
    }

    let key = derive_key(passphrase, params)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| BackupError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut prefix = [0u8; NONCE_PREFIX_SIZE];
    OsRng.fill_bytes(&mut prefix);

    let header = serde_json::to_vec(&EnvelopeHeader {
        version: 1,
        kdf: params.clone(),
        nonce_prefix: STANDARD.encode(prefix),
        chunk_size,
    })?;

    let write_err = |e: io::Error| BackupError::Encryption(format!("Failed to write ciphertext: {}", e));
    let read_err = |e: io::Error| BackupError::Encryption(format!("Failed to read plaintext: {}", e));

    writer.write_all(MAGIC).map_err(write_err)?;
    writer
        .write_all(&(header.len() as u32).to_be_bytes())
        .map_err(write_err)?;
    writer.write_all(&header).map_err(write_err)?;
    let mut written = (MAGIC.len() + 4 + header.len()) as u64;

    let chunk_size = chunk_size as usize;
    let mut current = read_chunk(reader, chunk_size).map_err(read_err)?;
    let mut counter: u32 = 0;
    loop {
        let next = if current.len() == chunk_size {
            read_chunk(reader, chunk_size).map_err(read_err)?
        } else {
            Vec::new()
        };
        let last = next.is_empty();

        let aad = frame_aad(counter, last);
        let ciphertext = cipher
            .encrypt(
                &frame_nonce(&prefix, counter),
                Payload {
                    msg: &current,
                    aad: &aad,
                },
            )
            .map_err(|e| BackupError::Encryption(format!("Encryption failed: {}", e)))?;

        writer.write_all(&[last as u8]).map_err(write_err)?;
        writer
            .write_all(&(ciphertext.len() as u32).to_be_bytes())
            .map_err(write_err)?;
        writer.write_all(&ciphertext).map_err(write_err)?;
        written += (1 + 4 + ciphertext.len()) as u64;

        if last {
            break;
        }
        current = next;
        counter = counter
            .checked_add(1)
            .ok_or_else(|| BackupError::Encryption("Archive too large to encrypt".into()))?;
    }

    writer.flush().map_err(write_err)?;
    Ok(written)
}

/// Decrypt an envelope from `reader` into `writer`, returning plaintext bytes
///
/// On error the writer may hold a prefix of authenticated plaintext; callers
/// must discard it.
pub fn decrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    passphrase: &str,
) -> BackupResult<u64> {
    let corrupt = |what: &str| BackupError::Decryption(format!("corrupt ciphertext: {}", what));
    let read_err = |e: io::Error| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BackupError::Decryption("corrupt ciphertext: truncated".into())
        } else {
            BackupError::Io(format!("Failed to read ciphertext: {}", e))
        }
    };

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).map_err(read_err)?;
    if &magic != MAGIC {
        return Err(BackupError::Decryption("not an encrypted archive".into()));
    }

    let header_len = read_u32(reader).map_err(read_err)?;
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(corrupt("bad header length"));
    }
    let mut header_bytes = vec![0u8; header_len as usize];
    reader.read_exact(&mut header_bytes).map_err(read_err)?;
    let header: EnvelopeHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| corrupt("bad header"))?;

    if header.version != 1 {
        return Err(BackupError::Decryption(format!(
            "Unsupported encryption version: {}",
            header.version
        )));
    }
    if header.chunk_size == 0 || header.chunk_size > MAX_CHUNK_SIZE {
        return Err(corrupt("bad chunk size"));
    }
    let prefix_bytes = STANDARD
        .decode(&header.nonce_prefix)
        .map_err(|_| corrupt("bad nonce prefix"))?;
    let prefix: [u8; NONCE_PREFIX_SIZE] = prefix_bytes
        .as_slice()
        .try_into()
        .map_err(|_| corrupt("bad nonce prefix"))?;

    let key = derive_key(passphrase, &header.kdf)
        .map_err(|e| BackupError::Decryption(e.to_string()))?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| BackupError::Decryption(format!("Failed to create cipher: {}", e)))?;

    let max_frame = header.chunk_size as usize + TAG_SIZE;
    let mut plaintext_len = 0u64;
    let mut counter: u32 = 0;
    loop {
        let mut flag = [0u8; 1];
        reader.read_exact(&mut flag).map_err(read_err)?;
        let last = match flag[0] {
            0 => false,
            1 => true,
            _ => return Err(corrupt("bad frame flag")),
        };

        let len = read_u32(reader).map_err(read_err)? as usize;
        if len < TAG_SIZE || len > max_frame {
            return Err(corrupt("bad frame length"));
        }
        let mut ciphertext = vec![0u8; len];
        reader.read_exact(&mut ciphertext).map_err(read_err)?;

        let aad = frame_aad(counter, last);
        let plaintext = cipher
            .decrypt(
                &frame_nonce(&prefix, counter),
                Payload {
                    msg: &ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                BackupError::Decryption("invalid key or corrupted data".to_string())
            })?;

        writer
            .write_all(&plaintext)
            .map_err(|e| BackupError::Io(format!("Failed to write plaintext: {}", e)))?;
        plaintext_len += plaintext.len() as u64;

        if last {
            break;
        }
        counter = counter
            .checked_add(1)
            .ok_or_else(|| corrupt("too many frames"))?;
    }

    let mut trailing = [0u8; 1];
    match reader.read(&mut trailing) {
        Ok(0) => {}
        Ok(_) => return Err(corrupt("trailing data after final frame")),
        Err(e) => return Err(BackupError::Io(format!("Failed to read ciphertext: {}", e))),
    }

    writer
        .flush()
        .map_err(|e| BackupError::Io(format!("Failed to write plaintext: {}", e)))?;
    Ok(plaintext_len)
}

fn frame_nonce(prefix: &[u8; NONCE_PREFIX_SIZE], counter: u32) -> Nonce<U12> {
    let mut nonce = [0u8; 12];
    nonce[..NONCE_PREFIX_SIZE].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_SIZE..].copy_from_slice(&counter.to_be_bytes());
    Nonce::clone_from_slice(&nonce)
}

fn frame_aad(counter: u32, last: bool) -> [u8; 5] {
    let c = counter.to_be_bytes();
    [c[0], c[1], c[2], c[3], last as u8]
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Fill up to `size` bytes, short only at end of input
fn read_chunk<R: Read>(reader: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
