//! # File Store Encryption
//!
//! AES-256-GCM encryption of secret values for the local file backend.
//!
//! The 256-bit key is the SHA-256 digest of the key file's contents. Each
//! value is sealed with a fresh random 96-bit nonce and the secret's
//! canonical name as associated data, so a ciphertext copied to another
//! entry fails to decrypt. Stored form: base64(nonce || ciphertext).

use crate::constants::ROTATED_VALUE_BYTES;
use crate::error::{BackendError, Result, StoreError};
use crate::provider::file::io_error;
use crate::provider::file::lock::FileLock;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
/// Nonce plus the 16-byte authentication tag
const MIN_SEALED_LEN: usize = NONCE_LEN + 16;
const KEY_FILE_BYTES: usize = 32;

pub struct FileCipher {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for FileCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCipher").finish_non_exhaustive()
    }
}

impl FileCipher {
    /// Derive the encryption key from raw key file contents
    pub fn from_key_material(material: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(material).into();
        Self {
            key: Zeroizing::new(digest),
        }
    }

    /// Load the key file, generating a random one if it does not exist
    ///
    /// Runs under the key file's sidecar lock, so a process racing to create
    /// the key never reads it half written.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the key file cannot be locked, read or
    /// created.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        let _lock = FileLock::acquire(path).await?;

        match tokio::fs::read(path).await {
            Ok(material) => {
                let material = Zeroizing::new(material);
                if material.is_empty() {
                    return Err(BackendError::permanent(
                        "read key file",
                        format!("{}: key file is empty", path.display()),
                    )
                    .into());
                }
                return Ok(Self::from_key_material(&material));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error("read key file", path, &e)),
        }

        let mut material = Zeroizing::new([0u8; KEY_FILE_BYTES]);
        rand::rng().fill_bytes(&mut material[..]);

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(path)
            .await
            .map_err(|e| io_error("create key file", path, &e))?;
        file.write_all(&material[..])
            .await
            .map_err(|e| io_error("write key file", path, &e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error("write key file", path, &e))?;

        info!("Generated new encryption key file {}", path.display());
        Ok(Self::from_key_material(&material[..]))
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key[..])
            .map_err(|e| BackendError::permanent("load cipher", format!("invalid key: {e}")).into())
    }

    /// Seal a value bound to `name`
    ///
    /// # Errors
    ///
    /// Returns a permanent backend error if encryption fails.
    pub fn encrypt(&self, plaintext: &str, name: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()?
            .encrypt(
                GenericArray::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: name.as_bytes(),
                },
            )
            .map_err(|_| BackendError::permanent("encrypt", format!("failed to encrypt {name}")))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Open a value sealed by [`Self::encrypt`] for the same `name`
    ///
    /// # Errors
    ///
    /// Returns a permanent backend error on malformed input, a wrong key or
    /// a name mismatch.
    pub fn decrypt(&self, encoded: &str, name: &str) -> Result<String> {
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| BackendError::permanent("decrypt", format!("{name}: invalid base64: {e}")))?;
        if sealed.len() < MIN_SEALED_LEN {
            return Err(BackendError::permanent("decrypt", format!("{name}: ciphertext too short")).into());
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = Zeroizing::new(
            self.cipher()?
                .decrypt(
                    GenericArray::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: name.as_bytes(),
                    },
                )
                .map_err(|_| {
                    StoreError::from(BackendError::permanent(
                        "decrypt",
                        format!("{name}: authentication failed (wrong key or tampered entry)"),
                    ))
                })?,
        );

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| BackendError::permanent("decrypt", format!("{name}: value is not UTF-8")).into())
    }
}

/// Random value used by local rotation
pub fn generate_value() -> String {
    let mut bytes = Zeroizing::new([0u8; ROTATED_VALUE_BYTES]);
    rand::rng().fill_bytes(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(&bytes[..])
}
