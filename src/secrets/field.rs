//! Field Encryption Bridge
//!
//! 짧은 문자열(PII 필드, PIN, API 키)을 마스터키로 암호화하여
//! `base64(iv || ciphertext || tag)` 형태로 문자열 저장소에 보관할 수 있게 합니다.
//! 포맷에 버전 바이트가 없으므로, 포맷 변경 시 기존 암호문 전체를 명시적으로 마이그레이션해야 합니다.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{AuthenticatedCipher, RandomSource};
use crate::error::CryptoError;
use crate::secrets::buffer::{SecretBuffer, WipeOnDrop};
use crate::secrets::master_key::MasterKeyProvider;

/// 마스터키 기반 문자열 필드 암복호화기
#[derive(Clone)]
pub struct FieldCipher {
    cipher: AuthenticatedCipher,
    keys: Arc<MasterKeyProvider>,
}

impl FieldCipher {
    pub fn new(keys: Arc<MasterKeyProvider>, rng: Arc<dyn RandomSource>) -> Self {
        Self {
            cipher: AuthenticatedCipher::new(rng),
            keys,
        }
    }

    /// 문자열 암호화 (빈 문자열 포함 모든 유니코드 문자열)
    pub fn encrypt_string(&self, value: &str) -> Result<String, CryptoError> {
        self.encrypt_bytes(value.as_bytes())
    }

    /// 암호문 복호화
    ///
    /// base64/길이/UTF-8 오류는 `MalformedBlob`, 태그 불일치는 `Authentication`.
    pub fn decrypt_string(&self, encoded: &str) -> Result<String, CryptoError> {
        let mut plaintext = self.decrypt_bytes(encoded)?;
        String::from_utf8(std::mem::take(&mut *plaintext)).map_err(|e| {
            e.into_bytes().zeroize();
            CryptoError::MalformedBlob("plaintext is not valid UTF-8".to_string())
        })
    }

    /// 비밀값 버퍼를 암호화하고 버퍼는 반환 전에 지움
    pub fn encrypt_secret(&self, secret: &mut SecretBuffer) -> Result<String, CryptoError> {
        let guard = WipeOnDrop::new(secret);
        self.encrypt_bytes(guard.as_bytes())
    }

    /// 비밀값 복호화 (drop 시 zeroize되는 문자열로 반환)
    pub fn decrypt_secret(&self, encoded: &str) -> Result<Zeroizing<String>, CryptoError> {
        let plaintext = self.decrypt_bytes(encoded)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CryptoError::MalformedBlob("plaintext is not valid UTF-8".to_string()))?;
        Ok(Zeroizing::new(text.to_string()))
    }

    pub(crate) fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let key = self.keys.get_or_create_key()?;
        let blob = self.cipher.encrypt(&key, plaintext)?;
        Ok(BASE64.encode(blob))
    }

    pub(crate) fn decrypt_bytes(&self, encoded: &str) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let blob = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::MalformedBlob(format!("invalid base64: {}", e)))?;
        let key = self.keys.get_or_create_key()?;
        self.cipher.decrypt(&key, &blob)
    }
}

#[cfg(test)]
pub(crate) fn test_field_cipher() -> FieldCipher {
    use crate::crypto::OsRandom;
    use crate::secrets::master_key::MemoryKeyStore;
    use crate::store::MemoryPreferenceStore;

    let rng: Arc<dyn RandomSource> = Arc::new(OsRandom);
    let keys = Arc::new(MasterKeyProvider::new(
        Arc::new(MemoryKeyStore::new()),
        Arc::new(MemoryPreferenceStore::new()),
        rng.clone(),
    ));
    FieldCipher::new(keys, rng)
}
