//! Authenticated Cipher (AES-256-GCM)
//!
//! Blob 포맷 (버전 바이트 없음):
//! - iv: 12 bytes (호출마다 새 난수)
//! - ciphertext: 평문과 같은 길이
//! - tag: 16 bytes (GCM이 뒤에 붙임)
//!
//! 태그 검증 실패가 "잘못된 키/비밀번호"와 "손상된 데이터"를 감지하는 유일한 수단입니다.

use std::fmt;
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::crypto::random::RandomSource;
use crate::error::CryptoError;

/// 대칭키 길이 (256-bit)
pub const KEY_LEN: usize = 32;

/// GCM IV 길이 (96-bit)
pub const IV_LEN: usize = 12;

/// GCM 인증 태그 길이 (128-bit)
pub const TAG_LEN: usize = 16;

/// 원시 키 바이트를 감싼 불투명 핸들
///
/// 바이트는 crate 내부 cipher에만 노출되며, drop 시 zeroize 됩니다.
/// `Clone`은 같은 키를 공유(`Arc`)할 뿐 바이트를 복사하지 않습니다.
#[derive(Clone)]
pub struct KeyHandle {
    bytes: Arc<Zeroizing<[u8; KEY_LEN]>>,
}

impl KeyHandle {
    pub(crate) fn from_bytes(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// 두 핸들이 같은 키 인스턴스를 가리키는지 여부
    pub fn same_key(&self, other: &KeyHandle) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyHandle([REDACTED])")
    }
}

/// 상태 없는 AES-256-GCM 암복호화기
#[derive(Clone)]
pub struct AuthenticatedCipher {
    rng: Arc<dyn RandomSource>,
}

impl AuthenticatedCipher {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self { rng }
    }

    /// 평문을 암호화하여 `iv || ciphertext || tag` blob 반환
    ///
    /// 같은 평문/키라도 IV가 매번 새로 생성되므로 결과는 항상 다릅니다.
    pub fn encrypt(&self, key: &KeyHandle, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut iv = [0u8; IV_LEN];
        self.rng.fill_bytes(&mut iv)?;

        let cipher = Aes256Gcm::new_from_slice(key.expose())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// blob을 복호화
    ///
    /// `IV_LEN + TAG_LEN`보다 짧은 blob은 복호화 시도 전에 `MalformedBlob`으로 거부합니다.
    /// 태그가 맞지 않으면 `Authentication`으로 실패하며, 부분 평문은 절대 반환하지 않습니다.
    pub fn decrypt(
        &self,
        key: &KeyHandle,
        blob: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if blob.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::MalformedBlob(format!(
                "blob is {} bytes, minimum is {}",
                blob.len(),
                IV_LEN + TAG_LEN
            )));
        }

        let (iv, ciphertext) = blob.split_at(IV_LEN);

        let cipher = Aes256Gcm::new_from_slice(key.expose())
            .map_err(|_| CryptoError::Authentication)?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CryptoError::Authentication)?;

        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
pub(crate) fn test_key() -> KeyHandle {
    use crate::crypto::random::OsRandom;

    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    OsRandom.fill_bytes(&mut bytes[..]).unwrap();
    KeyHandle::from_bytes(bytes)
}
