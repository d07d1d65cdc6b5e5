//! Password-Based Export Codec
//!
//! Export blob 포맷 (v1, 헤더/매직 없음):
//! - salt: 32 bytes (내보내기마다 새 난수)
//! - iv: 12 bytes
//! - ciphertext: 페이로드와 같은 길이
//! - tag: 16 bytes
//!
//! 키 유도: PBKDF2-HMAC-SHA256, 반복 횟수는 포맷 버전별 전역 상수(`EXPORT_FORMAT_V1_ITERATIONS`).
//! blob에 반복 횟수가 들어있지 않으므로 이 상수는 절대 줄이지 않습니다.
//! 반복 횟수를 올리려면 새 포맷 버전을 정의하고 v1 blob은 v1 상수로 계속 복호화해야 합니다.
//!
//! 페이로드는 한 번에(single-shot GCM) 암호화합니다. 수백 MB 이상이 필요해지면
//! 청크 단위 AEAD 스트리밍으로 바꿔야 합니다.

use std::sync::Arc;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{AuthenticatedCipher, KeyHandle, RandomSource, IV_LEN, KEY_LEN, TAG_LEN};
use crate::error::CryptoError;
use crate::secrets::buffer::{SecretBuffer, WipeOnDrop};

/// salt 길이 (256-bit)
pub const SALT_LEN: usize = 32;

/// v1 포맷의 PBKDF2 반복 횟수
pub const EXPORT_FORMAT_V1_ITERATIONS: u32 = 600_000;

/// export blob 최소 길이 (빈 페이로드)
pub const MIN_EXPORT_BLOB_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

/// 비밀번호 기반 내보내기/가져오기 코덱
#[derive(Clone)]
pub struct ExportCodec {
    cipher: AuthenticatedCipher,
    rng: Arc<dyn RandomSource>,
    iterations: u32,
}

impl ExportCodec {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self {
            cipher: AuthenticatedCipher::new(rng.clone()),
            rng,
            iterations: EXPORT_FORMAT_V1_ITERATIONS,
        }
    }

    /// 단위 테스트 전용: 반복 횟수를 낮춘 코덱 (v1 blob과 호환되지 않음)
    #[cfg(test)]
    pub(crate) fn with_iterations(rng: Arc<dyn RandomSource>, iterations: u32) -> Self {
        Self {
            cipher: AuthenticatedCipher::new(rng.clone()),
            rng,
            iterations,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// 페이로드를 비밀번호로 암호화하여 `salt || iv || ciphertext || tag` 반환
    ///
    /// 비밀번호 버퍼는 키 유도 직후, 그리고 모든 실패 경로에서 지워집니다.
    pub fn export_encrypt(
        &self,
        payload: &[u8],
        password: &mut SecretBuffer,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut password = WipeOnDrop::new(password);
        if password.is_empty() {
            return Err(CryptoError::InvalidSecret("export password must not be empty"));
        }

        let mut salt = [0u8; SALT_LEN];
        self.rng.fill_bytes(&mut salt)?;

        let key = self.derive_key(password.as_bytes(), &salt);
        password.wipe_now();

        let sealed = self.cipher.encrypt(&key, payload)?;

        let mut blob = Vec::with_capacity(SALT_LEN + sealed.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&sealed);

        debug!(
            payload_len = payload.len(),
            blob_len = blob.len(),
            "Export payload encrypted"
        );
        Ok(blob)
    }

    /// export blob을 비밀번호로 복호화
    ///
    /// 잘못된 비밀번호, 손상된 데이터, 너무 짧은 blob 모두 `InvalidPasswordOrCorruptData`.
    pub fn export_decrypt(
        &self,
        blob: &[u8],
        password: &mut SecretBuffer,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let mut password = WipeOnDrop::new(password);
        if blob.len() < MIN_EXPORT_BLOB_LEN {
            return Err(CryptoError::InvalidPasswordOrCorruptData);
        }

        let (salt, sealed) = blob.split_at(SALT_LEN);
        let key = self.derive_key(password.as_bytes(), salt);
        password.wipe_now();

        let payload = self
            .cipher
            .decrypt(&key, sealed)
            .map_err(|_| CryptoError::InvalidPasswordOrCorruptData)?;

        debug!(payload_len = payload.len(), "Export payload decrypted");
        Ok(payload)
    }

    /// `export_encrypt`를 blocking 스레드 풀에서 실행
    ///
    /// PBKDF2는 의도적으로 느리므로(수백 ms) async 런타임 스레드에서 직접 호출하지 않습니다.
    pub async fn encrypt_blocking_async(
        self: Arc<Self>,
        payload: Zeroizing<Vec<u8>>,
        mut password: SecretBuffer,
    ) -> Result<Vec<u8>, CryptoError> {
        tokio::task::spawn_blocking(move || self.export_encrypt(&payload, &mut password))
            .await
            .map_err(|e| CryptoError::EncryptionFailed(format!("export task failed: {}", e)))?
    }

    /// `export_decrypt`를 blocking 스레드 풀에서 실행
    pub async fn decrypt_blocking_async(
        self: Arc<Self>,
        blob: Vec<u8>,
        mut password: SecretBuffer,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        tokio::task::spawn_blocking(move || self.export_decrypt(&blob, &mut password))
            .await
            .map_err(|_| CryptoError::InvalidPasswordOrCorruptData)?
    }

    fn derive_key(&self, password: &[u8], salt: &[u8]) -> KeyHandle {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password, salt, self.iterations, &mut key[..]);
        KeyHandle::from_bytes(key)
    }
}
