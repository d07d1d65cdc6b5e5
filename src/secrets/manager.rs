//! Secret Manager - PIN / API 키 수명주기
//!
//! - 시크릿은 Field Encryption Bridge로 암호화한 뒤 preference store에 저장
//! - 슬롯별 상태: `Unconfigured` ↔ `Configured` (검증은 상태를 바꾸지 않음)
//! - 호출자가 넘긴 `SecretBuffer`는 성공/실패와 관계없이 반환 전에 0으로 지움
//! - API 키 원문은 읽기 API로 절대 노출하지 않고, 힌트/마스킹 문자열 또는
//!   1회성 사용(`with_api_key`)만 제공
//!
//! 같은 슬롯에 대한 동시 `set_pin`/`clear_pin` 직렬화는 호출자 책임입니다 (내부 락 없음).

use std::sync::Arc;

use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::error::{AppError, CryptoError};
use crate::secrets::buffer::{SecretBuffer, WipeOnDrop};
use crate::secrets::field::FieldCipher;
use crate::store::{PrefWrite, PreferenceStore};

/// PIN 암호문 키
pub const PIN_KEY: &str = "secrets/pin";
/// API 키 암호문 키
pub const API_KEY_KEY: &str = "secrets/api_key";
/// API 키 힌트 키
pub const API_KEY_HINT_KEY: &str = "secrets/api_key_hint";
/// API 키 마스킹 표시 키
pub const API_KEY_MASKED_KEY: &str = "secrets/api_key_masked";

/// 힌트로 보여줄 앞 글자 수
pub const HINT_CHARS: usize = 3;
/// 힌트를 보여주기 위한 최소 키 길이 (힌트 외에 최소 4글자는 숨김)
pub const MIN_CHARS_FOR_HINT: usize = HINT_CHARS + 4;
/// 마스킹 표시 (고정 길이, 원문 길이와 무관)
pub const MASK_GLYPHS: &str = "••••••••";

/// 시크릿 슬롯 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotState {
    Unconfigured,
    Configured,
}

/// UI 표시용 API 키 정보 (원문 복원 불가)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyDisplay {
    /// 앞 3글자 (짧은 키는 `None`)
    pub hint: Option<String>,
    /// 고정 길이 placeholder
    pub masked: String,
}

impl ApiKeyDisplay {
    /// 원문에서 표시용 정보 계산
    pub fn derive(secret: &str) -> Self {
        let hint = (secret.chars().count() >= MIN_CHARS_FOR_HINT)
            .then(|| secret.chars().take(HINT_CHARS).collect());

        Self {
            hint,
            masked: MASK_GLYPHS.to_string(),
        }
    }
}

/// PIN / API 키 수명주기 관리자
pub struct SecretManager {
    fields: Arc<FieldCipher>,
    prefs: Arc<dyn PreferenceStore>,
}

impl SecretManager {
    pub fn new(fields: Arc<FieldCipher>, prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { fields, prefs }
    }

    // =====================================
    // PIN
    // =====================================

    /// PIN 설정 (기존 PIN은 단일 키 덮어쓰기로 원자적으로 교체)
    pub fn set_pin(&self, pin: &mut SecretBuffer) -> Result<(), AppError> {
        let guard = WipeOnDrop::new(pin);
        if guard.is_empty() {
            return Err(CryptoError::InvalidSecret("PIN must not be empty").into());
        }
        guard.as_str()?;

        let encoded = self.fields.encrypt_bytes(guard.as_bytes())?;
        self.prefs.set(PIN_KEY, &encoded)?;

        info!("PIN configured");
        Ok(())
    }

    /// PIN 검증
    ///
    /// PIN 미설정, 저장소 오류, 복호화/인증 실패 모두 `false`로 합쳐집니다.
    /// 호출자는 "틀린 PIN"과 "손상된 저장소"를 구분할 수 없습니다.
    pub fn verify_pin(&self, candidate: &mut SecretBuffer) -> bool {
        let guard = WipeOnDrop::new(candidate);

        let encoded = match self.prefs.get(PIN_KEY) {
            Ok(Some(encoded)) => encoded,
            Ok(None) => return false,
            Err(e) => {
                warn!("PIN verification could not read store: {}", e);
                return false;
            }
        };

        let stored = match self.fields.decrypt_bytes(&encoded) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("PIN verification failed to decrypt: {}", e);
                return false;
            }
        };

        let matches: bool = stored.as_slice().ct_eq(guard.as_bytes()).into();
        debug!(matches, "PIN verified");
        matches
    }

    /// PIN 삭제 (멱등)
    pub fn clear_pin(&self) -> Result<(), AppError> {
        self.prefs.remove(PIN_KEY)?;
        info!("PIN cleared");
        Ok(())
    }

    pub fn has_pin(&self) -> Result<bool, AppError> {
        Ok(self.prefs.contains(PIN_KEY)?)
    }

    pub fn pin_state(&self) -> Result<SlotState, AppError> {
        Ok(Self::state_of(self.has_pin()?))
    }

    // =====================================
    // API 키
    // =====================================

    /// API 키 저장
    ///
    /// 암호문, 힌트, 마스킹 표시를 한 번의 batch로 반영하여 서로 어긋나지 않게 합니다.
    pub fn save_api_key(&self, key: &mut SecretBuffer) -> Result<ApiKeyDisplay, AppError> {
        let guard = WipeOnDrop::new(key);
        let trimmed = guard.as_str()?.trim();
        if trimmed.is_empty() {
            return Err(CryptoError::InvalidSecret("API key must not be empty").into());
        }

        let shown = ApiKeyDisplay::derive(trimmed);
        let encoded = self.fields.encrypt_bytes(trimmed.as_bytes())?;

        // 짧은 키로 교체하면 이전 키의 힌트가 남지 않도록 같은 batch에서 삭제
        let hint_write = match &shown.hint {
            Some(hint) => PrefWrite::set(API_KEY_HINT_KEY, hint.clone()),
            None => PrefWrite::remove(API_KEY_HINT_KEY),
        };
        self.prefs.apply(&[
            PrefWrite::set(API_KEY_KEY, encoded),
            hint_write,
            PrefWrite::set(API_KEY_MASKED_KEY, shown.masked.clone()),
        ])?;

        let has_hint = shown.hint.is_some();
        info!(has_hint, "API key saved");
        Ok(shown)
    }

    /// 표시용 힌트 (앞 3글자, 짧은 키거나 미설정이면 `None`)
    pub fn key_hint(&self) -> Result<Option<String>, AppError> {
        Ok(self.prefs.get(API_KEY_HINT_KEY)?)
    }

    /// 완전히 마스킹된 표시 문자열
    pub fn masked_display(&self) -> Result<Option<String>, AppError> {
        Ok(self.prefs.get(API_KEY_MASKED_KEY)?)
    }

    /// 힌트 + 마스킹 정보 (미설정이면 `None`)
    pub fn api_key_display(&self) -> Result<Option<ApiKeyDisplay>, AppError> {
        let Some(masked) = self.masked_display()? else {
            return Ok(None);
        };
        let hint = self.key_hint()?;
        Ok(Some(ApiKeyDisplay { hint, masked }))
    }

    /// 외부 요청 1회에 한해 복호화된 API 키를 빌려줌
    ///
    /// 원문은 클로저 실행 동안만 존재하며 반환 직후 zeroize 됩니다.
    /// 키가 없으면 `InvalidOperation`, 복호화 실패는 `CryptoError`로 전달됩니다.
    pub fn with_api_key<T>(&self, use_key: impl FnOnce(&str) -> T) -> Result<T, AppError> {
        let encoded = self
            .prefs
            .get(API_KEY_KEY)?
            .ok_or_else(|| AppError::InvalidOperation("API key not configured".to_string()))?;

        let key = self.fields.decrypt_secret(&encoded)?;
        Ok(use_key(key.as_str()))
    }

    /// API 키와 파생 힌트 전체 삭제 (멱등)
    pub fn clear_api_key(&self) -> Result<(), AppError> {
        self.prefs.apply(&[
            PrefWrite::remove(API_KEY_KEY),
            PrefWrite::remove(API_KEY_HINT_KEY),
            PrefWrite::remove(API_KEY_MASKED_KEY),
        ])?;
        info!("API key cleared");
        Ok(())
    }

    pub fn has_api_key(&self) -> Result<bool, AppError> {
        Ok(self.prefs.contains(API_KEY_KEY)?)
    }

    pub fn api_key_state(&self) -> Result<SlotState, AppError> {
        Ok(Self::state_of(self.has_api_key()?))
    }

    fn state_of(configured: bool) -> SlotState {
        if configured {
            SlotState::Configured
        } else {
            SlotState::Unconfigured
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::field::test_field_cipher;
    use crate::store::MemoryPreferenceStore;

    fn manager() -> (SecretManager, Arc<MemoryPreferenceStore>) {
        let prefs = Arc::new(MemoryPreferenceStore::new());
        let manager = SecretManager::new(Arc::new(test_field_cipher()), prefs.clone());
        (manager, prefs)
    }

    #[test]
    fn test_pin_scenario() {
        let (secrets, _) = manager();
        assert_eq!(secrets.pin_state().unwrap(), SlotState::Unconfigured);

        secrets.set_pin(&mut SecretBuffer::from("1234")).unwrap();
        assert_eq!(secrets.pin_state().unwrap(), SlotState::Configured);
        assert!(secrets.verify_pin(&mut SecretBuffer::from("1234")));
        assert!(!secrets.verify_pin(&mut SecretBuffer::from("9999")));
        assert!(!secrets.verify_pin(&mut SecretBuffer::from("12345")));

        secrets.clear_pin().unwrap();
        assert!(!secrets.has_pin().unwrap());
        assert!(!secrets.verify_pin(&mut SecretBuffer::from("1234")));

        // 멱등
        secrets.clear_pin().unwrap();
    }

    #[test]
    fn test_pin_overwrite_discards_old() {
        let (secrets, _) = manager();
        secrets.set_pin(&mut SecretBuffer::from("1111")).unwrap();
        secrets.set_pin(&mut SecretBuffer::from("2222")).unwrap();
        assert!(!secrets.verify_pin(&mut SecretBuffer::from("1111")));
        assert!(secrets.verify_pin(&mut SecretBuffer::from("2222")));
    }

    #[test]
    fn test_pin_buffers_wiped_on_all_paths() {
        let (secrets, _) = manager();

        let mut pin = SecretBuffer::from("4321");
        secrets.set_pin(&mut pin).unwrap();
        assert!(pin.is_wiped());

        let mut right = SecretBuffer::from("4321");
        assert!(secrets.verify_pin(&mut right));
        assert!(right.is_wiped());

        let mut wrong = SecretBuffer::from("0000");
        assert!(!secrets.verify_pin(&mut wrong));
        assert!(wrong.is_wiped());

        secrets.clear_pin().unwrap();
        let mut unconfigured = SecretBuffer::from("4321");
        assert!(!secrets.verify_pin(&mut unconfigured));
        assert!(unconfigured.is_wiped());
    }

    #[test]
    fn test_empty_pin_rejected() {
        let (secrets, _) = manager();
        let result = secrets.set_pin(&mut SecretBuffer::new());
        assert!(matches!(
            result,
            Err(AppError::Crypto(CryptoError::InvalidSecret(_)))
        ));
        assert!(!secrets.has_pin().unwrap());
    }

    #[test]
    fn test_corrupted_pin_storage_verifies_false() {
        let (secrets, prefs) = manager();
        secrets.set_pin(&mut SecretBuffer::from("1234")).unwrap();
        prefs.set(PIN_KEY, "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();

        let mut candidate = SecretBuffer::from("1234");
        assert!(!secrets.verify_pin(&mut candidate));
        assert!(candidate.is_wiped());
    }

    #[test]
    fn test_pin_stored_as_ciphertext() {
        let (secrets, prefs) = manager();
        secrets.set_pin(&mut SecretBuffer::from("1234")).unwrap();
        let stored = prefs.get(PIN_KEY).unwrap().unwrap();
        assert!(!stored.contains("1234"));
    }

    #[test]
    fn test_api_key_lifecycle() {
        let (secrets, prefs) = manager();
        assert_eq!(secrets.api_key_state().unwrap(), SlotState::Unconfigured);
        assert_eq!(secrets.api_key_display().unwrap(), None);

        let mut key = SecretBuffer::from("sk-live-0123456789");
        let shown = secrets.save_api_key(&mut key).unwrap();
        assert!(key.is_wiped());

        assert_eq!(shown.hint.as_deref(), Some("sk-"));
        assert_eq!(shown.masked, MASK_GLYPHS);
        assert_eq!(secrets.key_hint().unwrap(), Some("sk-".to_string()));
        assert_eq!(secrets.masked_display().unwrap(), Some(MASK_GLYPHS.to_string()));
        assert_eq!(secrets.api_key_display().unwrap(), Some(shown));

        let stored = prefs.get(API_KEY_KEY).unwrap().unwrap();
        assert!(!stored.contains("sk-live"));

        let header = secrets
            .with_api_key(|raw| format!("Bearer {}", raw))
            .unwrap();
        assert_eq!(header, "Bearer sk-live-0123456789");

        secrets.clear_api_key().unwrap();
        assert!(!secrets.has_api_key().unwrap());
        assert_eq!(secrets.key_hint().unwrap(), None);
        assert_eq!(secrets.masked_display().unwrap(), None);
        assert!(matches!(
            secrets.with_api_key(|_| ()),
            Err(AppError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_api_key_overwrite() {
        let (secrets, _) = manager();
        secrets
            .save_api_key(&mut SecretBuffer::from("first-key-value"))
            .unwrap();
        secrets
            .save_api_key(&mut SecretBuffer::from("second-key-value"))
            .unwrap();
        assert_eq!(secrets.key_hint().unwrap(), Some("sec".to_string()));
        assert_eq!(
            secrets.with_api_key(|raw| raw.to_string()).unwrap(),
            "second-key-value"
        );
    }

    #[test]
    fn test_short_api_key_has_no_hint() {
        let shown = ApiKeyDisplay::derive("abc123");
        assert_eq!(shown.hint, None);
        assert_eq!(shown.masked, MASK_GLYPHS);

        let shown = ApiKeyDisplay::derive("ключ-api-7");
        assert_eq!(shown.hint.as_deref(), Some("клю"));
    }

    #[test]
    fn test_short_api_key_replaces_previous_hint() {
        let (secrets, prefs) = manager();
        secrets
            .save_api_key(&mut SecretBuffer::from("sk-live-0123456789"))
            .unwrap();
        assert_eq!(secrets.key_hint().unwrap(), Some("sk-".to_string()));

        let shown = secrets.save_api_key(&mut SecretBuffer::from("abc123")).unwrap();
        assert_eq!(shown.hint, None);
        assert_eq!(secrets.key_hint().unwrap(), None);
        assert!(!prefs.contains(API_KEY_HINT_KEY).unwrap());
        assert_eq!(
            secrets.api_key_display().unwrap(),
            Some(ApiKeyDisplay {
                hint: None,
                masked: MASK_GLYPHS.to_string(),
            })
        );
        assert_eq!(secrets.with_api_key(|raw| raw.to_string()).unwrap(), "abc123");
    }

    #[test]
    fn test_empty_api_key_rejected_and_wiped() {
        let (secrets, _) = manager();
        let mut key = SecretBuffer::from("   ");
        assert!(secrets.save_api_key(&mut key).is_err());
        assert!(key.is_wiped());
        assert!(!secrets.has_api_key().unwrap());
    }

    #[test]
    fn test_tampered_api_key_surfaces_typed_error() {
        let (secrets, prefs) = manager();
        secrets
            .save_api_key(&mut SecretBuffer::from("sk-live-0123456789"))
            .unwrap();
        prefs.set(API_KEY_KEY, "%%%").unwrap();

        let err = secrets.with_api_key(|_| ()).unwrap_err();
        match err {
            AppError::Crypto(crypto) => assert!(crypto.is_decryption_failure()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
