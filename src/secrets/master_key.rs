//! Master Key Provider
//!
//! - 마스터키는 보안 키 저장소(OS Keychain 등)에만 존재 (`persona:master_key_v1`)
//! - 상위 계층은 불투명한 `KeyHandle`만 받으며 원시 바이트를 볼 수 없음
//! - 최초 생성 시 preference store에 provisioning 마커를 남겨, 이후 키가 사라지면
//!   새 키를 조용히 만드는 대신 `KeyUnavailable`로 보고

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use keyring::Entry;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{KeyHandle, RandomSource, KEY_LEN};
use crate::error::CryptoError;
use crate::store::PreferenceStore;

/// 기본 Keychain 서비스 이름
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.persona.vault";
/// 기본 마스터키 Keychain 계정
pub const DEFAULT_KEYCHAIN_ACCOUNT: &str = "persona:master_key_v1";
/// 마스터키 최초 생성 시각을 기록하는 preference 키
pub const PROVISIONED_MARKER_KEY: &str = "master_key/provisioned_at";

/// 보안 키 저장소 추상화
pub trait KeyStore: Send + Sync {
    /// 저장된 키 바이트 (엔트리가 없으면 `None`)
    fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError>;

    fn save(&self, key: &[u8]) -> Result<(), CryptoError>;

    /// 없는 엔트리 삭제는 성공으로 취급
    fn delete(&self) -> Result<(), CryptoError>;
}

/// OS Keychain/Keyring 기반 저장소
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
    account: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry, CryptoError> {
        Entry::new(&self.service, &self.account)
            .map_err(|e| CryptoError::KeyProvisioning(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYCHAIN_SERVICE, DEFAULT_KEYCHAIN_ACCOUNT)
    }
}

impl KeyStore for KeyringStore {
    fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError> {
        let encoded = match self.entry()?.get_password() {
            Ok(password) => Zeroizing::new(password),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(CryptoError::KeyProvisioning(e.to_string())),
        };

        // Base64 디코딩 실패는 손상된 키로 취급
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|_| CryptoError::KeyUnavailable)?;

        Ok(Some(Zeroizing::new(bytes)))
    }

    fn save(&self, key: &[u8]) -> Result<(), CryptoError> {
        let encoded = Zeroizing::new(BASE64.encode(key));
        self.entry()?
            .set_password(&encoded)
            .map_err(|e| CryptoError::KeyProvisioning(e.to_string()))
    }

    fn delete(&self) -> Result<(), CryptoError> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CryptoError::KeyProvisioning(e.to_string())),
        }
    }
}

/// 프로세스 메모리 키 저장소 (테스트 및 임시 세션용)
#[derive(Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<Zeroizing<Vec<u8>>>>,
    unavailable: std::sync::atomic::AtomicBool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장소 장애 흉내 (이후 모든 호출이 `KeyProvisioning`으로 실패)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CryptoError> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CryptoError::KeyProvisioning(
                "secure key store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Zeroizing<Vec<u8>>>>, CryptoError> {
        self.slot
            .lock()
            .map_err(|_| CryptoError::KeyProvisioning("key store lock poisoned".to_string()))
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<Zeroizing<Vec<u8>>>, CryptoError> {
        self.check_available()?;
        Ok(self.slot()?.clone())
    }

    fn save(&self, key: &[u8]) -> Result<(), CryptoError> {
        self.check_available()?;
        *self.slot()? = Some(Zeroizing::new(key.to_vec()));
        Ok(())
    }

    fn delete(&self) -> Result<(), CryptoError> {
        self.check_available()?;
        *self.slot()? = None;
        Ok(())
    }
}

/// 장치에 묶인 마스터키의 유일한 소유자
///
/// 전역 싱글톤이 아니라 composition root(`PersonaVault`)가 생성하여 주입합니다.
pub struct MasterKeyProvider {
    store: Arc<dyn KeyStore>,
    prefs: Arc<dyn PreferenceStore>,
    rng: Arc<dyn RandomSource>,
    /// 최초 조회 후 캐시된 핸들 (동시 최초 호출은 이 락으로 직렬화)
    handle: Mutex<Option<KeyHandle>>,
}

impl MasterKeyProvider {
    pub fn new(
        store: Arc<dyn KeyStore>,
        prefs: Arc<dyn PreferenceStore>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            store,
            prefs,
            rng,
            handle: Mutex::new(None),
        }
    }

    /// 마스터키 핸들 조회 (없으면 생성)
    ///
    /// 1. 캐시된 핸들이 있으면 그대로 반환
    /// 2. 저장소에서 로드 (길이가 다르면 `KeyUnavailable`)
    /// 3. 엔트리가 없고 provisioning 마커도 없으면 새 키 생성 후 저장
    /// 4. 엔트리가 없는데 마커가 있으면 `KeyUnavailable`
    pub fn get_or_create_key(&self) -> Result<KeyHandle, CryptoError> {
        let mut cached = self
            .handle
            .lock()
            .map_err(|_| CryptoError::KeyProvisioning("key handle lock poisoned".to_string()))?;

        if let Some(handle) = cached.as_ref() {
            return Ok(handle.clone());
        }

        let handle = match self.store.load()? {
            Some(bytes) => {
                debug!("Master key loaded from secure store");
                Self::handle_from_stored(&bytes)?
            }
            None => {
                if self.was_provisioned()? {
                    warn!("Master key missing from secure store after provisioning");
                    return Err(CryptoError::KeyUnavailable);
                }
                info!("No master key found, generating new one");
                self.provision()?
            }
        };

        *cached = Some(handle.clone());
        Ok(handle)
    }

    /// 전체 데이터 삭제 시 마스터키 파기
    ///
    /// 이후 기존 암호문은 복구할 수 없으며, 다음 `get_or_create_key`는 새 키를 만듭니다.
    pub fn destroy(&self) -> Result<(), CryptoError> {
        let mut cached = self
            .handle
            .lock()
            .map_err(|_| CryptoError::KeyProvisioning("key handle lock poisoned".to_string()))?;

        self.store.delete()?;
        self.prefs
            .remove(PROVISIONED_MARKER_KEY)
            .map_err(|e| CryptoError::KeyProvisioning(e.to_string()))?;
        *cached = None;

        info!("Master key destroyed");
        Ok(())
    }

    fn was_provisioned(&self) -> Result<bool, CryptoError> {
        self.prefs
            .contains(PROVISIONED_MARKER_KEY)
            .map_err(|e| CryptoError::KeyProvisioning(e.to_string()))
    }

    fn provision(&self) -> Result<KeyHandle, CryptoError> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        self.rng.fill_bytes(&mut bytes[..])?;

        self.store.save(&bytes[..])?;
        self.prefs
            .set(
                PROVISIONED_MARKER_KEY,
                &chrono::Utc::now().timestamp_millis().to_string(),
            )
            .map_err(|e| CryptoError::KeyProvisioning(e.to_string()))?;

        info!("New master key saved to secure store");
        Ok(KeyHandle::from_bytes(bytes))
    }

    fn handle_from_stored(stored: &[u8]) -> Result<KeyHandle, CryptoError> {
        if stored.len() != KEY_LEN {
            warn!(len = stored.len(), "Stored master key has invalid length");
            return Err(CryptoError::KeyUnavailable);
        }
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        bytes.copy_from_slice(stored);
        Ok(KeyHandle::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::OsRandom;
    use crate::store::MemoryPreferenceStore;

    fn provider_with(
        store: Arc<MemoryKeyStore>,
        prefs: Arc<MemoryPreferenceStore>,
    ) -> MasterKeyProvider {
        MasterKeyProvider::new(store, prefs, Arc::new(OsRandom))
    }

    #[test]
    fn test_first_call_creates_and_caches() {
        let store = Arc::new(MemoryKeyStore::new());
        let prefs = Arc::new(MemoryPreferenceStore::new());
        let provider = provider_with(store.clone(), prefs.clone());

        let first = provider.get_or_create_key().unwrap();
        let second = provider.get_or_create_key().unwrap();
        assert!(first.same_key(&second));

        assert_eq!(store.load().unwrap().unwrap().len(), KEY_LEN);
        assert!(prefs.contains(PROVISIONED_MARKER_KEY).unwrap());
    }

    #[test]
    fn test_same_key_across_provider_instances() {
        let store = Arc::new(MemoryKeyStore::new());
        let prefs = Arc::new(MemoryPreferenceStore::new());

        let a = provider_with(store.clone(), prefs.clone())
            .get_or_create_key()
            .unwrap();
        let b = provider_with(store, prefs).get_or_create_key().unwrap();
        assert_eq!(a.expose(), b.expose());
    }

    #[test]
    fn test_missing_key_after_provisioning_is_unavailable() {
        let store = Arc::new(MemoryKeyStore::new());
        let prefs = Arc::new(MemoryPreferenceStore::new());
        provider_with(store.clone(), prefs.clone())
            .get_or_create_key()
            .unwrap();

        // Keychain 엔트리만 사라진 상황
        store.delete().unwrap();

        let result = provider_with(store, prefs).get_or_create_key();
        assert_eq!(result.unwrap_err(), CryptoError::KeyUnavailable);
    }

    #[test]
    fn test_corrupted_key_is_unavailable() {
        let store = Arc::new(MemoryKeyStore::new());
        store.save(&[7u8; 5]).unwrap();
        let provider = provider_with(store, Arc::new(MemoryPreferenceStore::new()));
        assert_eq!(
            provider.get_or_create_key().unwrap_err(),
            CryptoError::KeyUnavailable
        );
    }

    #[test]
    fn test_store_unavailable_is_provisioning_error() {
        let store = Arc::new(MemoryKeyStore::new());
        store.set_unavailable(true);
        let provider = provider_with(store, Arc::new(MemoryPreferenceStore::new()));
        assert!(matches!(
            provider.get_or_create_key(),
            Err(CryptoError::KeyProvisioning(_))
        ));
    }

    #[test]
    fn test_destroy_allows_fresh_key() {
        let store = Arc::new(MemoryKeyStore::new());
        let prefs = Arc::new(MemoryPreferenceStore::new());
        let provider = provider_with(store.clone(), prefs.clone());

        let old = provider.get_or_create_key().unwrap();
        provider.destroy().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!prefs.contains(PROVISIONED_MARKER_KEY).unwrap());

        let new = provider.get_or_create_key().unwrap();
        assert_ne!(old.expose(), new.expose());
    }

    #[test]
    fn test_concurrent_first_calls_share_one_key() {
        let provider = Arc::new(provider_with(
            Arc::new(MemoryKeyStore::new()),
            Arc::new(MemoryPreferenceStore::new()),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                std::thread::spawn(move || provider.get_or_create_key().unwrap())
            })
            .collect();

        let keys: Vec<KeyHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(keys.windows(2).all(|w| w[0].same_key(&w[1])));
    }
}
