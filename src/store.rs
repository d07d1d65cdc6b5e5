//! Preference Store
//!
//! 암호문/힌트를 문자열로 보관하는 key-value 저장소 계약.
//! 키 단위 쓰기는 원자적이며, `apply`는 여러 키를 하나의 단위로 반영합니다.
//!
//! 키는 namespaced string으로 통일:
//! - `secrets/pin`
//! - `secrets/api_key`, `secrets/api_key_hint`, `secrets/api_key_masked`
//! - `master_key/provisioned_at`

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;

/// 일괄 반영용 쓰기 연산
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefWrite {
    Set { key: String, value: String },
    Remove { key: String },
}

impl PrefWrite {
    pub fn set(key: &str, value: impl Into<String>) -> Self {
        PrefWrite::Set {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn remove(key: &str) -> Self {
        PrefWrite::Remove {
            key: key.to_string(),
        }
    }
}

/// 문자열 key-value 저장소
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// 없는 키 삭제는 성공으로 취급
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// 모든 연산을 원자적으로 반영 (전부 반영되거나 전혀 반영되지 않음)
    fn apply(&self, writes: &[PrefWrite]) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// 프로세스 메모리 저장소 (테스트 및 임시 세션용)
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn apply(&self, writes: &[PrefWrite]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        for write in writes {
            match write {
                PrefWrite::Set { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                PrefWrite::Remove { key } => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}
