//! Persona Vault 설정
//!
//! 환경 변수(.env.local / .env 포함)에서 로드합니다.
//! PBKDF2 반복 횟수는 export 포맷 버전에 고정된 상수이므로 설정 대상이 아닙니다.

use std::path::{Path, PathBuf};

use crate::secrets::master_key::{DEFAULT_KEYCHAIN_ACCOUNT, DEFAULT_KEYCHAIN_SERVICE};

pub const ENV_DATA_DIR: &str = "PERSONA_DATA_DIR";
pub const ENV_KEYCHAIN_SERVICE: &str = "PERSONA_KEYCHAIN_SERVICE";
pub const ENV_KEYCHAIN_ACCOUNT: &str = "PERSONA_KEYCHAIN_ACCOUNT";
pub const ENV_LOG: &str = "PERSONA_LOG";

/// DB 파일 이름
pub const DB_FILE_NAME: &str = "persona.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionConfig {
    /// 앱 데이터 디렉토리 (DB, 기본 백업 위치)
    pub data_dir: PathBuf,
    pub keychain_service: String,
    pub keychain_account: String,
    /// `RUST_LOG`가 없을 때 사용할 tracing 필터
    pub log_filter: String,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            keychain_account: DEFAULT_KEYCHAIN_ACCOUNT.to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl ProtectionConfig {
    /// `.env.local` / `.env`를 먼저 반영한 뒤 환경 변수에서 로드 (앱 시작 시 사용)
    pub fn load() -> Self {
        crate::load_env();
        Self::from_env()
    }

    /// 프로세스 환경 변수에서 로드 (비어있는 값은 기본값 사용)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 로드
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            data_dir: non_empty(ENV_DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            keychain_service: non_empty(ENV_KEYCHAIN_SERVICE).unwrap_or(defaults.keychain_service),
            keychain_account: non_empty(ENV_KEYCHAIN_ACCOUNT).unwrap_or(defaults.keychain_account),
            log_filter: non_empty(ENV_LOG).unwrap_or(defaults.log_filter),
        }
    }

    /// 특정 디렉토리를 데이터 디렉토리로 사용하는 설정
    pub fn with_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("persona-vault")
}
