//! Persona Vault - Local Data Protection Core
//!
//! 합성 신원(PII)과 사용자 시크릿(PIN, API 키)을 신뢰할 수 없는 장치에서 보호하는 Rust 라이브러리로,
//! 마스터키 관리, 필드 단위 암호화, 비밀번호 기반 백업 암호화를 담당합니다.
//!
//! UI, 신원 생성 로직, 네트워크 클라이언트는 이 crate 밖에 있으며
//! `PersonaVault`가 노출하는 암복호화/시크릿 API만 사용합니다.

pub mod backup;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod secrets;
pub mod store;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::backup::{ExportSummary, ImportSummary};
use crate::config::ProtectionConfig;
use crate::crypto::{OsRandom, RandomSource};
use crate::db::{Database, DbState};
use crate::error::AppError;
use crate::models::IdentityProfile;
use crate::secrets::{
    ExportCodec, FieldCipher, KeyStore, KeyringStore, MasterKeyProvider, SecretBuffer,
    SecretManager,
};

fn is_valid_env_key(key: &str) -> bool {
    // 관례적으로 ENV 키는 A-Z0-9_ 로 제한 (PERSONA_*, RUST_LOG 등)
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn try_load_env_lenient(path: &Path) -> std::io::Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let mut loaded = 0usize;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        // 주석/코드펜스/설명 라인은 무시하고 KEY=VALUE 라인만 사용
        if line.is_empty() || line.starts_with('#') || line.starts_with("```") {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if !is_valid_env_key(key) {
            continue;
        }
        // 이미 비어있지 않은 값이 설정되어 있으면 덮어쓰지 않음
        if std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false) {
            continue;
        }

        let value = v.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
            .unwrap_or(value);

        std::env::set_var(key, value);
        loaded += 1;
    }

    Ok(loaded)
}

fn find_upwards(start: PathBuf, filename: &str, max_hops: usize) -> Option<PathBuf> {
    let mut cur = start;
    for _ in 0..=max_hops {
        let candidate = cur.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        if !cur.pop() {
            break;
        }
    }
    None
}

/// `.env.local` → `.env` 순서로 환경 변수 로드 (현재 디렉토리부터 상위로 탐색)
///
/// strict 파서(dotenvy)가 실패하면 lenient 로더로 보강하며, 파일이 없어도 실패하지 않습니다.
/// 이미 설정된 환경 변수는 덮어쓰지 않습니다.
pub fn load_env() {
    if let Ok(cwd) = std::env::current_dir() {
        load_env_from(&cwd);
    }
}

fn load_env_from(start: &Path) {
    if let Some(path) = find_upwards(start.to_path_buf(), ".env.local", 6) {
        if dotenvy::from_path(&path).is_err() {
            let _ = try_load_env_lenient(&path);
        }
    }
    if let Some(path) = find_upwards(start.to_path_buf(), ".env", 6) {
        let _ = dotenvy::from_path(&path);
    }
}

/// tracing subscriber 설치 (`RUST_LOG` 우선, 없으면 설정 필터). 중복 호출은 무시.
pub fn init_tracing(config: &ProtectionConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 데이터 보호 계층 composition root
///
/// 마스터키 provider를 전역 상태가 아닌 이 구조체가 소유하고 각 구성요소에 주입합니다.
pub struct PersonaVault {
    config: ProtectionConfig,
    db: Arc<DbState>,
    keys: Arc<MasterKeyProvider>,
    fields: Arc<FieldCipher>,
    secrets: SecretManager,
    export: Arc<ExportCodec>,
}

impl PersonaVault {
    /// 앱 데이터 디렉토리의 DB와 OS Keychain으로 열기
    pub fn open(config: ProtectionConfig) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db = Database::new(&config.db_path())?;
        let key_store = Arc::new(KeyringStore::new(
            config.keychain_service.clone(),
            config.keychain_account.clone(),
        ));

        Self::assemble(config, db, key_store, Arc::new(OsRandom))
    }

    /// 구성요소를 직접 주입하여 조립 (임시 세션, 테스트)
    pub fn assemble(
        config: ProtectionConfig,
        db: Database,
        key_store: Arc<dyn KeyStore>,
        rng: Arc<dyn RandomSource>,
    ) -> Result<Self, AppError> {
        let export = ExportCodec::new(rng.clone());
        Self::build(config, db, key_store, rng, export)
    }

    fn build(
        config: ProtectionConfig,
        db: Database,
        key_store: Arc<dyn KeyStore>,
        rng: Arc<dyn RandomSource>,
        export: ExportCodec,
    ) -> Result<Self, AppError> {
        db.initialize()?;
        let db = Arc::new(DbState::new(db));

        let keys = Arc::new(MasterKeyProvider::new(key_store, db.clone(), rng.clone()));
        // 키 저장소 장애는 첫 사용 시가 아니라 시작 시점에 드러나도록 즉시 프로비저닝
        keys.get_or_create_key()?;

        let fields = Arc::new(FieldCipher::new(keys.clone(), rng));
        let secrets = SecretManager::new(fields.clone(), db.clone());

        info!(data_dir = %config.data_dir.display(), "Persona vault ready");

        Ok(Self {
            config,
            db,
            keys,
            fields,
            secrets,
            export: Arc::new(export),
        })
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    pub fn db(&self) -> &DbState {
        &self.db
    }

    /// Field Encryption Bridge (`encrypt_string` / `decrypt_string`)
    pub fn fields(&self) -> &FieldCipher {
        &self.fields
    }

    /// PIN / API 키 수명주기
    pub fn secrets(&self) -> &SecretManager {
        &self.secrets
    }

    /// Password-Based Export Codec (async wrapper용으로 `Arc` 반환)
    pub fn export_codec(&self) -> Arc<ExportCodec> {
        self.export.clone()
    }

    /// 신원을 필드 봉인 후 저장
    pub fn save_identity(&self, identity: &IdentityProfile) -> Result<(), AppError> {
        let sealed = identity.seal(&self.fields)?;
        self.db.with(|db| db.save_identity(&sealed))
    }

    /// 신원 로드 후 봉인 해제
    pub fn load_identity(&self, identity_id: &str) -> Result<IdentityProfile, AppError> {
        let sealed = self.db.with(|db| db.load_identity(identity_id))?;
        Ok(sealed.open(&self.fields)?)
    }

    pub fn export_backup(
        &self,
        out_path: &Path,
        password: &mut SecretBuffer,
    ) -> Result<ExportSummary, AppError> {
        backup::export_backup(&self.db, &self.fields, &self.export, out_path, password)
    }

    /// 설정된 백업 디렉토리에 타임스탬프 파일명으로 내보내기
    pub fn export_backup_to_default_location(
        &self,
        password: &mut SecretBuffer,
    ) -> Result<ExportSummary, AppError> {
        let dir = self.config.backup_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            password.wipe();
            return Err(e.into());
        }
        self.export_backup(&secrets::vault::default_export_path(&dir), password)
    }

    pub fn import_backup(
        &self,
        in_path: &Path,
        password: &mut SecretBuffer,
    ) -> Result<ImportSummary, AppError> {
        backup::import_backup(&self.db, &self.fields, &self.export, in_path, password)
    }

    /// 전체 데이터 삭제: 신원, preferences, 마스터키
    ///
    /// 이후 새 마스터키로 다시 시작하며, 삭제 전 암호문은 복구할 수 없습니다.
    pub fn wipe_all_data(&self) -> Result<(), AppError> {
        self.db.with(|db| db.wipe_all())?;
        self.keys.destroy()?;
        info!("All local data wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use crate::models::sample_identity;
    use crate::secrets::master_key::PROVISIONED_MARKER_KEY;
    use crate::secrets::MemoryKeyStore;
    use crate::store::PreferenceStore;
    use tempfile::tempdir;

    fn vault_with(key_store: Arc<MemoryKeyStore>) -> PersonaVault {
        let rng: Arc<dyn RandomSource> = Arc::new(OsRandom);
        PersonaVault::build(
            ProtectionConfig::with_data_dir(&std::env::temp_dir()),
            Database::open_in_memory().unwrap(),
            key_store,
            rng.clone(),
            ExportCodec::with_iterations(rng, 1_000),
        )
        .unwrap()
    }

    #[test]
    fn test_end_to_end_flows() {
        let vault = vault_with(Arc::new(MemoryKeyStore::new()));

        let encoded = vault.fields().encrypt_string("Morgan Ashby").unwrap();
        assert_eq!(vault.fields().decrypt_string(&encoded).unwrap(), "Morgan Ashby");

        vault.secrets().set_pin(&mut SecretBuffer::from("1234")).unwrap();
        assert!(vault.secrets().verify_pin(&mut SecretBuffer::from("1234")));

        let identity = sample_identity();
        vault.save_identity(&identity).unwrap();
        assert_eq!(vault.load_identity(&identity.id).unwrap(), identity);
    }

    #[test]
    fn test_backup_through_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("persona.pvbackup");

        let source = vault_with(Arc::new(MemoryKeyStore::new()));
        let identity = sample_identity();
        source.save_identity(&identity).unwrap();
        source
            .export_backup(&path, &mut SecretBuffer::from("pw"))
            .unwrap();

        let target = vault_with(Arc::new(MemoryKeyStore::new()));
        target
            .import_backup(&path, &mut SecretBuffer::from("pw"))
            .unwrap();
        assert_eq!(target.load_identity(&identity.id).unwrap(), identity);
    }

    #[test]
    fn test_backup_to_default_location() {
        let dir = tempdir().unwrap();
        let rng: Arc<dyn RandomSource> = Arc::new(OsRandom);
        let vault = PersonaVault::build(
            ProtectionConfig::with_data_dir(dir.path()),
            Database::open_in_memory().unwrap(),
            Arc::new(MemoryKeyStore::new()),
            rng.clone(),
            ExportCodec::with_iterations(rng, 1_000),
        )
        .unwrap();

        vault.save_identity(&sample_identity()).unwrap();
        let mut password = SecretBuffer::from("pw");
        let summary = vault.export_backup_to_default_location(&mut password).unwrap();
        assert!(password.is_wiped());
        assert!(summary.path.exists());
        assert!(summary.path.starts_with(dir.path().canonicalize().unwrap()));
        assert_eq!(summary.identity_count, 1);
    }

    #[test]
    fn test_unavailable_key_store_fails_at_startup() {
        let store = Arc::new(MemoryKeyStore::new());
        store.set_unavailable(true);
        let rng: Arc<dyn RandomSource> = Arc::new(OsRandom);
        let result = PersonaVault::build(
            ProtectionConfig::default(),
            Database::open_in_memory().unwrap(),
            store,
            rng.clone(),
            ExportCodec::with_iterations(rng, 1_000),
        );
        assert!(matches!(
            result,
            Err(AppError::Crypto(CryptoError::KeyProvisioning(_)))
        ));
    }

    #[test]
    fn test_wipe_all_data() {
        let store = Arc::new(MemoryKeyStore::new());
        let vault = vault_with(store.clone());

        let old_ciphertext = vault.fields().encrypt_string("before wipe").unwrap();
        vault.secrets().set_pin(&mut SecretBuffer::from("1234")).unwrap();
        vault.save_identity(&sample_identity()).unwrap();

        vault.wipe_all_data().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!vault.secrets().has_pin().unwrap());
        assert!(vault.db().with(|db| db.list_identity_ids()).unwrap().is_empty());
        assert!(!vault.db().contains(PROVISIONED_MARKER_KEY).unwrap());

        // 새 마스터키로 재시작, 이전 암호문은 복구 불가
        let err = vault.fields().decrypt_string(&old_ciphertext).unwrap_err();
        assert_eq!(err, CryptoError::Authentication);
        assert!(vault.db().contains(PROVISIONED_MARKER_KEY).unwrap());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = ProtectionConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }

    #[test]
    fn test_env_files_found_in_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("app").join("bin");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            dir.path().join(".env.local"),
            "PERSONA_TEST_DISCOVERY_SHARED=local\nPERSONA_TEST_DISCOVERY_LOCAL=yes\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("app").join(".env"),
            "PERSONA_TEST_DISCOVERY_SHARED=base\nPERSONA_TEST_DISCOVERY_BASE=yes\n",
        )
        .unwrap();

        load_env_from(&nested);

        assert_eq!(std::env::var("PERSONA_TEST_DISCOVERY_LOCAL").unwrap(), "yes");
        assert_eq!(std::env::var("PERSONA_TEST_DISCOVERY_BASE").unwrap(), "yes");
        assert_eq!(std::env::var("PERSONA_TEST_DISCOVERY_SHARED").unwrap(), "local");
    }

    #[test]
    fn test_lenient_env_loader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env.local");
        std::fs::write(
            &path,
            "# notes\n```\nPERSONA_TEST_LENIENT_A=\"quoted\"\nexport PERSONA_TEST_LENIENT_B=plain\nnot a pair\nlower_key=ignored\n```\n",
        )
        .unwrap();

        let loaded = try_load_env_lenient(&path).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(std::env::var("PERSONA_TEST_LENIENT_A").unwrap(), "quoted");
        assert_eq!(std::env::var("PERSONA_TEST_LENIENT_B").unwrap(), "plain");
        assert!(std::env::var("lower_key").is_err());
    }
}
