//! 백업 내보내기/가져오기
//!
//! 봉인된 신원을 모두 열어 `BackupPayload` JSON으로 직렬화한 뒤, 사용자 비밀번호로
//! export blob을 만들어 파일에 기록합니다. 가져오기는 반대 순서로 진행하며 각 신원을
//! 이 장치의 마스터키로 다시 봉인합니다. 잘못된 비밀번호면 아무것도 기록하지 않습니다.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;
use zeroize::Zeroizing;

use crate::db::DbState;
use crate::error::AppError;
use crate::models::{BackupPayload, SealedIdentity};
use crate::secrets::vault::{read_export_file, write_export_file};
use crate::secrets::{ExportCodec, FieldCipher, SecretBuffer};
use crate::utils::validate_path;

/// 내보내기 결과
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub path: PathBuf,
    pub identity_count: usize,
    pub bytes: usize,
}

/// 가져오기 결과
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub identity_count: usize,
    pub exported_at: i64,
}

/// 전체 신원을 비밀번호로 보호된 백업 파일로 내보내기
///
/// 비밀번호 버퍼는 성공/실패와 관계없이 지워집니다.
pub fn export_backup(
    db: &DbState,
    fields: &FieldCipher,
    codec: &ExportCodec,
    out_path: &Path,
    password: &mut SecretBuffer,
) -> Result<ExportSummary, AppError> {
    let (out_path, identity_count, plaintext) = match prepare_export(db, fields, out_path) {
        Ok(prepared) => prepared,
        Err(e) => {
            password.wipe();
            return Err(e);
        }
    };

    let blob = codec.export_encrypt(&plaintext, password)?;
    write_export_file(&out_path, &blob)?;

    info!(identities = identity_count, bytes = blob.len(), "Backup exported");

    Ok(ExportSummary {
        path: out_path,
        identity_count,
        bytes: blob.len(),
    })
}

fn prepare_export(
    db: &DbState,
    fields: &FieldCipher,
    out_path: &Path,
) -> Result<(PathBuf, usize, Zeroizing<Vec<u8>>), AppError> {
    let out_path = validate_path(out_path)?;

    let identities = db
        .with(|db| db.load_all_identities())?
        .iter()
        .map(|identity| identity.open(fields))
        .collect::<Result<Vec<_>, _>>()?;

    let payload = BackupPayload {
        version: 1,
        exported_at: chrono::Utc::now().timestamp_millis(),
        identities,
    };
    let plaintext = Zeroizing::new(serde_json::to_vec(&payload)?);

    Ok((out_path, payload.identities.len(), plaintext))
}

/// 백업 파일을 가져와 현재 DB에 병합 (같은 id는 교체)
pub fn import_backup(
    db: &DbState,
    fields: &FieldCipher,
    codec: &ExportCodec,
    in_path: &Path,
    password: &mut SecretBuffer,
) -> Result<ImportSummary, AppError> {
    let blob = match read_backup_blob(in_path) {
        Ok(blob) => blob,
        Err(e) => {
            password.wipe();
            return Err(e);
        }
    };

    let plaintext = codec.export_decrypt(&blob, password)?;
    let payload: BackupPayload = serde_json::from_slice(&plaintext)?;

    if payload.version != 1 {
        return Err(AppError::InvalidOperation(format!(
            "unsupported backup version: {}",
            payload.version
        )));
    }

    let sealed = payload
        .identities
        .iter()
        .map(|identity| identity.seal(fields))
        .collect::<Result<Vec<SealedIdentity>, _>>()?;

    db.with(|db| db.save_identities(&sealed))?;

    info!(identities = sealed.len(), "Backup imported");

    Ok(ImportSummary {
        identity_count: sealed.len(),
        exported_at: payload.exported_at,
    })
}

fn read_backup_blob(in_path: &Path) -> Result<Vec<u8>, AppError> {
    let path = validate_path(in_path)?;
    Ok(read_export_file(&path)?)
}
