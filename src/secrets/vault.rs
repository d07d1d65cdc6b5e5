//! Export 파일 I/O
//!
//! export blob은 헤더 없이 그대로 파일에 기록합니다 (`salt || iv || ciphertext || tag`).
//! 쓰기는 임시 파일에 기록 후 rename 하는 atomic write로 처리하여,
//! 중간에 실패해도 기존 백업 파일이 반쯤 덮어써진 상태로 남지 않습니다.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{AppError, CryptoError};
use crate::secrets::export::MIN_EXPORT_BLOB_LEN;

/// 백업 파일 기본 확장자
pub const EXPORT_FILE_EXTENSION: &str = "pvbackup";

/// Export 파일 오류
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export file too short: {0} bytes")]
    TooShort(usize),
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Io(e) => AppError::Io(e),
            VaultError::TooShort(_) => AppError::Crypto(CryptoError::InvalidPasswordOrCorruptData),
        }
    }
}

/// export blob을 파일에 atomic write
pub fn write_export_file(path: &Path, blob: &[u8]) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = temp_path_for(path);

    let mut file = fs::File::create(&tmp_path)?;
    let written = file.write_all(blob).and_then(|_| file.sync_all());
    drop(file);

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// export 파일을 읽음 (최소 길이 미만이면 복호화 시도 전에 거부)
pub fn read_export_file(path: &Path) -> Result<Vec<u8>, VaultError> {
    let mut file = fs::File::open(path)?;
    let mut blob = Vec::new();
    file.read_to_end(&mut blob)?;

    if blob.len() < MIN_EXPORT_BLOB_LEN {
        return Err(VaultError::TooShort(blob.len()));
    }
    Ok(blob)
}

/// 기본 백업 파일 경로 생성 (`<dir>/persona-<timestamp>.pvbackup`)
pub fn default_export_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("persona-{}.{}", stamp, EXPORT_FILE_EXTENSION))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
