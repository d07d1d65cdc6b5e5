use std::path::{Path, PathBuf};

use crate::error::AppError;

/// 백업 파일 경로 검증
///
/// - 파일이 있으면 canonicalize, 없으면(새 export) 부모 디렉토리를 canonicalize 후 파일명 결합
/// - 시스템 중요 디렉토리는 차단
pub fn validate_path(path: &Path) -> Result<PathBuf, AppError> {
    if path.as_os_str().is_empty() {
        return Err(AppError::InvalidPath("path must not be empty".to_string()));
    }

    let canonical_path = if path.exists() {
        path.canonicalize()
            .map_err(|e| AppError::InvalidPath(format!("{}: {}", path.display(), e)))?
    } else {
        let file_name = path
            .file_name()
            .ok_or_else(|| AppError::InvalidPath(format!("{}: missing file name", path.display())))?;

        match path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => std::env::current_dir()?.join(file_name),
            Some(parent) if parent.exists() => parent
                .canonicalize()
                .map_err(|e| AppError::InvalidPath(format!("{}: {}", parent.display(), e)))?
                .join(file_name),
            Some(parent) => {
                return Err(AppError::InvalidPath(format!(
                    "parent directory does not exist: {}",
                    parent.display()
                )))
            }
            None => PathBuf::from(path),
        }
    };

    if canonical_path.is_dir() {
        return Err(AppError::InvalidPath(format!(
            "{} is a directory",
            canonical_path.display()
        )));
    }

    if is_blocked_path(&canonical_path) {
        return Err(AppError::InvalidPath(
            "access to system directory is blocked".to_string(),
        ));
    }

    Ok(canonical_path)
}

fn is_blocked_path(path: &Path) -> bool {
    #[cfg(target_os = "windows")]
    {
        let lower = path.to_string_lossy().to_lowercase();
        if lower.contains(r"c:\windows") || lower.contains(r"c:\program files") {
            return true;
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        const BLOCKED: [&str; 8] = [
            "/etc", "/proc", "/sys", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot",
        ];
        if BLOCKED.iter().any(|prefix| path.starts_with(prefix)) {
            return true;
        }
    }

    false
}
