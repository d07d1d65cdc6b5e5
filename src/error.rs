//! Persona Vault Error Types
//!
//! 데이터 보호 계층과 애플리케이션 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

/// 암호화 계층 에러
///
/// 복호화 실패는 절대 기본값/빈 평문으로 삼켜지지 않고 항상 이 타입으로 전달됩니다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// 보안 키 저장소 자체를 사용할 수 없음 (치명적)
    #[error("Key provisioning failed: {0}")]
    KeyProvisioning(String),

    /// 한 번 사용된 마스터키가 사라졌거나 손상됨 (기존 암호문은 복구 불가)
    #[error("Master key unavailable: existing ciphertext cannot be recovered")]
    KeyUnavailable,

    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Decryption failed: authentication tag mismatch")]
    Authentication,

    #[error("Invalid password or corrupted data")]
    InvalidPasswordOrCorruptData,

    #[error("Malformed blob: {0}")]
    MalformedBlob(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid secret: {0}")]
    InvalidSecret(&'static str),
}

impl CryptoError {
    /// 호출자 입장에서 "복호화 실패"로 동일하게 취급되는 에러인지 여부
    pub fn is_decryption_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::Authentication
                | CryptoError::InvalidPasswordOrCorruptData
                | CryptoError::MalformedBlob(_)
        )
    }
}

/// Preference store 에러
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Persona Vault 애플리케이션 에러
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Preference store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// UI 계층 응답용 직렬화 가능한 에러
///
/// 사용자에게 보여줄 문구("PIN incorrect", "Invalid API key" 등)는 code를 보고 호출자가 결정합니다.
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<CryptoError> for CommandError {
    fn from(error: CryptoError) -> Self {
        let code = match &error {
            CryptoError::KeyProvisioning(_) => "KEY_PROVISIONING_ERROR",
            CryptoError::KeyUnavailable => "KEY_UNAVAILABLE",
            CryptoError::EntropyUnavailable(_) => "ENTROPY_UNAVAILABLE",
            CryptoError::Authentication | CryptoError::MalformedBlob(_) => "DECRYPTION_FAILED",
            CryptoError::InvalidPasswordOrCorruptData => "INVALID_PASSWORD",
            CryptoError::EncryptionFailed(_) => "ENCRYPTION_FAILED",
            CryptoError::InvalidSecret(_) => "INVALID_SECRET",
        };

        CommandError {
            code: code.to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Crypto(crypto) => return CommandError::from(crypto.clone()),
            AppError::Store(_) => "STORE_ERROR",
            AppError::Database(_) => "DB_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::IdentityNotFound(_) => "IDENTITY_NOT_FOUND",
            AppError::InvalidPath(_) => "PATH_ERROR",
            AppError::InvalidOperation(_) => "INVALID_OPERATION",
        };

        CommandError {
            code: code.to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}
