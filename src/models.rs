//! Persona Vault Data Models
//!
//! 합성 신원(PII)과 필드 단위로 봉인된 저장 형태

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::secrets::FieldCipher;

/// 합성 신원 (평문, 메모리/백업 페이로드에서만 존재)
///
/// drop 시 모든 필드를 0으로 지우므로 백업 페이로드의 평문 목록도 함께 지워집니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProfile {
    pub id: String,
    pub given_name: String,
    pub family_name: String,
    /// ISO-8601 날짜 (`YYYY-MM-DD`)
    pub date_of_birth: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub email_alias: Option<String>,
    pub phone_alias: Option<String>,
    pub created_at: i64,
}

impl IdentityProfile {
    /// 새 id와 생성 시각으로 신원 생성
    pub fn new(given_name: &str, family_name: &str, date_of_birth: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            given_name: given_name.to_string(),
            family_name: family_name.to_string(),
            date_of_birth: date_of_birth.to_string(),
            street: String::new(),
            city: String::new(),
            postal_code: String::new(),
            country: String::new(),
            email_alias: None,
            phone_alias: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 모든 PII 필드를 마스터키로 봉인 (id, created_at은 색인용으로 평문 유지)
    pub fn seal(&self, fields: &FieldCipher) -> Result<SealedIdentity, CryptoError> {
        let seal_opt = |value: &Option<String>| -> Result<Option<String>, CryptoError> {
            value.as_deref().map(|v| fields.encrypt_string(v)).transpose()
        };

        Ok(SealedIdentity {
            id: self.id.clone(),
            given_name: fields.encrypt_string(&self.given_name)?,
            family_name: fields.encrypt_string(&self.family_name)?,
            date_of_birth: fields.encrypt_string(&self.date_of_birth)?,
            street: fields.encrypt_string(&self.street)?,
            city: fields.encrypt_string(&self.city)?,
            postal_code: fields.encrypt_string(&self.postal_code)?,
            country: fields.encrypt_string(&self.country)?,
            email_alias: seal_opt(&self.email_alias)?,
            phone_alias: seal_opt(&self.phone_alias)?,
            created_at: self.created_at,
        })
    }
}

/// 필드 단위로 암호화된 신원 (DB 행과 1:1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedIdentity {
    pub id: String,
    pub given_name: String,
    pub family_name: String,
    pub date_of_birth: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub email_alias: Option<String>,
    pub phone_alias: Option<String>,
    pub created_at: i64,
}

impl SealedIdentity {
    /// 봉인 해제 (하나의 필드라도 인증 실패하면 전체 실패)
    pub fn open(&self, fields: &FieldCipher) -> Result<IdentityProfile, CryptoError> {
        let open_opt = |value: &Option<String>| -> Result<Option<String>, CryptoError> {
            value.as_deref().map(|v| fields.decrypt_string(v)).transpose()
        };

        Ok(IdentityProfile {
            id: self.id.clone(),
            given_name: fields.decrypt_string(&self.given_name)?,
            family_name: fields.decrypt_string(&self.family_name)?,
            date_of_birth: fields.decrypt_string(&self.date_of_birth)?,
            street: fields.decrypt_string(&self.street)?,
            city: fields.decrypt_string(&self.city)?,
            postal_code: fields.decrypt_string(&self.postal_code)?,
            country: fields.decrypt_string(&self.country)?,
            email_alias: open_opt(&self.email_alias)?,
            phone_alias: open_opt(&self.phone_alias)?,
            created_at: self.created_at,
        })
    }
}

/// 비밀번호로 보호되는 백업 페이로드
///
/// PIN / API 키 암호문은 장치 마스터키에 묶여 있으므로 포함하지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    /// 페이로드 버전 (향후 마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,
    pub exported_at: i64,
    pub identities: Vec<IdentityProfile>,
}

fn default_version() -> u32 {
    1
}

#[cfg(test)]
pub(crate) fn sample_identity() -> IdentityProfile {
    let mut identity = IdentityProfile::new("Avery", "Lindqvist", "1991-07-23");
    identity.street = "42 Quiet Lane".to_string();
    identity.city = "Portsmouth".to_string();
    identity.postal_code = "PO1 2AB".to_string();
    identity.country = "GB".to_string();
    identity.email_alias = Some("avery.l@relay.example".to_string());
    identity
}
