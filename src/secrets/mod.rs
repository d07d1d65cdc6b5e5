//! Local Data Protection 모듈
//!
//! Master Key + Field Encryption + Password Export 아키텍처로 로컬 데이터를 보호합니다.
//!
//! - 보안 키 저장소에는 마스터키 1개만 저장 (`persona:master_key_v1`)
//! - PII 필드, PIN, API 키는 마스터키로 AES-256-GCM 암호화 후 preference store/DB에 저장
//! - 백업은 사용자 비밀번호에서 PBKDF2로 유도한 1회용 키로 암호화

pub mod buffer;
pub mod export;
pub mod field;
pub mod manager;
pub mod master_key;
pub mod vault;

pub use buffer::SecretBuffer;
pub use export::ExportCodec;
pub use field::FieldCipher;
pub use manager::{ApiKeyDisplay, SecretManager, SlotState};
pub use master_key::{KeyStore, KeyringStore, MasterKeyProvider, MemoryKeyStore};
