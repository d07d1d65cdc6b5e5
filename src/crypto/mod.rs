//! 암호 기본 요소
//!
//! - `random`: CSPRNG (salt, IV, 키 재료)
//! - `cipher`: AES-256-GCM 인증 암호

pub mod cipher;
pub mod random;

pub use cipher::{AuthenticatedCipher, KeyHandle, IV_LEN, KEY_LEN, TAG_LEN};
pub use random::{OsRandom, RandomSource};
