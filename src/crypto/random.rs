//! Random Source
//!
//! 모든 salt / IV / 키 재료는 이 trait를 통해 생성합니다.
//! 엔트로피 소스 실패 시 약한 생성기로 대체하지 않고 `EntropyUnavailable`로 실패합니다.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;

/// 암호학적으로 안전한 난수 공급자
pub trait RandomSource: Send + Sync {
    /// `dest`를 난수로 채움
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), CryptoError>;

    /// `n` 바이트 난수 생성
    fn next_bytes(&self, n: usize) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0u8; n];
        self.fill_bytes(&mut out)?;
        Ok(out)
    }
}

/// OS CSPRNG (getrandom 기반)
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))
    }
}
