//! 비밀값 버퍼
//!
//! PIN / API 키 / 내보내기 비밀번호는 호출자가 소유한 `SecretBuffer`로 전달됩니다.
//! 이 버퍼를 받은 함수는 성공/실패/조기 반환 여부와 관계없이 반환 전에 내용을 0으로 덮어씁니다.

use std::fmt;

use zeroize::Zeroize;

use crate::error::CryptoError;

/// 입력용 버퍼의 초기 용량 (일반적인 PIN / API 키는 재할당 없이 담김)
pub const ENTRY_CAPACITY: usize = 128;

/// 0으로 지울 수 있는 가변 비밀값 버퍼 (UTF-8)
///
/// `wipe()`는 길이를 유지한 채 모든 바이트를 0으로 만들고, drop 시에는 할당 영역 전체를 지웁니다.
/// `push`로 용량을 넘기면 새 영역으로 옮긴 뒤 이전 영역을 지우고 해제합니다.
pub struct SecretBuffer {
    bytes: Vec<u8>,
}

impl Default for SecretBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretBuffer {
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(ENTRY_CAPACITY),
        }
    }

    /// 문자열의 소유권을 가져옴 (복사 없이 내부 버퍼를 재사용)
    pub fn from_string(value: String) -> Self {
        Self {
            bytes: value.into_bytes(),
        }
    }

    /// 입력 중인 문자 배열을 옮겨 담고 원본 배열은 0 문자로 덮어씀
    pub fn from_chars(chars: &mut [char]) -> Self {
        let mut bytes = Vec::with_capacity(chars.len() * 4);
        let mut scratch = [0u8; 4];
        for c in chars.iter() {
            bytes.extend_from_slice(c.encode_utf8(&mut scratch).as_bytes());
        }
        scratch.zeroize();
        for c in chars.iter_mut() {
            *c = '\0';
        }
        Self { bytes }
    }

    /// 입력 UI에서 한 글자씩 추가
    pub fn push(&mut self, c: char) {
        let mut scratch = [0u8; 4];
        let len = c.encode_utf8(&mut scratch).len();
        self.reserve_wiping(len);
        self.bytes.extend_from_slice(&scratch[..len]);
        scratch.zeroize();
    }

    /// `additional` 바이트를 담을 공간 확보
    ///
    /// `Vec`의 자체 재할당은 이전 영역을 지우지 않고 해제하므로 직접 옮깁니다.
    fn reserve_wiping(&mut self, additional: usize) {
        let required = self.bytes.len() + additional;
        if required <= self.bytes.capacity() {
            return;
        }

        let capacity = required.max(self.bytes.capacity() * 2).max(ENTRY_CAPACITY);
        let mut grown = Vec::with_capacity(capacity);
        grown.extend_from_slice(&self.bytes);

        let mut previous = std::mem::replace(&mut self.bytes, grown);
        previous.zeroize();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// UTF-8 문자열로 노출 (지워진 버퍼는 NUL 문자열로 보임)
    pub fn as_str(&self) -> Result<&str, CryptoError> {
        std::str::from_utf8(&self.bytes)
            .map_err(|_| CryptoError::InvalidSecret("secret is not valid UTF-8"))
    }

    /// 길이는 유지하고 모든 바이트를 0으로 덮어씀
    pub fn wipe(&mut self) {
        self.bytes.as_mut_slice().zeroize();
    }

    /// 모든 바이트가 0인지 여부 (빈 버퍼 포함)
    pub fn is_wiped(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl From<String> for SecretBuffer {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<&str> for SecretBuffer {
    fn from(value: &str) -> Self {
        Self {
            bytes: value.as_bytes().to_vec(),
        }
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer([REDACTED; {}])", self.bytes.len())
    }
}

/// 스코프를 벗어날 때 빌린 버퍼를 반드시 지우는 가드
pub(crate) struct WipeOnDrop<'a> {
    buffer: &'a mut SecretBuffer,
}

impl<'a> WipeOnDrop<'a> {
    pub(crate) fn new(buffer: &'a mut SecretBuffer) -> Self {
        Self { buffer }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub(crate) fn as_str(&self) -> Result<&str, CryptoError> {
        self.buffer.as_str()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 가드가 살아있는 동안 즉시 지움 (예: 키 유도 직후)
    pub(crate) fn wipe_now(&mut self) {
        self.buffer.wipe();
    }
}

impl Drop for WipeOnDrop<'_> {
    fn drop(&mut self) {
        self.buffer.wipe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wipe_keeps_length_and_zeroes() {
        let mut buf = SecretBuffer::from("1234");
        assert!(!buf.is_wiped());
        buf.wipe();
        assert_eq!(buf.len(), 4);
        assert!(buf.is_wiped());
        assert_eq!(buf.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_from_chars_clears_source() {
        let mut chars = ['s', 'k', '-', 'ü'];
        let buf = SecretBuffer::from_chars(&mut chars);
        assert_eq!(buf.as_str().unwrap(), "sk-ü");
        assert!(chars.iter().all(|c| *c == '\0'));
    }

    #[test]
    fn test_guard_wipes_on_early_return() {
        fn fails_midway(buf: &mut SecretBuffer) -> Result<(), CryptoError> {
            let guard = WipeOnDrop::new(buf);
            if !guard.is_empty() {
                return Err(CryptoError::InvalidSecret("rejected"));
            }
            Ok(())
        }

        let mut buf = SecretBuffer::from("hunter2");
        assert!(fails_midway(&mut buf).is_err());
        assert!(buf.is_wiped());
    }

    #[test]
    fn test_push_and_debug_redacted() {
        let mut buf = SecretBuffer::new();
        buf.push('4');
        buf.push('2');
        assert_eq!(buf.as_str().unwrap(), "42");
        assert_eq!(format!("{:?}", buf), "SecretBuffer([REDACTED; 2])");
    }

    #[test]
    fn test_typed_entry_stays_in_one_allocation() {
        let mut buf = SecretBuffer::new();
        buf.push('c');
        let start = buf.as_bytes().as_ptr();

        for c in "orrect-horse-battery-staple-1234".chars() {
            buf.push(c);
            assert_eq!(buf.as_bytes().as_ptr(), start);
        }
        assert_eq!(buf.as_str().unwrap(), "correct-horse-battery-staple-1234");
    }

    #[test]
    fn test_growth_past_entry_capacity_keeps_contents() {
        let mut buf = SecretBuffer::from_string(String::with_capacity(0));
        let expected: String = "ab€".chars().cycle().take(ENTRY_CAPACITY).collect();
        for c in expected.chars() {
            buf.push(c);
        }
        assert!(buf.len() > ENTRY_CAPACITY);
        assert_eq!(buf.as_str().unwrap(), expected);

        buf.wipe();
        assert!(buf.is_wiped());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let buf = SecretBuffer {
            bytes: vec![0xff, 0xfe],
        };
        assert!(matches!(buf.as_str(), Err(CryptoError::InvalidSecret(_))));
    }
}
