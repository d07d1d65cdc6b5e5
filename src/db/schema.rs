//! Database Schema
//!
//! SQLite 테이블 스키마 정의

/// 데이터베이스 스키마 생성 SQL
pub const CREATE_SCHEMA: &str = r#"
-- 설정/시크릿 테이블 (값은 암호문 또는 표시용 문자열)
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- 신원 테이블 (PII 컬럼은 모두 base64 암호문)
CREATE TABLE IF NOT EXISTS identities (
    id TEXT PRIMARY KEY,
    given_name TEXT NOT NULL,
    family_name TEXT NOT NULL,
    date_of_birth TEXT NOT NULL,
    street TEXT NOT NULL,
    city TEXT NOT NULL,
    postal_code TEXT NOT NULL,
    country TEXT NOT NULL,
    email_alias TEXT,
    phone_alias TEXT,
    created_at INTEGER NOT NULL
);

-- 신원 인덱스
CREATE INDEX IF NOT EXISTS idx_identities_created ON identities(created_at);
"#;
