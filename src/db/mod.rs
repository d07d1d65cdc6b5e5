//! Database Module
//!
//! SQLite 데이터베이스 관리 (preference store + 봉인된 신원 행)
//!
//! DB 자체의 투명 암호화는 외부 계층으로 취급하며, 여기 저장되는 PII/시크릿은
//! 그 위에 필드 단위 암호화가 한 번 더 적용된 값입니다.

mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{AppError, StoreError};
use crate::models::SealedIdentity;
use crate::store::{PrefWrite, PreferenceStore};

/// 데이터베이스 상태 (composition root가 공유)
pub struct DbState(pub Mutex<Database>);

impl DbState {
    pub fn new(db: Database) -> Self {
        Self(Mutex::new(db))
    }

    /// 락을 잡고 DB 작업 실행
    pub fn with<T>(&self, f: impl FnOnce(&Database) -> Result<T, AppError>) -> Result<T, AppError> {
        let db = self.0.lock().map_err(|_| StoreError::Poisoned)?;
        f(&db)
    }
}

/// 데이터베이스 래퍼
pub struct Database {
    conn: Connection,
}

impl Database {
    /// 새 데이터베이스 연결 생성
    pub fn new(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// 메모리 데이터베이스 (테스트 및 임시 세션용)
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// 데이터베이스 스키마 초기화
    pub fn initialize(&self) -> Result<(), AppError> {
        self.conn.execute_batch(schema::CREATE_SCHEMA)?;
        Ok(())
    }

    // =====================================
    // Preferences
    // =====================================

    pub fn get_preference(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn set_preference(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)",
            (key, value, chrono::Utc::now().timestamp_millis()),
        )?;
        Ok(())
    }

    pub fn remove_preference(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM preferences WHERE key = ?1", [key])?;
        Ok(())
    }

    /// 여러 preference 쓰기를 하나의 트랜잭션으로 반영
    pub fn apply_preferences(&self, writes: &[PrefWrite]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        let now = chrono::Utc::now().timestamp_millis();

        for write in writes {
            match write {
                PrefWrite::Set { key, value } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)",
                        (key, value, now),
                    )?;
                }
                PrefWrite::Remove { key } => {
                    tx.execute("DELETE FROM preferences WHERE key = ?1", [key])?;
                }
            }
        }

        tx.commit()
    }

    // =====================================
    // Identities
    // =====================================

    /// 봉인된 신원 저장 (같은 id면 교체)
    pub fn save_identity(&self, identity: &SealedIdentity) -> Result<(), AppError> {
        Self::upsert_identity(&self.conn, identity)?;
        Ok(())
    }

    /// 여러 신원을 하나의 트랜잭션으로 저장
    pub fn save_identities(&self, identities: &[SealedIdentity]) -> Result<(), AppError> {
        let tx = self.conn.unchecked_transaction()?;
        for identity in identities {
            Self::upsert_identity(&tx, identity)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// 신원 로드
    pub fn load_identity(&self, identity_id: &str) -> Result<SealedIdentity, AppError> {
        self.conn
            .query_row(
                "SELECT id, given_name, family_name, date_of_birth, street, city, postal_code,
                        country, email_alias, phone_alias, created_at
                 FROM identities WHERE id = ?1",
                [identity_id],
                Self::row_to_identity,
            )
            .optional()?
            .ok_or_else(|| AppError::IdentityNotFound(identity_id.to_string()))
    }

    /// 전체 신원 로드 (생성 순)
    pub fn load_all_identities(&self) -> Result<Vec<SealedIdentity>, AppError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, given_name, family_name, date_of_birth, street, city, postal_code,
                    country, email_alias, phone_alias, created_at
             FROM identities ORDER BY created_at, id",
        )?;
        let iter = stmt.query_map([], Self::row_to_identity)?;

        let mut out = Vec::new();
        for identity in iter {
            out.push(identity?);
        }
        Ok(out)
    }

    /// 저장된 신원 ID 목록 조회
    pub fn list_identity_ids(&self) -> Result<Vec<String>, AppError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM identities ORDER BY created_at DESC")?;
        let iter = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for id in iter {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// 신원 삭제 (존재했으면 true)
    pub fn delete_identity(&self, identity_id: &str) -> Result<bool, AppError> {
        let affected = self
            .conn
            .execute("DELETE FROM identities WHERE id = ?1", [identity_id])?;
        Ok(affected > 0)
    }

    /// 전체 데이터 삭제 (신원 + preferences)
    pub fn wipe_all(&self) -> Result<(), AppError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM identities", [])?;
        tx.execute("DELETE FROM preferences", [])?;
        tx.commit()?;
        Ok(())
    }

    fn upsert_identity(conn: &Connection, identity: &SealedIdentity) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT OR REPLACE INTO identities
                (id, given_name, family_name, date_of_birth, street, city, postal_code,
                 country, email_alias, phone_alias, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                identity.id,
                identity.given_name,
                identity.family_name,
                identity.date_of_birth,
                identity.street,
                identity.city,
                identity.postal_code,
                identity.country,
                identity.email_alias,
                identity.phone_alias,
                identity.created_at,
            ],
        )?;
        Ok(())
    }

    fn row_to_identity(row: &rusqlite::Row<'_>) -> Result<SealedIdentity, rusqlite::Error> {
        Ok(SealedIdentity {
            id: row.get(0)?,
            given_name: row.get(1)?,
            family_name: row.get(2)?,
            date_of_birth: row.get(3)?,
            street: row.get(4)?,
            city: row.get(5)?,
            postal_code: row.get(6)?,
            country: row.get(7)?,
            email_alias: row.get(8)?,
            phone_alias: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl PreferenceStore for DbState {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.0.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(db.get_preference(key)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let db = self.0.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(db.set_preference(key, value)?)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let db = self.0.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(db.remove_preference(key)?)
    }

    fn apply(&self, writes: &[PrefWrite]) -> Result<(), StoreError> {
        let db = self.0.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(db.apply_preferences(writes)?)
    }
}

#[cfg(test)]
pub(crate) fn test_db() -> DbState {
    let db = Database::open_in_memory().unwrap();
    db.initialize().unwrap();
    DbState::new(db)
}
