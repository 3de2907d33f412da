//! SQLite 영속 스토어
//!
//! 파이프라인이 재시작 간에 유지해야 하는 세 가지 상태를 각각의
//! 데이터베이스 파일로 관리합니다.
//!
//! - [`DedupStore`] (`dedup.db`): 이미 본 이벤트 fingerprint
//! - [`OfflineStore`] (`offline.db`): 전송 실패로 대기 중인 payload
//! - [`CacheStore`] (`cache.db`): 주소별 위협 verdict 캐시
//!
//! 모든 스토어는 `Mutex<Connection>`으로 보호되는 동기 연산이며,
//! 연산 단위가 단일 row라 블로킹 시간은 무시할 수 있는 수준입니다.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::ShipperError;

fn store_err(operation: &str) -> impl FnOnce(rusqlite::Error) -> ShipperError + '_ {
    move |e| ShipperError::Store {
        operation: operation.to_owned(),
        reason: e.to_string(),
    }
}

fn lock_conn<'a>(
    conn: &'a Mutex<Connection>,
    operation: &str,
) -> Result<MutexGuard<'a, Connection>, ShipperError> {
    conn.lock().map_err(|_| ShipperError::Store {
        operation: operation.to_owned(),
        reason: "store mutex poisoned".to_owned(),
    })
}

fn open_db(path: &Path, schema: &str) -> Result<Connection, ShipperError> {
    let conn = Connection::open(path).map_err(|e| ShipperError::Store {
        operation: "open".to_owned(),
        reason: format!("{}: {}", path.display(), e),
    })?;
    conn.execute_batch(schema).map_err(store_err("open"))?;
    Ok(conn)
}

/// 이미 처리한 이벤트 fingerprint의 영속 집합
///
/// fingerprint는 원시 라인의 blake3 hex 문자열이며, 한 번 기록되면
/// 프로세스 재시작 후에도 같은 라인을 다시 전송하지 않습니다.
#[derive(Debug)]
pub struct DedupStore {
    conn: Mutex<Connection>,
}

impl DedupStore {
    /// 스토어를 열고 스키마를 초기화합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ShipperError> {
        let conn = open_db(
            path.as_ref(),
            r#"
            CREATE TABLE IF NOT EXISTS seen_events (
                fingerprint TEXT PRIMARY KEY,
                first_seen  INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// fingerprint를 기록합니다.
    ///
    /// 처음 보는 fingerprint였으면 `true`, 이미 있었으면 `false`를
    /// 반환합니다. 검사와 기록이 단일 INSERT로 수행되므로 원자적입니다.
    pub fn mark(&self, fingerprint: &str, first_seen: i64) -> Result<bool, ShipperError> {
        let conn = lock_conn(&self.conn, "mark")?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO seen_events (fingerprint, first_seen) VALUES (?1, ?2)",
                (fingerprint, first_seen),
            )
            .map_err(store_err("mark"))?;
        Ok(inserted == 1)
    }

    /// 기록된 fingerprint 수를 반환합니다.
    pub fn len(&self) -> Result<usize, ShipperError> {
        let conn = lock_conn(&self.conn, "len")?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM seen_events", [], |row| row.get(0))
            .map_err(store_err("len"))?;
        Ok(count as usize)
    }
}

/// 전송 실패 이벤트의 영속 FIFO 큐
///
/// TCP 전송이 실패한 payload를 보관했다가 재연결 시 먼저 비웁니다.
/// `id`가 적재 순서를 결정합니다.
#[derive(Debug)]
pub struct OfflineStore {
    conn: Mutex<Connection>,
}

impl OfflineStore {
    /// 스토어를 열고 스키마를 초기화합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ShipperError> {
        let conn = open_db(
            path.as_ref(),
            r#"
            CREATE TABLE IF NOT EXISTS pending_events (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                payload   BLOB NOT NULL,
                queued_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// payload를 큐 맨 뒤에 적재하고 row id를 반환합니다.
    pub fn append(&self, payload: &[u8], queued_at: i64) -> Result<i64, ShipperError> {
        let conn = lock_conn(&self.conn, "append")?;
        conn.execute(
            "INSERT INTO pending_events (payload, queued_at) VALUES (?1, ?2)",
            (payload, queued_at),
        )
        .map_err(store_err("append"))?;
        Ok(conn.last_insert_rowid())
    }

    /// 가장 오래된 항목을 조회합니다 (제거하지 않음).
    pub fn front(&self) -> Result<Option<(i64, Vec<u8>)>, ShipperError> {
        let conn = lock_conn(&self.conn, "front")?;
        let row = conn.query_row(
            "SELECT id, payload FROM pending_events ORDER BY id ASC LIMIT 1",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)),
        );
        match row {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(store_err("front")(e)),
        }
    }

    /// 항목을 id로 제거합니다.
    pub fn remove(&self, id: i64) -> Result<(), ShipperError> {
        let conn = lock_conn(&self.conn, "remove")?;
        conn.execute("DELETE FROM pending_events WHERE id = ?1", [id])
            .map_err(store_err("remove"))?;
        Ok(())
    }

    /// 대기 중인 항목 수를 반환합니다.
    pub fn len(&self) -> Result<usize, ShipperError> {
        let conn = lock_conn(&self.conn, "len")?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pending_events", [], |row| row.get(0))
            .map_err(store_err("len"))?;
        Ok(count as usize)
    }
}

/// 주소별 위협 verdict의 영속 캐시
///
/// TTL 판정은 [`ThreatCache`](crate::cache::ThreatCache)가 `observed_at`을
/// 기준으로 수행합니다. 스토어는 기록된 시각을 그대로 보관만 합니다.
#[derive(Debug)]
pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    /// 스토어를 열고 스키마를 초기화합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ShipperError> {
        let conn = open_db(
            path.as_ref(),
            r#"
            CREATE TABLE IF NOT EXISTS verdict_cache (
                address     TEXT PRIMARY KEY,
                verdict     TEXT NOT NULL,
                observed_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 주소의 (verdict, observed_at)을 조회합니다.
    pub fn get(&self, address: &str) -> Result<Option<(String, i64)>, ShipperError> {
        let conn = lock_conn(&self.conn, "get")?;
        let row = conn.query_row(
            "SELECT verdict, observed_at FROM verdict_cache WHERE address = ?1",
            [address],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        );
        match row {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(store_err("get")(e)),
        }
    }

    /// 주소의 verdict를 기록합니다. 기존 항목은 덮어씁니다.
    pub fn put(&self, address: &str, verdict: &str, observed_at: i64) -> Result<(), ShipperError> {
        let conn = lock_conn(&self.conn, "put")?;
        conn.execute(
            "INSERT OR REPLACE INTO verdict_cache (address, verdict, observed_at) VALUES (?1, ?2, ?3)",
            (address, verdict, observed_at),
        )
        .map_err(store_err("put"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        (dir, path)
    }

    #[test]
    fn dedup_mark_is_first_time_only() {
        let (_dir, path) = temp_db("dedup.db");
        let store = DedupStore::open(&path).unwrap();

        assert!(store.mark("fp-1", 100).unwrap());
        assert!(!store.mark("fp-1", 200).unwrap());
        assert!(store.mark("fp-2", 100).unwrap());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn dedup_survives_reopen() {
        let (_dir, path) = temp_db("dedup.db");
        {
            let store = DedupStore::open(&path).unwrap();
            assert!(store.mark("fp-persist", 100).unwrap());
        }
        let reopened = DedupStore::open(&path).unwrap();
        assert!(!reopened.mark("fp-persist", 200).unwrap());
    }

    #[test]
    fn offline_preserves_fifo_order() {
        let (_dir, path) = temp_db("offline.db");
        let store = OfflineStore::open(&path).unwrap();

        store.append(b"first", 1).unwrap();
        store.append(b"second", 2).unwrap();
        store.append(b"third", 3).unwrap();
        assert_eq!(store.len().unwrap(), 3);

        let (id, payload) = store.front().unwrap().unwrap();
        assert_eq!(payload, b"first");
        store.remove(id).unwrap();

        let (id, payload) = store.front().unwrap().unwrap();
        assert_eq!(payload, b"second");
        store.remove(id).unwrap();

        let (id, payload) = store.front().unwrap().unwrap();
        assert_eq!(payload, b"third");
        store.remove(id).unwrap();

        assert!(store.front().unwrap().is_none());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn offline_front_does_not_remove() {
        let (_dir, path) = temp_db("offline.db");
        let store = OfflineStore::open(&path).unwrap();

        store.append(b"payload", 1).unwrap();
        assert!(store.front().unwrap().is_some());
        assert!(store.front().unwrap().is_some());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn offline_survives_reopen() {
        let (_dir, path) = temp_db("offline.db");
        {
            let store = OfflineStore::open(&path).unwrap();
            store.append(b"pending", 42).unwrap();
        }
        let reopened = OfflineStore::open(&path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        let (_, payload) = reopened.front().unwrap().unwrap();
        assert_eq!(payload, b"pending");
    }

    #[test]
    fn cache_get_missing_returns_none() {
        let (_dir, path) = temp_db("cache.db");
        let store = CacheStore::open(&path).unwrap();
        assert!(store.get("203.0.113.9").unwrap().is_none());
    }

    #[test]
    fn cache_put_then_get() {
        let (_dir, path) = temp_db("cache.db");
        let store = CacheStore::open(&path).unwrap();

        store.put("203.0.113.9", "High Risk 88% (CN)", 1000).unwrap();
        let (verdict, observed_at) = store.get("203.0.113.9").unwrap().unwrap();
        assert_eq!(verdict, "High Risk 88% (CN)");
        assert_eq!(observed_at, 1000);
    }

    #[test]
    fn cache_put_overwrites_existing() {
        let (_dir, path) = temp_db("cache.db");
        let store = CacheStore::open(&path).unwrap();

        store.put("203.0.113.9", "neutral", 1000).unwrap();
        store.put("203.0.113.9", "Low Risk", 2000).unwrap();
        let (verdict, observed_at) = store.get("203.0.113.9").unwrap().unwrap();
        assert_eq!(verdict, "Low Risk");
        assert_eq!(observed_at, 2000);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        /// 어떤 바이트열이든 넣은 순서 그대로, 내용 변형 없이 나와야 함
        #[test]
        fn offline_roundtrips_arbitrary_payloads(
            payloads in proptest::collection::vec(
                proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256),
                1..16,
            )
        ) {
            let (_dir, path) = temp_db("offline.db");
            let store = OfflineStore::open(&path).unwrap();
            for payload in &payloads {
                store.append(payload, 0).unwrap();
            }

            let mut drained = Vec::new();
            while let Some((id, payload)) = store.front().unwrap() {
                drained.push(payload);
                store.remove(id).unwrap();
            }
            proptest::prop_assert_eq!(drained, payloads);
        }
    }

    #[test]
    fn open_fails_on_unwritable_path() {
        let result = DedupStore::open("/nonexistent-dir-xyz/dedup.db");
        assert!(matches!(result, Err(ShipperError::Store { .. })));
    }
}
