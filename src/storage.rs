use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// One persisted result: the final count and green-time recommendation of a video.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CountRecord {
    pub video_id: String,
    pub vehicle_count: u64,
    pub green_time_secs: u64,
}

/// A stored record with its row id and insert time (seconds since the Unix epoch).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredCount {
    pub id: i64,
    pub recorded_at: i64,
    pub record: CountRecord,
}

pub trait CountStore {
    /// Append a record and return its row id.
    fn insert(&mut self, record: &CountRecord) -> Result<i64>;

    /// Most recent records first.
    fn recent(&mut self, limit: usize) -> Result<Vec<StoredCount>>;

    /// Latest record for a video, if it was ever counted.
    fn latest_for(&mut self, video_id: &str) -> Result<Option<StoredCount>>;
}

pub struct SqliteCountStore {
    conn: Connection,
}

impl SqliteCountStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| anyhow!("failed to open count store {}: {}", db_path, e))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS vehicle_counts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              recorded_at INTEGER NOT NULL,
              video_id TEXT NOT NULL,
              vehicle_count INTEGER NOT NULL,
              green_time_secs INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_counts_video ON vehicle_counts(video_id);
            "#,
        )?;
        Ok(())
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<StoredCount>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let vehicle_count: i64 = row.get(3)?;
            let green_time_secs: i64 = row.get(4)?;
            out.push(StoredCount {
                id: row.get(0)?,
                recorded_at: row.get(1)?,
                record: CountRecord {
                    video_id: row.get(2)?,
                    vehicle_count: u64::try_from(vehicle_count)
                        .map_err(|_| anyhow!("corrupt count store: negative vehicle_count"))?,
                    green_time_secs: u64::try_from(green_time_secs)
                        .map_err(|_| anyhow!("corrupt count store: negative green_time_secs"))?,
                },
            });
        }
        Ok(out)
    }
}

impl CountStore for SqliteCountStore {
    fn insert(&mut self, record: &CountRecord) -> Result<i64> {
        let vehicle_count = i64::try_from(record.vehicle_count)
            .map_err(|_| anyhow!("vehicle_count exceeds i64 range"))?;
        let green_time_secs = i64::try_from(record.green_time_secs)
            .map_err(|_| anyhow!("green_time_secs exceeds i64 range"))?;

        self.conn.execute(
            r#"
            INSERT INTO vehicle_counts(recorded_at, video_id, vehicle_count, green_time_secs)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![now_s()?, record.video_id, vehicle_count, green_time_secs],
        )?;
        let id = self.conn.last_insert_rowid();
        log::debug!(
            "stored count #{} for {}: {} vehicles",
            id,
            record.video_id,
            record.vehicle_count
        );
        Ok(id)
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<StoredCount>> {
        self.query(
            "SELECT id, recorded_at, video_id, vehicle_count, green_time_secs \
             FROM vehicle_counts ORDER BY id DESC LIMIT ?1",
            &[&(limit as i64)],
        )
    }

    fn latest_for(&mut self, video_id: &str) -> Result<Option<StoredCount>> {
        let mut rows = self.query(
            "SELECT id, recorded_at, video_id, vehicle_count, green_time_secs \
             FROM vehicle_counts WHERE video_id = ?1 ORDER BY id DESC LIMIT 1",
            &[&video_id],
        )?;
        Ok(rows.pop())
    }
}

/// Non-persistent store for tests and `--no-persist` dry runs.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCountStore {
    rows: Vec<StoredCount>,
}

impl CountStore for InMemoryCountStore {
    fn insert(&mut self, record: &CountRecord) -> Result<i64> {
        let id = self.rows.len() as i64 + 1;
        self.rows.push(StoredCount {
            id,
            recorded_at: now_s()?,
            record: record.clone(),
        });
        Ok(id)
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<StoredCount>> {
        Ok(self.rows.iter().rev().take(limit).cloned().collect())
    }

    fn latest_for(&mut self, video_id: &str) -> Result<Option<StoredCount>> {
        Ok(self
            .rows
            .iter()
            .rev()
            .find(|row| row.record.video_id == video_id)
            .cloned())
    }
}

fn now_s() -> Result<i64> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| anyhow!("system clock is before the Unix epoch"))?
        .as_secs();
    i64::try_from(secs).map_err(|_| anyhow!("timestamp exceeds i64 range"))
}
