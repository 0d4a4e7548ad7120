use crate::api::models::Session;
use crate::error::{ApiError, Result};
use directories::ProjectDirs;
use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

fn db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "virtualg", "VirtualG")?;
    let dir = proj.data_dir().to_path_buf();
    Some(dir.join("cache.sqlite"))
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Local copy of the sidebar session list so it renders before the network
/// refresh lands. The server stays authoritative: every refresh replaces
/// the whole table.
pub struct SessionCache {
    conn: Connection,
}

impl SessionCache {
    pub fn open_default() -> Result<Self> {
        let path = db_path().ok_or_else(|| ApiError::Config("no data directory".into()))?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        ensure_dir(path)?;
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Replaces the cached list, keeping the server's ordering.
    pub fn replace_all(&mut self, sessions: &[Session]) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sessions", [])?;
        for (idx, s) in sessions.iter().enumerate() {
            let raw = serde_json::to_string(s)?;
            tx.execute(
                r#"
                INSERT INTO sessions (id, position, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    position=excluded.position,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![s.id, idx as i64, now, raw],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list(&self, limit: Option<usize>) -> Result<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT raw_json FROM sessions ORDER BY position ASC LIMIT ?1")?;
        let lim = limit.unwrap_or(500) as i64;
        let rows = stmt.query_map(params![lim], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            let raw = r?;
            match serde_json::from_str::<Session>(&raw) {
                Ok(s) => out.push(s),
                Err(e) => log::warn!("dropping unreadable cached session: {e}"),
            }
        }
        Ok(out)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Used on sign-out so the next account never sees the previous list.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sessions", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, title: &str) -> Session {
        Session {
            id: id.into(),
            title: title.into(),
            last_message: String::new(),
            timestamp: "2025-01-30T10:00:00+00:00".into(),
            message_count: 0,
        }
    }

    #[test]
    fn replace_keeps_server_order_and_drops_stale_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SessionCache::open(&dir.path().join("cache.sqlite")).unwrap();

        cache.replace_all(&[session("a", "A"), session("b", "B"), session("c", "C")]).unwrap();
        cache.replace_all(&[session("c", "C2"), session("a", "A")]).unwrap();

        let ids: Vec<_> = cache.list(None).unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, ["c", "a"]);
        assert_eq!(cache.list(Some(1)).unwrap()[0].title, "C2");
    }

    #[test]
    fn remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let mut cache = SessionCache::open(&path).unwrap();
        cache.replace_all(&[session("a", "A"), session("b", "B")]).unwrap();

        cache.remove("a").unwrap();
        assert_eq!(cache.list(None).unwrap().len(), 1);

        // reopening sees persisted rows
        drop(cache);
        let cache = SessionCache::open(&path).unwrap();
        assert_eq!(cache.list(None).unwrap()[0].id, "b");
        cache.clear().unwrap();
        assert!(cache.list(None).unwrap().is_empty());
    }
}
