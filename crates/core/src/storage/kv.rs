//! Key-value table access

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Key-value store over the `kv` table
pub struct KvStore<'a> {
    conn: &'a Connection,
}

impl<'a> KvStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Read a value
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a value
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete a value
    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Read several values with one prepared statement
    pub fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut stmt = self.conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = stmt
                .query_row(params![key], |row| row.get::<_, String>(0))
                .optional()?;
            values.push(value);
        }
        Ok(values)
    }

    /// Count stored keys
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_set_and_get() {
        let db = Database::open_in_memory().unwrap();
        let kv = db.kv();

        assert_eq!(kv.get("a").unwrap(), None);
        kv.set("a", "1").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_set_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let kv = db.kv();

        kv.set("a", "1").unwrap();
        kv.set("a", "2").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("2"));
        assert_eq!(kv.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let db = Database::open_in_memory().unwrap();
        let kv = db.kv();

        kv.delete("nope").unwrap();
        kv.set("a", "1").unwrap();
        kv.delete("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
    }

    #[test]
    fn test_get_many_is_positional() {
        let db = Database::open_in_memory().unwrap();
        let kv = db.kv();
        kv.set("x", "1").unwrap();
        kv.set("z", "3").unwrap();

        let keys = vec!["z".to_string(), "y".to_string(), "x".to_string()];
        let values = kv.get_many(&keys).unwrap();
        assert_eq!(values, [Some("3".to_string()), None, Some("1".to_string())]);
        assert!(kv.get_many(&[]).unwrap().is_empty());
    }
}
