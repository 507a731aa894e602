use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::warn;

use super::{DataPair, DataType, Storage};

/// SQLite-backed storage; one row per (owner, category, key)
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storage (
                owner TEXT NOT NULL,
                category TEXT NOT NULL,
                key TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY(owner, category, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }
}

impl Storage for SqliteStorage {
    async fn init(&self) -> Result<(), String> {
        self.migrate()
            .await
            .map_err(|e| format!("Database error: {}", e))
    }

    async fn save(&self, owner: &str, data_type: DataType, pairs: &[DataPair]) -> Result<(), String> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| format!("Database error: {}", e))?;

        for pair in pairs {
            sqlx::query(
                r#"INSERT INTO storage (owner, category, key, data) VALUES (?, ?, ?, ?)
                ON CONFLICT(owner, category, key) DO UPDATE SET
                    data = excluded.data,
                    updated_at = CURRENT_TIMESTAMP"#,
            )
            .bind(owner)
            .bind(data_type.as_str())
            .bind(&pair.key)
            .bind(pair.data.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("Failed to save {} '{}' of {}: {}", data_type, pair.key, owner, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| format!("Database error: {}", e))
    }

    async fn load(&self, owner: &str, data_type: DataType, key: &str) -> Option<Value> {
        let row = sqlx::query("SELECT data FROM storage WHERE owner = ? AND category = ? AND key = ?")
            .bind(owner)
            .bind(data_type.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(row) => row.and_then(|r| parse(key, &r.get::<String, _>("data"))),
            Err(e) => {
                warn!("Failed to load {} '{}' of {}: {}", data_type, key, owner, e);
                None
            }
        }
    }

    async fn load_all(&self, owner: &str, data_type: DataType) -> Vec<DataPair> {
        let rows = sqlx::query("SELECT key, data FROM storage WHERE owner = ? AND category = ? ORDER BY key")
            .bind(owner)
            .bind(data_type.as_str())
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => rows
                .iter()
                .filter_map(|r| {
                    let key: String = r.get("key");
                    let data = parse(&key, &r.get::<String, _>("data"))?;
                    Some(DataPair { key, data })
                })
                .collect(),
            Err(e) => {
                warn!("Failed to load {} data of {}: {}", data_type, owner, e);
                Vec::new()
            }
        }
    }

    async fn owners(&self, data_type: DataType) -> Vec<String> {
        let rows = sqlx::query("SELECT DISTINCT owner FROM storage WHERE category = ? ORDER BY owner")
            .bind(data_type.as_str())
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => rows.iter().map(|r| r.get("owner")).collect(),
            Err(e) => {
                warn!("Failed to list {} owners: {}", data_type, e);
                Vec::new()
            }
        }
    }
}

fn parse(key: &str, raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Stored value '{}' is not valid JSON: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage(dir: &TempDir) -> SqliteStorage {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("quests.db").display());
        let storage = SqliteStorage::new(&url).await.unwrap();
        storage.init().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        let pairs = vec![
            DataPair::new("player", serde_json::json!({ "name": "Alice", "gold": 10 })),
            DataPair::new("flags", serde_json::json!(["met_elder"])),
        ];
        storage.save("alice", DataType::Player, &pairs).await.unwrap();

        let player = storage.load("alice", DataType::Player, "player").await.unwrap();
        assert_eq!(player["gold"], 10);
        assert!(storage.load("alice", DataType::Quest, "player").await.is_none());
        assert!(storage.load("bob", DataType::Player, "player").await.is_none());

        let all = storage.load_all("alice", DataType::Player).await;
        let keys: Vec<_> = all.iter().map(|pair| pair.key.as_str()).collect();
        assert_eq!(keys, vec!["flags", "player"]);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        storage
            .save("alice", DataType::Player, &[DataPair::new("player", Value::from(1))])
            .await
            .unwrap();
        storage
            .save("alice", DataType::Player, &[DataPair::new("player", Value::from(2))])
            .await
            .unwrap();
        storage
            .save("bob", DataType::Player, &[DataPair::new("player", Value::from(3))])
            .await
            .unwrap();

        assert_eq!(storage.load("alice", DataType::Player, "player").await, Some(Value::from(2)));
        assert_eq!(storage.owners(DataType::Player).await, vec!["alice", "bob"]);
        assert!(storage.owners(DataType::Area).await.is_empty());
    }

    #[tokio::test]
    async fn test_data_survives_reconnect() {
        let dir = TempDir::new().unwrap();
        {
            let storage = storage(&dir).await;
            storage
                .save("quest-1", DataType::Quest, &[DataPair::new("quest", Value::from("image"))])
                .await
                .unwrap();
        }

        let storage = storage(&dir).await;
        assert_eq!(
            storage.load("quest-1", DataType::Quest, "quest").await,
            Some(Value::from("image"))
        );
    }
}
