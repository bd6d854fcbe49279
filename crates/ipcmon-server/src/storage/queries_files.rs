//! Uploaded file records.

use ipcmon_core::db::unix_timestamp;

use super::db::{DatabaseError, ServerDatabase};
use super::models::FileRecord;

impl ServerDatabase {
    pub async fn create_file(
        &self,
        key: &str,
        origin: &str,
        size: i64,
        author_id: i64,
    ) -> Result<FileRecord, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO files (key, origin, size, author_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(origin)
        .bind(size)
        .bind(author_id)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_file(key).await
    }

    pub async fn get_file(&self, key: &str) -> Result<FileRecord, DatabaseError> {
        sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("File {key}")))
    }

    pub async fn delete_file(&self, key: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM files WHERE key = ?")
            .bind(key)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
