//! User and device queries for the ipcmon server.

use ipcmon_core::db::unix_timestamp;

use super::db::{DatabaseError, ServerDatabase};
use super::models::{Device, DevicePatch, ProfileChanges, User, UserPatch};

impl ServerDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a new user. A taken email surfaces as `DatabaseError::Conflict`.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        avatar: &str,
    ) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO users (username, avatar, email, password_hash, registered_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(avatar)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(result.last_insert_rowid()).await
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User with email {email}")))
    }

    /// Update a single user column.
    pub async fn patch_user(&self, id: i64, patch: UserPatch) -> Result<bool, DatabaseError> {
        let query = match patch {
            UserPatch::EmailVerified(verified) => {
                sqlx::query("UPDATE users SET email_verified = ? WHERE id = ?").bind(verified)
            }
            UserPatch::Avatar(avatar) => {
                sqlx::query("UPDATE users SET avatar = ? WHERE id = ?").bind(avatar)
            }
            UserPatch::PasswordHash(hash) => {
                sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?").bind(hash)
            }
        };
        let result = query.bind(id).execute(self.pool()).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a profile edit in one statement. `email_verified` drops to false
    /// only when the email actually changes.
    pub async fn update_profile(
        &self,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<User, DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET
                email_verified = CASE WHEN ?1 IS NOT NULL AND ?1 <> email THEN 0 ELSE email_verified END,
                email = COALESCE(?1, email),
                username = COALESCE(?2, username),
                avatar = COALESCE(?3, avatar),
                password_hash = COALESCE(?4, password_hash)
             WHERE id = ?5",
        )
        .bind(changes.email.as_deref())
        .bind(changes.username.as_deref())
        .bind(changes.avatar.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {id}")));
        }
        self.get_user(id).await
    }

    /// Delete a user. Devices, telemetry and file rows cascade.
    pub async fn delete_user(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Device queries
    // =========================================================================

    /// Register a device. A token that is already bound surfaces as
    /// `DatabaseError::Conflict`.
    pub async fn create_device(
        &self,
        owner_id: i64,
        name: &str,
        token: &str,
    ) -> Result<Device, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO devices (owner_id, name, token, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(name)
        .bind(token)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_device(result.last_insert_rowid()).await
    }

    /// Get a device by ID.
    pub async fn get_device(&self, id: i64) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {id}")))
    }

    /// Find the device bound to a bearer token.
    pub async fn get_device_by_token(&self, token: &str) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE token = ?")
            .bind(token)
            .fetch_optional(self.pool())
            .await?;

        Ok(device)
    }

    /// List a user's devices, most recently seen first.
    pub async fn list_devices(&self, owner_id: i64) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE owner_id = ? ORDER BY last_seen_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(devices)
    }

    /// Update a single device column.
    pub async fn patch_device(&self, id: i64, patch: DevicePatch) -> Result<bool, DatabaseError> {
        let query = match patch {
            DevicePatch::Status(status) => {
                sqlx::query("UPDATE devices SET status = ? WHERE id = ?").bind(status)
            }
            DevicePatch::LastSeen(ts) => {
                sqlx::query("UPDATE devices SET last_seen_at = ? WHERE id = ?").bind(ts)
            }
        };
        let result = query.bind(id).execute(self.pool()).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a device and, by cascade, its telemetry.
    pub async fn delete_device(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
