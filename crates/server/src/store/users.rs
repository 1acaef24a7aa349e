//! User lookup
//!
//! Profiles are owned by the account service; this crate only reads them.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::UserProfile;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

/// Directory backed by the `users` table the account service keeps in sync
#[derive(Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or refresh a profile mirrored from the account service.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, display_name, avatar, role) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, \
             avatar = excluded.avatar, role = excluded.role",
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(&profile.avatar)
        .bind(&profile.role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row: Option<(String, String, Option<String>, String)> =
            sqlx::query_as("SELECT id, display_name, avatar, role FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, display_name, avatar, role)| UserProfile {
            id,
            display_name,
            avatar,
            role,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_pool;

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let (_dir, pool) = test_pool().await;
        let directory = SqliteUserDirectory::new(pool);

        assert!(directory.get_user_by_id("alice").await.unwrap().is_none());

        let mut alice = UserProfile {
            id: "alice".into(),
            display_name: "Alice".into(),
            avatar: None,
            role: "creator".into(),
        };
        directory.upsert(&alice).await.unwrap();
        alice.display_name = "Alice B.".into();
        directory.upsert(&alice).await.unwrap();

        let found = directory.get_user_by_id("alice").await.unwrap().unwrap();
        assert_eq!(found, alice);
    }
}
