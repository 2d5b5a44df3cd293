//! User records, which double as the credential store for sessions.
//!
//! Each user row holds at most one live session: the hash of the currently
//! valid refresh token plus a token version that is bumped on revocation.

use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role, reported by `/auth/me`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub refresh_token_hash: Option<String>,
    pub refresh_expires_at: Option<i64>,
    pub token_version: i64,
}

impl User {
    /// Whether a refresh token is currently accepted for this user.
    pub fn has_session(&self) -> bool {
        self.refresh_token_hash.is_some()
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub email: &'a str,
    pub display_name: Option<&'a str>,
    pub password_hash: &'a str,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    email: String,
    display_name: Option<String>,
    password_hash: String,
    role: String,
    refresh_token_hash: Option<String>,
    refresh_expires_at: Option<i64>,
    token_version: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            display_name: row.display_name,
            password_hash: row.password_hash,
            role: UserRole::from_str(&row.role),
            refresh_token_hash: row.refresh_token_hash,
            refresh_expires_at: row.refresh_expires_at,
            token_version: row.token_version,
        }
    }
}

const SELECT_BY_EMAIL: &str = "SELECT id, uuid, email, display_name, password_hash, role, \
     refresh_token_hash, refresh_expires_at, token_version FROM users WHERE email = ?";

const SELECT_BY_UUID: &str = "SELECT id, uuid, email, display_name, password_hash, role, \
     refresh_token_hash, refresh_expires_at, token_version FROM users WHERE uuid = ?";

const SELECT_BY_ID: &str = "SELECT id, uuid, email, display_name, password_hash, role, \
     refresh_token_hash, refresh_expires_at, token_version FROM users WHERE id = ?";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user without a session. Returns the user ID.
    pub async fn create(&self, user: NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, email, display_name, password_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(user.uuid)
        .bind(user.email)
        .bind(user.display_name)
        .bind(user.password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by e-mail (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(SELECT_BY_EMAIL)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID (the token subject).
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(SELECT_BY_UUID)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(SELECT_BY_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: i64, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the refresh hash of a freshly opened session, replacing any previous one.
    pub async fn start_session(
        &self,
        id: i64,
        refresh_hash: &str,
        expires_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_hash = ?, refresh_expires_at = ? WHERE id = ?",
        )
        .bind(refresh_hash)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored refresh hash, but only if it still equals `expected_hash`.
    ///
    /// Returns false when another rotation or a revocation got there first.
    /// With `expected_version` set, the token version must also still match.
    pub async fn rotate_session(
        &self,
        id: i64,
        expected_hash: &str,
        expected_version: Option<i64>,
        new_hash: &str,
        expires_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_hash = ?, refresh_expires_at = ?
             WHERE id = ? AND refresh_token_hash = ? AND (? IS NULL OR token_version = ?)",
        )
        .bind(new_hash)
        .bind(expires_at)
        .bind(id)
        .bind(expected_hash)
        .bind(expected_version)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear the session and bump the token version. Returns the new version.
    pub async fn revoke_sessions(&self, id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            "UPDATE users SET refresh_token_hash = NULL, refresh_expires_at = NULL,
             token_version = token_version + 1
             WHERE id = ? RETURNING token_version",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Drop stored sessions whose refresh token expired before `now` (Unix seconds).
    /// The token version is left alone: an expired token is already unusable.
    pub async fn clear_expired_sessions(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token_hash = NULL, refresh_expires_at = NULL
             WHERE refresh_token_hash IS NOT NULL AND refresh_expires_at < ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Whether a storage error is a uniqueness violation (e.g. duplicate e-mail).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    use super::*;

    async fn store_with_user() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(NewUser {
                uuid: "uuid-1",
                email: "bob@example.com",
                display_name: None,
                password_hash: "hash",
            })
            .await
            .unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn test_start_session_sets_hash() {
        let (db, id) = store_with_user().await;

        assert!(db.users().start_session(id, "h1", 100).await.unwrap());

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.refresh_token_hash.as_deref(), Some("h1"));
        assert_eq!(user.refresh_expires_at, Some(100));
        assert!(user.has_session());
    }

    #[tokio::test]
    async fn test_rotate_requires_expected_hash() {
        let (db, id) = store_with_user().await;
        db.users().start_session(id, "h1", 100).await.unwrap();

        assert!(
            db.users()
                .rotate_session(id, "h1", None, "h2", 200)
                .await
                .unwrap()
        );
        // h1 is gone, so a second swap from it fails
        assert!(
            !db.users()
                .rotate_session(id, "h1", None, "h3", 300)
                .await
                .unwrap()
        );

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.refresh_token_hash.as_deref(), Some("h2"));
        assert_eq!(user.refresh_expires_at, Some(200));
    }

    #[tokio::test]
    async fn test_rotate_checks_version_when_given() {
        let (db, id) = store_with_user().await;
        db.users().start_session(id, "h1", 100).await.unwrap();

        assert!(
            !db.users()
                .rotate_session(id, "h1", Some(7), "h2", 200)
                .await
                .unwrap()
        );
        assert!(
            db.users()
                .rotate_session(id, "h1", Some(0), "h2", 200)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_revoke_clears_and_bumps_version() {
        let (db, id) = store_with_user().await;
        db.users().start_session(id, "h1", 100).await.unwrap();

        assert_eq!(db.users().revoke_sessions(id).await.unwrap(), Some(1));
        assert_eq!(db.users().revoke_sessions(id).await.unwrap(), Some(2));

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert!(user.refresh_token_hash.is_none());
        assert!(user.refresh_expires_at.is_none());
        assert_eq!(user.token_version, 2);
    }

    #[tokio::test]
    async fn test_revoke_unknown_user() {
        let (db, _) = store_with_user().await;
        assert_eq!(db.users().revoke_sessions(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_expired_sessions() {
        let (db, id) = store_with_user().await;
        db.users().start_session(id, "h1", 100).await.unwrap();

        assert_eq!(db.users().clear_expired_sessions(50).await.unwrap(), 0);
        assert_eq!(db.users().clear_expired_sessions(101).await.unwrap(), 1);

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert!(!user.has_session());
        assert_eq!(user.token_version, 0);
    }

    #[tokio::test]
    async fn test_duplicate_is_unique_violation() {
        let (db, _) = store_with_user().await;
        let err = db
            .users()
            .create(NewUser {
                uuid: "uuid-2",
                email: "bob@example.com",
                display_name: None,
                password_hash: "hash",
            })
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
