//! Scheduled cleanup of expired sessions.

use crate::session::SessionService;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(sessions: &SessionService) {
    // Forget stored refresh digests whose token has expired
    match sessions.purge_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(sessions: SessionService) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&sessions).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewUser};
    use crate::jwt::{TokenIssuer, TokenLifetimes};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_cleanup_forgets_expired_sessions() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(NewUser {
                uuid: "uuid-1",
                email: "old@example.com",
                display_name: None,
                password_hash: "hash",
            })
            .await
            .unwrap();
        db.users().start_session(id, "digest", 1).await.unwrap();

        let issuer = Arc::new(TokenIssuer::new(
            b"access-secret-for-cleanup-tests!",
            b"refresh-secret-for-cleanup-tests",
            TokenLifetimes::default(),
        ));
        run_cleanup(&SessionService::new(db.clone(), issuer, true)).await;

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert!(!user.has_session());
        assert_eq!(user.token_version, 0);
    }
}
