//! Single-flight access token refresh.
//!
//! Many requests can learn at once that their access token was rejected. Only
//! one of them (the leader) calls the refresh endpoint; the others queue and
//! are released in arrival order with the leader's outcome, then replay once.
//!
//! Phases: `Idle` → `Refreshing` (one refresh in flight) → `Draining` (queue
//! being released) → `Idle`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use super::error::{AuthFailure, ClientError};

/// Performs the actual refresh round trip.
pub trait Refresher: Send + Sync {
    /// Obtain a new access token.
    fn refresh(&self) -> impl Future<Output = Result<String, AuthFailure>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
    Draining,
}

type Outcome = Result<String, AuthFailure>;

struct Inner {
    phase: Phase,
    access_token: Option<String>,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
    /// Outcome being handed out while draining
    last_outcome: Option<Outcome>,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<Outcome>),
}

/// Holds the access token of one client and serializes its refreshes.
pub struct SessionCoordinator<R> {
    refresher: R,
    inner: Mutex<Inner>,
    failures: broadcast::Sender<AuthFailure>,
}

impl<R: Refresher> SessionCoordinator<R> {
    pub fn new(refresher: R) -> Self {
        let (failures, _) = broadcast::channel(16);
        Self {
            refresher,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                access_token: None,
                waiters: VecDeque::new(),
                last_outcome: None,
            }),
            failures,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of requests waiting on the refresh in flight.
    pub fn queued(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    /// Store the access token handed out by login or registration.
    pub fn set_access_token(&self, token: String) {
        self.lock().access_token = Some(token);
    }

    /// Forget the held access token (logout).
    pub fn clear(&self) {
        self.lock().access_token = None;
    }

    /// Receive every terminal authentication failure from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthFailure> {
        self.failures.subscribe()
    }

    /// Called after a request holding `stale` got a 401.
    ///
    /// Returns the token to replay with. If the held token already differs
    /// from `stale`, it is returned without a refresh.
    pub async fn refresh_after_unauthorized(&self, stale: &str) -> Outcome {
        self.single_flight(Some(stale)).await
    }

    /// Refresh regardless of the held token, e.g. to resume a session from
    /// the refresh cookie alone. Still joins a refresh already in flight.
    pub async fn refresh_now(&self) -> Outcome {
        self.single_flight(None).await
    }

    async fn single_flight(&self, stale: Option<&str>) -> Outcome {
        let role = {
            let mut inner = self.lock();
            match inner.phase {
                Phase::Idle => {
                    if let Some(stale) = stale {
                        match inner.access_token.as_deref() {
                            None => return Err(AuthFailure::SignedOut),
                            Some(held) if held != stale => return Ok(held.to_string()),
                            Some(_) => {}
                        }
                    }
                    inner.phase = Phase::Refreshing;
                    Role::Leader
                }
                Phase::Refreshing => {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push_back(tx);
                    Role::Waiter(rx)
                }
                Phase::Draining => {
                    return inner
                        .last_outcome
                        .clone()
                        .unwrap_or(Err(AuthFailure::Interrupted));
                }
            }
        };

        match role {
            Role::Waiter(rx) => rx.await.unwrap_or(Err(AuthFailure::Interrupted)),
            Role::Leader => {
                let mut guard = LeaderGuard {
                    coordinator: self,
                    armed: true,
                };
                debug!("Refreshing access token");
                let outcome = self.refresher.refresh().await;
                guard.armed = false;
                self.finish(outcome)
            }
        }
    }

    fn finish(&self, outcome: Outcome) -> Outcome {
        let waiters = {
            let mut inner = self.lock();
            inner.phase = Phase::Draining;
            inner.access_token = outcome.as_ref().ok().cloned();
            inner.last_outcome = Some(outcome.clone());
            std::mem::take(&mut inner.waiters)
        };

        match &outcome {
            Ok(_) => debug!(waiters = waiters.len(), "Access token refreshed"),
            Err(failure) => {
                warn!(error = %failure, waiters = waiters.len(), "Access token refresh failed");
                let _ = self.failures.send(failure.clone());
            }
        }

        for waiter in waiters {
            // A waiter whose request was dropped is gone
            let _ = waiter.send(outcome.clone());
        }

        let mut inner = self.lock();
        inner.phase = Phase::Idle;
        inner.last_outcome = None;
        drop(inner);

        outcome
    }

    /// Run an authenticated request, refreshing and replaying it at most once
    /// on a 401.
    ///
    /// `op` is called with the held access token. A request sent without a
    /// token gets its 401 back as is. A second 401 after a refresh is
    /// terminal: the token is dropped and [`AuthFailure::RetryRejected`] is
    /// broadcast.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let token = self.access_token();
        let stale = match op(token.clone()).await {
            Err(e) if e.is_unauthorized() => match token {
                Some(stale) => stale,
                None => return Err(e),
            },
            other => return other,
        };

        let fresh = self.refresh_after_unauthorized(&stale).await?;

        match op(Some(fresh.clone())).await {
            Err(e) if e.is_unauthorized() => {
                warn!("Request rejected again after refresh");
                {
                    let mut inner = self.lock();
                    if inner.access_token.as_deref() == Some(fresh.as_str()) {
                        inner.access_token = None;
                    }
                }
                let _ = self.failures.send(AuthFailure::RetryRejected);
                Err(AuthFailure::RetryRejected.into())
            }
            other => other,
        }
    }
}

/// Puts the coordinator back to `Idle` if the leader is dropped mid-refresh.
/// Waiters see their sender dropped and fail with `Interrupted`.
struct LeaderGuard<'a, R> {
    coordinator: &'a SessionCoordinator<R>,
    armed: bool,
}

impl<R> Drop for LeaderGuard<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self
                .coordinator
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            inner.phase = Phase::Idle;
            inner.waiters.clear();
        }
    }
}
