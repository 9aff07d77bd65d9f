//! Tracks outstanding asynchronous query completions by id, with per-entry
//! timeout expiry.
//!
//! Workers complete entries at most once; callers poll or await by query id.
//! Expired entries are never delivered as successful results and are
//! reclaimed by a periodic sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::SqlDispatchError;
use crate::query::QueryOutcome;

/// How often the background sweeper looks for expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

enum PendingState {
    Waiting,
    Complete(QueryOutcome),
    Expired,
}

struct PendingEntry {
    registered_at: Instant,
    timeout: Duration,
    state: PendingState,
    notify: Arc<Notify>,
}

impl PendingEntry {
    fn expired_now(&self, now: Instant) -> bool {
        matches!(self.state, PendingState::Waiting)
            && now.duration_since(self.registered_at) > self.timeout
    }
}

/// Status a caller observes when polling for a result.
#[derive(Debug)]
pub enum ResultStatus {
    /// Not completed yet and not expired.
    Pending,
    /// Completed; the outcome payload.
    Complete(QueryOutcome),
    /// Timed out before completion.
    Expired,
}

/// Registry of pending query results keyed by query id.
pub struct PendingResultManager {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl Default for PendingResultManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingResultManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending result and start its timeout clock.
    ///
    /// # Errors
    /// Returns `ParameterError` for an empty id, `DuplicateQueryId` when the
    /// id is already registered.
    pub fn register(&self, query_id: &str, timeout: Duration) -> Result<(), SqlDispatchError> {
        if query_id.is_empty() {
            return Err(SqlDispatchError::ParameterError(
                "query id must not be empty".into(),
            ));
        }
        let mut entries = self.lock_entries();
        if entries.contains_key(query_id) {
            return Err(SqlDispatchError::DuplicateQueryId(query_id.to_owned()));
        }
        entries.insert(
            query_id.to_owned(),
            PendingEntry {
                registered_at: Instant::now(),
                timeout,
                state: PendingState::Waiting,
                notify: Arc::new(Notify::new()),
            },
        );
        debug!(query_id = %query_id, timeout_secs = timeout.as_secs(), "pending result registered");
        Ok(())
    }

    /// Remove a registration outright (submission-failure unwind). Returns
    /// whether an entry existed.
    pub fn unregister(&self, query_id: &str) -> bool {
        self.lock_entries().remove(query_id).is_some()
    }

    /// Set the result payload for a registered entry, exactly once.
    ///
    /// # Errors
    /// `NotRegistered` for unknown ids, `ResultExpired` when the timeout
    /// elapsed first (the entry stays expired), `ExecutionError` on a second
    /// completion attempt.
    pub fn complete(
        &self,
        query_id: &str,
        outcome: QueryOutcome,
    ) -> Result<(), SqlDispatchError> {
        let mut entries = self.lock_entries();
        let entry = entries
            .get_mut(query_id)
            .ok_or_else(|| SqlDispatchError::NotRegistered(query_id.to_owned()))?;

        if entry.expired_now(Instant::now()) {
            entry.state = PendingState::Expired;
            entry.notify.notify_one();
            warn!(query_id = %query_id, "completion arrived after expiry; result dropped");
            return Err(SqlDispatchError::ResultExpired(query_id.to_owned()));
        }

        if matches!(entry.state, PendingState::Complete(_)) {
            return Err(SqlDispatchError::ExecutionError(format!(
                "result for '{query_id}' was already completed"
            )));
        }
        if matches!(entry.state, PendingState::Expired) {
            return Err(SqlDispatchError::ResultExpired(query_id.to_owned()));
        }
        entry.state = PendingState::Complete(outcome);
        entry.notify.notify_one();
        Ok(())
    }

    /// Non-consuming status check; transitions a timed-out entry to Expired.
    #[must_use]
    pub fn poll(&self, query_id: &str) -> Option<ResultStatus> {
        let mut entries = self.lock_entries();
        let entry = entries.get_mut(query_id)?;
        if entry.expired_now(Instant::now()) {
            entry.state = PendingState::Expired;
            entry.notify.notify_one();
        }
        Some(match &entry.state {
            PendingState::Waiting => ResultStatus::Pending,
            PendingState::Complete(outcome) => ResultStatus::Complete(outcome.clone()),
            PendingState::Expired => ResultStatus::Expired,
        })
    }

    /// Retrieve-and-remove. Completed and expired entries leave the registry;
    /// a pending entry stays.
    #[must_use]
    pub fn take(&self, query_id: &str) -> Option<ResultStatus> {
        let mut entries = self.lock_entries();
        let still_pending = {
            let entry = entries.get_mut(query_id)?;
            if entry.expired_now(Instant::now()) {
                entry.state = PendingState::Expired;
                entry.notify.notify_one();
            }
            matches!(entry.state, PendingState::Waiting)
        };
        if still_pending {
            return Some(ResultStatus::Pending);
        }
        match entries.remove(query_id)?.state {
            PendingState::Complete(outcome) => Some(ResultStatus::Complete(outcome)),
            PendingState::Expired => Some(ResultStatus::Expired),
            PendingState::Waiting => None,
        }
    }

    /// Await completion of a registered entry, bounded by its timeout.
    ///
    /// # Errors
    /// `NotRegistered` for unknown ids, `ResultExpired` when the timeout
    /// elapses first.
    pub async fn wait(&self, query_id: &str) -> Result<QueryOutcome, SqlDispatchError> {
        loop {
            let still_waiting = {
                let mut entries = self.lock_entries();
                let now = Instant::now();
                let waiting = {
                    let entry = entries
                        .get_mut(query_id)
                        .ok_or_else(|| SqlDispatchError::NotRegistered(query_id.to_owned()))?;
                    if entry.expired_now(now) {
                        entry.state = PendingState::Expired;
                    }
                    match &entry.state {
                        PendingState::Waiting => {
                            let deadline = entry.registered_at + entry.timeout;
                            Some((
                                Arc::clone(&entry.notify),
                                deadline.saturating_duration_since(now),
                            ))
                        }
                        _ => None,
                    }
                };
                if waiting.is_none() {
                    return match entries.remove(query_id).map(|entry| entry.state) {
                        Some(PendingState::Complete(outcome)) => Ok(outcome),
                        _ => Err(SqlDispatchError::ResultExpired(query_id.to_owned())),
                    };
                }
                waiting
            };

            if let Some((notify, remaining)) = still_waiting {
                // A completion between the lock release and this await is
                // caught by the permit notify_one stores.
                let _ = tokio::time::timeout(remaining, notify.notified()).await;
            }
        }
    }

    /// Drop every entry whose timeout elapsed; called by the sweeper.
    /// Entries still being waited on are marked expired first so waiters
    /// observe the transition before removal on a later pass.
    pub fn reclaim_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let mut reclaimed = 0;

        for entry in entries.values_mut() {
            if entry.expired_now(now) {
                entry.state = PendingState::Expired;
                entry.notify.notify_one();
            }
        }
        entries.retain(|query_id, entry| {
            if matches!(entry.state, PendingState::Expired) {
                debug!(query_id = %query_id, "reclaimed expired pending result");
                reclaimed += 1;
                false
            } else {
                true
            }
        });
        reclaimed
    }

    /// Number of tracked entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock_entries().len()
    }

    /// Spawn the periodic expiry sweeper. Call once at startup.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.reclaim_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str) -> QueryOutcome {
        QueryOutcome::succeeded(id, None, 1, Duration::from_millis(1))
    }

    #[test]
    fn duplicate_registration_fails() {
        let manager = PendingResultManager::new();
        manager.register("q1", Duration::from_secs(5)).unwrap();
        assert!(matches!(
            manager.register("q1", Duration::from_secs(5)),
            Err(SqlDispatchError::DuplicateQueryId(_))
        ));
    }

    #[test]
    fn empty_id_is_rejected() {
        let manager = PendingResultManager::new();
        assert!(manager.register("", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn completion_is_at_most_once() {
        let manager = PendingResultManager::new();
        manager.register("q1", Duration::from_secs(5)).unwrap();
        manager.complete("q1", outcome("q1")).unwrap();
        assert!(manager.complete("q1", outcome("q1")).is_err());
    }

    #[test]
    fn completion_for_unknown_id_fails() {
        let manager = PendingResultManager::new();
        assert!(matches!(
            manager.complete("missing", outcome("missing")),
            Err(SqlDispatchError::NotRegistered(_))
        ));
    }

    #[test]
    fn take_removes_completed_entries() {
        let manager = PendingResultManager::new();
        manager.register("q1", Duration::from_secs(5)).unwrap();
        manager.complete("q1", outcome("q1")).unwrap();

        match manager.take("q1") {
            Some(ResultStatus::Complete(o)) => assert!(o.success),
            other => panic!("expected completed outcome, got {other:?}"),
        }
        assert_eq!(manager.count(), 0);
        assert!(manager.take("q1").is_none());
    }

    #[test]
    fn expiry_blocks_late_completion() {
        let manager = PendingResultManager::new();
        manager.register("q1", Duration::from_millis(0)).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert!(matches!(
            manager.complete("q1", outcome("q1")),
            Err(SqlDispatchError::ResultExpired(_))
        ));
        assert!(matches!(manager.poll("q1"), Some(ResultStatus::Expired)));
    }

    #[test]
    fn sweeper_reclaims_expired_entries() {
        let manager = PendingResultManager::new();
        manager.register("q1", Duration::from_millis(0)).unwrap();
        manager.register("q2", Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(manager.reclaim_expired(), 1);
        assert_eq!(manager.count(), 1);
        assert!(manager.poll("q2").is_some());
    }

    #[tokio::test]
    async fn wait_returns_completed_outcome() {
        let manager = Arc::new(PendingResultManager::new());
        manager.register("q1", Duration::from_secs(5)).unwrap();

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.wait("q1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.complete("q1", outcome("q1")).unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert!(result.success);
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn wait_times_out_as_expired() {
        let manager = PendingResultManager::new();
        manager.register("q1", Duration::from_millis(30)).unwrap();
        let err = manager.wait("q1").await;
        assert!(matches!(err, Err(SqlDispatchError::ResultExpired(_))));
    }
}
