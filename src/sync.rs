//! Mirrors the signed-in user's profile into a watch channel.
//!
//! State is owned by a [`ProfileSync`] and published through
//! `tokio::sync::watch`; consumers hold a receiver instead of reading a global.
//! `run` polls the store on an interval and backs off while the store fails.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::models::{Session, UserProfile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    /// No session.
    #[default]
    Idle,
    /// Signed in, profile not fetched yet.
    Pending,
    Live,
    /// Signed in but the profile document does not exist.
    Missing,
    /// The last fetch failed; `profile` holds the last known copy.
    Unavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub profile: Option<UserProfile>,
    pub status: SyncStatus,
}

pub trait ProfileSource {
    fn session(&self, token: &str) -> Result<Option<Session>>;
    fn fetch_profile(&self, user_id: i64) -> Result<Option<UserProfile>>;
}

impl ProfileSource for Mutex<Database> {
    fn session(&self, token: &str) -> Result<Option<Session>> {
        self.lock().unwrap_or_else(|e| e.into_inner()).get_session(token)
    }

    fn fetch_profile(&self, user_id: i64) -> Result<Option<UserProfile>> {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_profile(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub interval: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max: (interval * 32).max(Duration::from_secs(60)),
        }
    }

    /// Wait before the next poll after `failures` consecutive errors.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
        self.interval.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Unchanged,
    Updated,
    SignedOut,
    Failed,
}

pub struct ProfileSync {
    tx: watch::Sender<AuthState>,
    failures: u32,
}

impl Default for ProfileSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileSync {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self { tx, failures: 0 }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn signed_in(&mut self, session: Session) {
        info!(user_id = session.user_id, "Session attached");
        self.failures = 0;
        self.tx.send_replace(AuthState {
            session: Some(session),
            profile: None,
            status: SyncStatus::Pending,
        });
    }

    pub fn signed_out(&mut self) {
        info!("Session cleared");
        self.failures = 0;
        self.tx.send_replace(AuthState::default());
    }

    /// Revalidate the session and refetch its profile, publishing any change.
    pub fn poll_once(&mut self, source: &impl ProfileSource) -> PollOutcome {
        let Some(session) = self.tx.borrow().session.clone() else {
            return PollOutcome::Idle;
        };

        let fetched = source.session(&session.token).and_then(|live| match live {
            Some(live) => source.fetch_profile(live.user_id).map(Some),
            None => Ok(None),
        });

        match fetched {
            Ok(None) => {
                info!(user_id = session.user_id, "Session ended remotely");
                self.signed_out();
                PollOutcome::SignedOut
            }
            Ok(Some(profile)) => {
                self.failures = 0;
                let status = if profile.is_some() {
                    SyncStatus::Live
                } else {
                    SyncStatus::Missing
                };
                let changed = self.tx.send_if_modified(|state| {
                    if state.profile == profile && state.status == status {
                        return false;
                    }
                    state.profile = profile;
                    state.status = status;
                    true
                });
                if changed {
                    debug!(user_id = session.user_id, "Profile updated");
                    PollOutcome::Updated
                } else {
                    PollOutcome::Unchanged
                }
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                warn!(error = %e, failures = self.failures, "Profile fetch failed");
                let status = SyncStatus::Unavailable(e.to_string());
                self.tx.send_if_modified(|state| {
                    if state.status == status {
                        return false;
                    }
                    state.status = status;
                    true
                });
                PollOutcome::Failed
            }
        }
    }

    /// Poll until `shutdown` resolves or the session ends.
    pub async fn run<S, F>(mut self, source: Arc<S>, policy: BackoffPolicy, shutdown: F) -> Self
    where
        S: ProfileSource + Send + Sync + 'static,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            match self.poll_once(source.as_ref()) {
                PollOutcome::Idle | PollOutcome::SignedOut => break,
                _ => {}
            }
            let delay = policy.delay(self.failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => break,
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Auth;
    use crate::db::test_support::db;
    use crate::error::AppError;
    use crate::models::ProfileUpdate;
    use std::collections::VecDeque;

    struct Scripted {
        session: Session,
        profiles: Mutex<VecDeque<Result<Option<UserProfile>>>>,
    }

    impl ProfileSource for Scripted {
        fn session(&self, _token: &str) -> Result<Option<Session>> {
            Ok(Some(self.session.clone()))
        }

        fn fetch_profile(&self, _user_id: i64) -> Result<Option<UserProfile>> {
            self.profiles
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    fn session() -> Session {
        Session {
            token: "t".to_string(),
            user_id: 1,
            created_at: String::new(),
            expires_at: String::new(),
        }
    }

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            id: 1,
            email: "a@b.co".to_string(),
            display_name: name.to_string(),
            phone: None,
            country: None,
            city: None,
            category_id: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            interval: Duration::from_millis(100),
            max: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(10), Duration::from_secs(1));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn errors_are_not_mistaken_for_missing_profile() {
        let source = Scripted {
            session: session(),
            profiles: Mutex::new(VecDeque::from([
                Ok(Some(profile("Amal"))),
                Err(AppError::Storage(rusqlite::Error::InvalidQuery)),
                Ok(None),
            ])),
        };
        let mut sync = ProfileSync::new();
        assert_eq!(sync.poll_once(&source), PollOutcome::Idle);

        sync.signed_in(session());
        assert_eq!(sync.state().status, SyncStatus::Pending);

        assert_eq!(sync.poll_once(&source), PollOutcome::Updated);
        assert_eq!(sync.state().status, SyncStatus::Live);

        assert_eq!(sync.poll_once(&source), PollOutcome::Failed);
        let state = sync.state();
        assert!(matches!(state.status, SyncStatus::Unavailable(_)));
        assert_eq!(state.profile.unwrap().display_name, "Amal");
        assert_eq!(sync.failures(), 1);

        assert_eq!(sync.poll_once(&source), PollOutcome::Updated);
        assert_eq!(sync.state().status, SyncStatus::Missing);
        assert!(sync.state().profile.is_none());
        assert_eq!(sync.failures(), 0);
    }

    #[test]
    fn unchanged_profile_is_not_republished() {
        let source = Scripted {
            session: session(),
            profiles: Mutex::new(VecDeque::from([
                Ok(Some(profile("Amal"))),
                Ok(Some(profile("Amal"))),
            ])),
        };
        let mut sync = ProfileSync::new();
        sync.signed_in(session());
        let mut rx = sync.subscribe();
        rx.mark_unchanged();

        assert_eq!(sync.poll_once(&source), PollOutcome::Updated);
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();
        assert_eq!(sync.poll_once(&source), PollOutcome::Unchanged);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn sign_out_clears_everything() {
        let mut sync = ProfileSync::new();
        sync.signed_in(session());
        sync.signed_out();
        assert_eq!(sync.state(), AuthState::default());
    }

    #[tokio::test]
    async fn run_mirrors_profile_edits_and_stops_on_revocation() {
        let db = db();
        let session = Auth::new(&db, 1)
            .sign_up("rana@example.com", "password123", "Rana")
            .unwrap();
        let store = Arc::new(Mutex::new(db));

        let mut sync = ProfileSync::new();
        sync.signed_in(session.clone());
        let rx = sync.subscribe();

        let policy = BackoffPolicy::new(Duration::from_millis(10));
        let task = tokio::spawn(sync.run(store.clone(), policy, std::future::pending()));

        let wait_for = |rx: &watch::Receiver<AuthState>, name: &'static str| {
            let mut rx = rx.clone();
            async move {
                tokio::time::timeout(
                    Duration::from_secs(5),
                    rx.wait_for(|s| s.profile.as_ref().is_some_and(|p| p.display_name == name)),
                )
                .await
                .expect("profile update in time")
                .expect("sender alive")
                .clone()
            }
        };

        let first = wait_for(&rx, "Rana").await;
        assert_eq!(first.status, SyncStatus::Live);

        store
            .lock()
            .unwrap()
            .update_profile(
                session.user_id,
                &ProfileUpdate {
                    display_name: Some("Rana K.".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        wait_for(&rx, "Rana K.").await;

        store.lock().unwrap().delete_session(&session.token).unwrap();
        let sync = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("run stops after revocation")
            .unwrap();
        assert_eq!(sync.state(), AuthState::default());
    }
}
