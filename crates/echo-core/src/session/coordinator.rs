//! Session lifecycle on top of the hybrid store.
//!
//! Every operation on one session id runs under that id's lock, so two
//! touches can never interleave their read-modify-write cycles. Idle
//! timeouts are applied lazily when a session is read.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use echo_types::error::SessionError;
use echo_types::session::{Session, SessionState};

use crate::store::{HybridStore, Namespace, RemoteCache};
use crate::sync::KeyedLocks;

/// Owns session records; the store only holds their JSON.
pub struct SessionCoordinator<R> {
    store: Arc<HybridStore<R>>,
    locks: KeyedLocks,
    idle_timeout: Duration,
    ended_retention: Duration,
}

impl<R: RemoteCache> SessionCoordinator<R> {
    pub fn new(store: Arc<HybridStore<R>>, idle_timeout: Duration, ended_retention: Duration) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            idle_timeout,
            ended_retention,
        }
    }

    /// Start a session, or return the live one already stored under `id`.
    ///
    /// An ended or idle-expired record is replaced by a fresh `Pending`
    /// session.
    pub async fn start_session(
        &self,
        id: &str,
        participant_ids: [String; 2],
    ) -> Result<Session, SessionError> {
        validate_id(id)?;
        if participant_ids.iter().any(|p| p.trim().is_empty()) {
            return Err(SessionError::Validation(
                "participant ids must not be empty".to_string(),
            ));
        }

        let _guard = self.locks.lock(id).await;

        if let Some(existing) = self.load_live(id).await? {
            if !existing.is_ended() {
                tracing::debug!(session_id = id, state = %existing.state, "Session already started");
                return Ok(existing);
            }
        }

        let session = Session::new(id, participant_ids);
        self.save(&session, self.record_ttl()).await?;
        tracing::info!(session_id = id, "Session started");
        Ok(session)
    }

    /// The stored session, or `None` when unknown or idle-expired.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>, SessionError> {
        validate_id(id)?;
        let _guard = self.locks.lock(id).await;
        self.load_live(id).await
    }

    /// Record activity: bump `last_activity_at` and promote `Pending` to
    /// `Active`.
    pub async fn touch(&self, id: &str) -> Result<Session, SessionError> {
        validate_id(id)?;
        let _guard = self.locks.lock(id).await;

        let mut session = self.load_live(id).await?.ok_or(SessionError::NotFound)?;
        if !session.state.can_transition_to(SessionState::Active) {
            return Err(SessionError::Ended(id.to_string()));
        }

        session.last_activity_at = Utc::now().max(session.last_activity_at);
        if session.state == SessionState::Pending {
            session.state = SessionState::Active;
            tracing::debug!(session_id = id, "Session active");
        }

        self.save(&session, self.record_ttl()).await?;
        Ok(session)
    }

    /// Mark the session `Ended`. Ending an ended session is a no-op.
    ///
    /// The ended record is kept for the retention window so later reads see
    /// the terminal state.
    pub async fn end_session(&self, id: &str) -> Result<Session, SessionError> {
        validate_id(id)?;
        let _guard = self.locks.lock(id).await;

        let mut session = self.load(id).await?.ok_or(SessionError::NotFound)?;
        if session.is_ended() {
            return Ok(session);
        }

        session.state = SessionState::Ended;
        self.save(&session, self.ended_retention).await?;
        tracing::info!(session_id = id, "Session ended");
        Ok(session)
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        Ok(self.store.get_json(Namespace::Session, id).await?)
    }

    /// Load and apply the idle rule. Caller holds the id lock.
    async fn load_live(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let Some(session) = self.load(id).await? else {
            return Ok(None);
        };

        if !session.is_ended() && session.is_idle(Utc::now(), self.idle_limit()) {
            tracing::info!(
                session_id = id,
                idle_timeout_secs = self.idle_timeout.as_secs(),
                "Session ended after idle timeout"
            );
            self.store.delete(Namespace::Session, id).await;
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn save(&self, session: &Session, ttl: Duration) -> Result<(), SessionError> {
        self.store
            .set_json(Namespace::Session, &session.id, session, Some(ttl))
            .await?;
        Ok(())
    }

    fn idle_limit(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.idle_timeout).unwrap_or(chrono::Duration::MAX)
    }

    /// Live records outlast the idle window so expiry is observed on read
    /// rather than by the record silently vanishing.
    fn record_ttl(&self) -> Duration {
        self.idle_timeout.saturating_mul(2)
    }
}

fn validate_id(id: &str) -> Result<(), SessionError> {
    if id.trim().is_empty() {
        return Err(SessionError::Validation("sessionId is required".to_string()));
    }
    Ok(())
}

impl<R> std::fmt::Debug for SessionCoordinator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("idle_timeout", &self.idle_timeout)
            .field("ended_retention", &self.ended_retention)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreMode;
    use crate::store::hybrid::tests::FakeRemote;

    fn participants() -> [String; 2] {
        ["alice".to_string(), "bob".to_string()]
    }

    fn coordinator(idle: Duration) -> SessionCoordinator<FakeRemote> {
        let store = Arc::new(HybridStore::local_only("t:"));
        SessionCoordinator::new(store, idle, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let sessions = coordinator(Duration::from_secs(60));

        let first = sessions.start_session("s1", participants()).await.unwrap();
        let second = sessions
            .start_session("s1", ["carol".to_string(), "dave".to_string()])
            .await
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.participant_ids, participants());
        assert_eq!(second.state, SessionState::Pending);
    }

    #[tokio::test]
    async fn touch_promotes_pending_to_active() {
        let sessions = coordinator(Duration::from_secs(60));
        let started = sessions.start_session("s1", participants()).await.unwrap();

        let touched = sessions.touch("s1").await.unwrap();

        assert_eq!(touched.state, SessionState::Active);
        assert!(touched.last_activity_at >= started.last_activity_at);
        let stored = sessions.get_session("s1").await.unwrap().unwrap();
        assert_eq!(stored, touched);
    }

    #[tokio::test]
    async fn touch_unknown_session_is_not_found() {
        let sessions = coordinator(Duration::from_secs(60));
        let err = sessions.touch("ghost").await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn ended_session_rejects_touch_and_is_replaced_on_start() {
        let sessions = coordinator(Duration::from_secs(60));
        let original = sessions.start_session("s1", participants()).await.unwrap();

        let ended = sessions.end_session("s1").await.unwrap();
        assert_eq!(ended.state, SessionState::Ended);
        assert!(matches!(sessions.touch("s1").await, Err(SessionError::Ended(_))));

        let stored = sessions.get_session("s1").await.unwrap().unwrap();
        assert!(stored.is_ended());

        let restarted = sessions.start_session("s1", participants()).await.unwrap();
        assert_eq!(restarted.state, SessionState::Pending);
        assert!(restarted.created_at >= original.created_at);
    }

    #[tokio::test]
    async fn ending_twice_is_a_noop() {
        let sessions = coordinator(Duration::from_secs(60));
        sessions.start_session("s1", participants()).await.unwrap();
        let first = sessions.end_session("s1").await.unwrap();
        let second = sessions.end_session("s1").await.unwrap();
        assert_eq!(first, second);
        assert!(matches!(sessions.end_session("ghost").await, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn idle_session_reads_as_absent() {
        let sessions = coordinator(Duration::from_millis(30));
        sessions.start_session("s1", participants()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(sessions.get_session("s1").await.unwrap().is_none());
        assert!(matches!(sessions.touch("s1").await, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn blank_ids_are_rejected() {
        let sessions = coordinator(Duration::from_secs(60));
        assert!(matches!(
            sessions.start_session(" ", participants()).await,
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            sessions
                .start_session("s1", ["alice".to_string(), String::new()])
                .await,
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(sessions.touch("").await, Err(SessionError::Validation(_))));
    }

    #[tokio::test]
    async fn sessions_survive_remote_outage() {
        let remote = FakeRemote::default();
        remote.set_reachable(false);
        let store = Arc::new(HybridStore::new(
            Some(remote.clone()),
            "t:",
            Duration::from_millis(50),
        ));
        let sessions = SessionCoordinator::new(
            Arc::clone(&store),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );

        sessions.start_session("s1", participants()).await.unwrap();
        let touched = sessions.touch("s1").await.unwrap();
        let read = sessions.get_session("s1").await.unwrap().unwrap();

        assert_eq!(store.mode(), StoreMode::Local);
        assert_eq!(read, touched);
    }

    #[tokio::test]
    async fn concurrent_touches_keep_activity_monotonic() {
        let sessions = Arc::new(coordinator(Duration::from_secs(60)));
        sessions.start_session("s1", participants()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sessions = Arc::clone(&sessions);
            handles.push(tokio::spawn(async move { sessions.touch("s1").await.unwrap() }));
        }
        let mut latest = None;
        for handle in handles {
            let touched = handle.await.unwrap();
            latest = latest.max(Some(touched.last_activity_at));
        }

        let stored = sessions.get_session("s1").await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Active);
        assert_eq!(Some(stored.last_activity_at), latest);
    }
}
