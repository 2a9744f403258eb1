//! Search execution driven by debouncer events.
//!
//! A [`SearchSession`] turns [`SearchEvent`]s into calls on a
//! [`SearchProvider`] and publishes the resulting [`SearchOutcome`]. Every
//! request gets a sequence number; a response whose number is no longer the
//! latest is discarded, so a slow older search never overwrites a newer one.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::debounce::SearchEvent;
use crate::error::SearchError;
use crate::scheduler::{ScheduledTask, TaskScope};

/// Search execution collaborator.
#[async_trait]
pub trait SearchProvider<T>: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<T>, SearchError>;
}

#[async_trait]
impl<T, P> SearchProvider<T> for Arc<P>
where
    P: SearchProvider<T> + ?Sized,
{
    async fn search(&self, query: &str) -> Result<Vec<T>, SearchError> {
        <P as SearchProvider<T>>::search(&**self, query).await
    }
}

/// What the consumer should show for the search field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchOutcome<T> {
    /// No committed query; show the browse list
    Idle,
    Loading { query: String },
    Ready { query: String, results: Vec<T> },
    Failed { query: String, error: SearchError },
}

impl<T> SearchOutcome<T> {
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Loading { query } | Self::Ready { query, .. } | Self::Failed { query, .. } => {
                Some(query)
            }
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

/// Called with each outcome before it is published.
pub type OutcomeSink<T> = Arc<dyn Fn(&SearchOutcome<T>) + Send + Sync>;

#[derive(Default)]
struct SessionState {
    last_query: Option<String>,
    request: u64,
    events_handled: u64,
    disposed: bool,
}

struct SessionShared<T> {
    state: Mutex<SessionState>,
    outcome: watch::Sender<SearchOutcome<T>>,
    sink: Option<OutcomeSink<T>>,
}

impl<T> SessionShared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, outcome: SearchOutcome<T>) {
        if let Some(sink) = &self.sink {
            sink(&outcome);
        }
        self.outcome.send_replace(outcome);
    }

    fn finish(&self, request: u64, query: String, result: Result<Vec<T>, SearchError>) {
        let state = self.lock();
        if state.disposed || state.request != request {
            tracing::trace!(query = %query, request, latest = state.request, "Stale search response discarded");
            return;
        }
        let outcome = match result {
            Ok(results) => {
                tracing::debug!(query = %query, request, results = results.len(), "Search ready");
                SearchOutcome::Ready { query, results }
            }
            Err(error) => {
                tracing::debug!(query = %query, request, error = %error, "Search failed");
                SearchOutcome::Failed { query, error }
            }
        };
        self.publish(outcome);
    }
}

/// Runs committed queries against a provider.
///
/// Clones share the same session.
pub struct SearchSession<T, P> {
    provider: Arc<P>,
    scope: TaskScope,
    shared: Arc<SessionShared<T>>,
}

impl<T, P> Clone for SearchSession<T, P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            scope: self.scope.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, P> SearchSession<T, P>
where
    T: Send + Sync + 'static,
    P: SearchProvider<T> + 'static,
{
    #[must_use]
    pub fn new(provider: P, scope: TaskScope) -> Self {
        Self::build(provider, scope, None)
    }

    /// Like [`SearchSession::new`], feeding every outcome to `sink` before
    /// watchers observe it.
    #[must_use]
    pub fn with_sink(provider: P, scope: TaskScope, sink: OutcomeSink<T>) -> Self {
        Self::build(provider, scope, Some(sink))
    }

    fn build(provider: P, scope: TaskScope, sink: Option<OutcomeSink<T>>) -> Self {
        let (outcome, _) = watch::channel(SearchOutcome::Idle);
        Self {
            provider: Arc::new(provider),
            scope,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::default()),
                outcome,
                sink,
            }),
        }
    }

    /// Apply one debouncer event.
    pub fn handle_event(&self, event: SearchEvent) {
        match event {
            SearchEvent::Commit { query } => {
                self.start(query, true);
            }
            SearchEvent::Cleared => {
                let mut state = self.shared.lock();
                if state.disposed {
                    return;
                }
                state.request += 1;
                state.last_query = None;
                state.events_handled += 1;
                tracing::debug!(request = state.request, "Search cleared, browse list restored");
                self.shared.publish(SearchOutcome::Idle);
            }
        }
    }

    /// Start a search for `query`, superseding any request in flight.
    ///
    /// Returns `false` once the session is disposed.
    pub fn execute(&self, query: String) -> bool {
        self.start(query, false)
    }

    /// Re-issue the last committed query. `false` when there is none.
    pub fn retry(&self) -> bool {
        let query = self.shared.lock().last_query.clone();
        match query {
            Some(query) => {
                tracing::debug!(query = %query, "Retrying search");
                self.start(query, false)
            }
            None => false,
        }
    }

    fn start(&self, query: String, from_event: bool) -> bool {
        let mut state = self.shared.lock();
        if state.disposed {
            return false;
        }
        state.request += 1;
        let request = state.request;
        state.last_query = Some(query.clone());
        if from_event {
            state.events_handled += 1;
        }
        self.shared.publish(SearchOutcome::Loading {
            query: query.clone(),
        });

        let provider = Arc::clone(&self.provider);
        let shared = Arc::downgrade(&self.shared);
        let spawned = self.scope.spawn(async move {
            let result = <P as SearchProvider<T>>::search(&provider, &query).await;
            if let Some(shared) = shared.upgrade() {
                shared.finish(request, query, result);
            }
        });
        spawned.is_some()
    }

    /// Feed every event from `events` into the session until the sender closes.
    pub fn attach(&self, mut events: mpsc::UnboundedReceiver<SearchEvent>) -> Option<ScheduledTask> {
        let session = self.clone();
        self.scope.spawn(async move {
            while let Some(event) = events.recv().await {
                session.handle_event(event);
            }
            tracing::trace!("Search event stream closed");
        })
    }
}

impl<T, P> SearchSession<T, P> {
    /// Discard any in-flight response; later events are ignored.
    ///
    /// A `Loading` outcome becomes `Idle` for watchers so
    /// [`SearchSession::wait_for_outcome`] returns. The sink is not called.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.request += 1;
        let released = self.shared.outcome.send_if_modified(|outcome| {
            if outcome.is_loading() {
                *outcome = SearchOutcome::Idle;
                true
            } else {
                false
            }
        });
        tracing::debug!(request = state.request, released, "Search session disposed");
    }

    /// Number of debouncer events applied so far.
    #[must_use]
    pub fn events_handled(&self) -> u64 {
        self.shared.lock().events_handled
    }

    #[must_use]
    pub fn last_query(&self) -> Option<String> {
        self.shared.lock().last_query.clone()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SearchOutcome<T>> {
        self.shared.outcome.subscribe()
    }
}

impl<T, P> SearchSession<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: SearchProvider<T> + 'static,
{
    #[must_use]
    pub fn outcome(&self) -> SearchOutcome<T> {
        self.shared.outcome.borrow().clone()
    }

    /// Wait for the current request to resolve, or for the session to be
    /// disposed.
    pub async fn wait_for_outcome(&self) -> SearchOutcome<T> {
        let mut rx = self.watch();
        match rx.wait_for(|outcome| !outcome.is_loading()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => self.outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Provider with per-query latency and scripted failures.
    #[derive(Default)]
    struct ScriptedProvider {
        latency: HashMap<String, Duration>,
        failures: Mutex<HashMap<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn slow(mut self, query: &str, latency: Duration) -> Self {
            self.latency.insert(query.to_string(), latency);
            self
        }

        fn failing(self, query: &str, message: &str) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(query.to_string(), message.to_string());
            self
        }

        fn heal(&self, query: &str) {
            self.failures.lock().unwrap().remove(query);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchProvider<String> for ScriptedProvider {
        async fn search(&self, query: &str) -> Result<Vec<String>, SearchError> {
            self.calls.lock().unwrap().push(query.to_string());
            if let Some(latency) = self.latency.get(query) {
                tokio::time::sleep(*latency).await;
            }
            if let Some(message) = self.failures.lock().unwrap().get(query) {
                return Err(SearchError::failed(message.clone()));
            }
            Ok(vec![format!("{query}-1"), format!("{query}-2")])
        }
    }

    fn session(provider: ScriptedProvider) -> (SearchSession<String, Arc<ScriptedProvider>>, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let scope = TaskScope::new("search-test").unwrap();
        (SearchSession::new(Arc::clone(&provider), scope), provider)
    }

    fn commit(query: &str) -> SearchEvent {
        SearchEvent::Commit {
            query: query.to_string(),
        }
    }

    #[tokio::test]
    async fn commit_publishes_loading_then_ready() {
        tokio::time::pause();
        let (session, provider) = session(ScriptedProvider::default());
        session.handle_event(commit("lofi"));
        assert_eq!(
            session.outcome(),
            SearchOutcome::Loading {
                query: "lofi".into()
            }
        );

        let outcome = session.wait_for_outcome().await;
        assert_eq!(
            outcome,
            SearchOutcome::Ready {
                query: "lofi".into(),
                results: vec!["lofi-1".into(), "lofi-2".into()],
            }
        );
        assert_eq!(provider.calls(), vec!["lofi"]);
    }

    #[tokio::test]
    async fn failure_surfaces_message_verbatim_and_retry_reissues() {
        tokio::time::pause();
        let (session, provider) = session(ScriptedProvider::default().failing("art", "backend unavailable"));
        session.handle_event(commit("art"));

        match session.wait_for_outcome().await {
            SearchOutcome::Failed { query, error } => {
                assert_eq!(query, "art");
                assert_eq!(error.to_string(), "backend unavailable");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        provider.heal("art");
        assert!(session.retry());
        assert!(matches!(session.wait_for_outcome().await, SearchOutcome::Ready { .. }));
        assert_eq!(provider.calls(), vec!["art", "art"]);
    }

    #[tokio::test]
    async fn stale_response_is_discarded() {
        tokio::time::pause();
        let provider = ScriptedProvider::default()
            .slow("old", Duration::from_millis(500))
            .slow("new", Duration::from_millis(10));
        let (session, _provider) = session(provider);

        session.handle_event(commit("old"));
        session.handle_event(commit("new"));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(session.outcome().query(), Some("new"));
        assert!(matches!(session.outcome(), SearchOutcome::Ready { .. }));
    }

    #[tokio::test]
    async fn cleared_returns_to_idle_and_discards_in_flight() {
        tokio::time::pause();
        let (session, _provider) = session(ScriptedProvider::default().slow("q", Duration::from_millis(100)));
        session.handle_event(commit("q"));
        session.handle_event(SearchEvent::Cleared);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(session.outcome(), SearchOutcome::Idle);
        assert!(!session.retry(), "nothing to retry after clear");
        assert_eq!(session.events_handled(), 2);
    }

    #[tokio::test]
    async fn disposed_session_ignores_responses_and_events() {
        tokio::time::pause();
        let (session, provider) = session(ScriptedProvider::default().slow("q", Duration::from_millis(100)));
        session.handle_event(commit("q"));
        session.dispose();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(session.outcome(), SearchOutcome::Idle);
        assert!(!session.execute("again".into()));
        session.handle_event(commit("later"));
        assert_eq!(session.outcome(), SearchOutcome::Idle);
        assert_eq!(provider.calls(), vec!["q"]);
    }

    #[tokio::test]
    async fn dispose_while_loading_releases_outcome_waiters() {
        tokio::time::pause();
        let (session, _provider) = session(ScriptedProvider::default().slow("a", Duration::from_secs(60)));
        session.handle_event(commit("a"));
        assert!(session.outcome().is_loading());

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_for_outcome().await })
        };
        tokio::task::yield_now().await;
        session.dispose();

        let outcome = tokio::time::timeout(Duration::from_secs(10), waiter)
            .await
            .expect("dispose releases waiters")
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Idle);
        assert_eq!(session.wait_for_outcome().await, SearchOutcome::Idle);
    }

    #[tokio::test]
    async fn dispose_keeps_resolved_outcome() {
        tokio::time::pause();
        let (session, _provider) = session(ScriptedProvider::default());
        session.handle_event(commit("done"));
        session.wait_for_outcome().await;
        session.dispose();
        assert_eq!(session.outcome().query(), Some("done"));
    }

    #[tokio::test]
    async fn attach_pumps_events_until_sender_closes() {
        tokio::time::pause();
        let (session, provider) = session(ScriptedProvider::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = session.attach(rx).unwrap();

        tx.send(commit("one")).unwrap();
        tx.send(commit("two")).unwrap();
        drop(tx);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(provider.calls(), vec!["one", "two"]);
        assert!(pump.is_finished());
    }

    #[tokio::test]
    async fn sink_sees_outcome_before_watchers() {
        tokio::time::pause();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let sink: OutcomeSink<String> = Arc::new(move |outcome: &SearchOutcome<String>| {
            record.lock().unwrap().push(outcome.query().map(str::to_string));
        });
        let scope = TaskScope::new("sink").unwrap();
        let session = SearchSession::with_sink(ScriptedProvider::default(), scope, sink);

        session.handle_event(commit("x"));
        session.wait_for_outcome().await;
        session.handle_event(SearchEvent::Cleared);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("x".to_string()), Some("x".to_string()), None]
        );
    }

    #[test]
    fn outcome_serializes_with_state_tag() {
        let outcome: SearchOutcome<String> = SearchOutcome::Failed {
            query: "q".into(),
            error: SearchError::failed("boom"),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"]["message"], "boom");
    }
}
