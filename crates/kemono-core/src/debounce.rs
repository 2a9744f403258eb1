//! Debounced search input.
//!
//! [`SearchDebouncer`] turns a high-frequency stream of text changes into a
//! low-frequency stream of [`SearchEvent`]s. Each change cancels the pending
//! commit and schedules a new one after the quiet interval, so a burst of
//! keystrokes only ever commits its final value.
//!
//! Every scheduled commit carries the debouncer's epoch at scheduling time.
//! Cancelling, resetting, submitting and disposing all bump the epoch, and a
//! firing commit whose epoch is stale does nothing. This covers the window
//! where a timer has already elapsed but its task has not yet taken the lock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::scheduler::{ScheduledTask, TaskScope};

/// Default quiet interval before a typed query commits.
pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_millis(500);

/// Output of the debouncer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    /// A non-empty query became final
    Commit { query: String },
    /// The input became empty; consumers return to their browse view
    Cleared,
}

/// Observable debouncer state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchSnapshot {
    /// Latest unconfirmed text
    pub raw_input: String,
    /// Last query dispatched downstream
    pub committed_query: Option<String>,
    /// A timer-based commit is scheduled
    pub pending: bool,
    /// No further events will be emitted
    pub disposed: bool,
    /// Events emitted so far
    pub emitted: u64,
}

#[derive(Default)]
struct DebounceState {
    raw_input: String,
    committed_query: Option<String>,
    pending: Option<ScheduledTask>,
    epoch: u64,
    disposed: bool,
    emitted: u64,
}

impl DebounceState {
    fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            raw_input: self.raw_input.clone(),
            committed_query: self.committed_query.clone(),
            pending: self.pending.is_some(),
            disposed: self.disposed,
            emitted: self.emitted,
        }
    }

    /// Cancel any scheduled commit and invalidate its epoch.
    fn supersede(&mut self) -> u64 {
        if let Some(task) = self.pending.take() {
            task.cancel();
            tracing::trace!(epoch = self.epoch, task = task.id(), "Superseded pending commit");
        }
        self.epoch += 1;
        self.epoch
    }
}

struct Shared {
    state: Mutex<DebounceState>,
    events: mpsc::UnboundedSender<SearchEvent>,
    snapshot: watch::Sender<SearchSnapshot>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &DebounceState) {
        self.snapshot.send_replace(state.snapshot());
    }

    /// Emit the commit/clear event for the current raw input.
    fn emit(&self, state: &mut DebounceState) {
        let query = state.raw_input.trim();
        let event = if query.is_empty() {
            state.committed_query = None;
            SearchEvent::Cleared
        } else {
            state.committed_query = Some(query.to_string());
            SearchEvent::Commit {
                query: query.to_string(),
            }
        };
        state.emitted += 1;
        match &event {
            SearchEvent::Commit { query } => {
                tracing::debug!(query = %query, epoch = state.epoch, "Search committed");
            }
            SearchEvent::Cleared => tracing::debug!(epoch = state.epoch, "Search cleared"),
        }
        if self.events.send(event).is_err() {
            tracing::debug!("Search event receiver dropped");
        }
    }

    /// Timer completion for the commit scheduled at `epoch`.
    fn fire(&self, epoch: u64) {
        let mut state = self.lock();
        if state.disposed || state.epoch != epoch || state.pending.is_none() {
            tracing::trace!(epoch, current = state.epoch, "Stale commit ignored");
            return;
        }
        state.pending = None;
        self.emit(&mut state);
        self.publish(&state);
    }
}

/// Collapses rapid text changes into at most one commit per quiet interval.
///
/// Dropping the debouncer disposes it.
pub struct SearchDebouncer {
    quiet_interval: Duration,
    scope: TaskScope,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SearchDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchDebouncer")
            .field("quiet_interval", &self.quiet_interval)
            .field("state", &self.snapshot())
            .finish()
    }
}

impl SearchDebouncer {
    /// Create a debouncer scheduling its commits on `scope`.
    ///
    /// Events are delivered on the returned receiver in emission order.
    #[must_use]
    pub fn new(
        quiet_interval: Duration,
        scope: TaskScope,
    ) -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(SearchSnapshot::default());
        let debouncer = Self {
            quiet_interval,
            scope,
            shared: Arc::new(Shared {
                state: Mutex::new(DebounceState::default()),
                events,
                snapshot,
            }),
        };
        (debouncer, rx)
    }

    #[must_use]
    pub fn quiet_interval(&self) -> Duration {
        self.quiet_interval
    }

    /// Record `text` and restart the quiet interval.
    pub fn on_text_changed(&self, text: impl Into<String>) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.raw_input = text.into();
        let epoch = state.supersede();
        tracing::trace!(input = %state.raw_input, epoch, "Text changed");

        let shared = Arc::downgrade(&self.shared);
        state.pending = self.scope.spawn_after(self.quiet_interval, move || {
            if let Some(shared) = shared.upgrade() {
                shared.fire(epoch);
            }
        });
        self.shared.publish(&state);
    }

    /// Commit `text` immediately, cancelling any scheduled commit.
    ///
    /// Blank text emits [`SearchEvent::Cleared`].
    pub fn on_submit(&self, text: impl Into<String>) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.raw_input = text.into();
        state.supersede();
        self.shared.emit(&mut state);
        self.shared.publish(&state);
    }

    /// Cancel any scheduled commit and forget raw and committed input.
    ///
    /// Emits nothing.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.supersede();
        state.raw_input.clear();
        state.committed_query = None;
        self.shared.publish(&state);
    }

    /// Cancel any scheduled commit; no event is emitted afterwards.
    ///
    /// Safe to call repeatedly.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.supersede();
        state.disposed = true;
        tracing::debug!(emitted = state.emitted, "Search debouncer disposed");
        self.shared.publish(&state);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    #[must_use]
    pub fn snapshot(&self) -> SearchSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Subscribe to every state transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SearchSnapshot> {
        self.shared.snapshot.subscribe()
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn debouncer() -> (SearchDebouncer, mpsc::UnboundedReceiver<SearchEvent>) {
        tokio::time::pause();
        let scope = TaskScope::new("debounce-test").unwrap();
        SearchDebouncer::new(DEFAULT_QUIET_INTERVAL, scope)
    }

    fn commit(query: &str) -> SearchEvent {
        SearchEvent::Commit {
            query: query.to_string(),
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test]
    async fn burst_commits_only_final_text() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("a");
        advance(100).await;
        debouncer.on_text_changed("ab");
        advance(600).await;

        assert_eq!(rx.try_recv().unwrap(), commit("ab"));
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(debouncer.snapshot().committed_query.as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn no_commit_before_quiet_interval_elapses() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("lofi");
        advance(499).await;
        assert!(rx.try_recv().is_err());
        assert!(debouncer.is_pending());
        advance(2).await;
        assert_eq!(rx.try_recv().unwrap(), commit("lofi"));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn each_quiet_period_commits_once() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("pix");
        advance(600).await;
        debouncer.on_text_changed("pixel");
        advance(600).await;

        assert_eq!(rx.try_recv().unwrap(), commit("pix"));
        assert_eq!(rx.try_recv().unwrap(), commit("pixel"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn whitespace_input_clears() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("art");
        advance(600).await;
        debouncer.on_text_changed("   ");
        advance(600).await;

        assert_eq!(rx.try_recv().unwrap(), commit("art"));
        assert_eq!(rx.try_recv().unwrap(), SearchEvent::Cleared);
        assert_eq!(debouncer.snapshot().committed_query, None);
    }

    #[tokio::test]
    async fn commit_is_trimmed() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("  lofi  ");
        advance(600).await;
        assert_eq!(rx.try_recv().unwrap(), commit("lofi"));
    }

    #[tokio::test]
    async fn submit_is_synchronous_and_cancels_pending() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("pix");
        debouncer.on_submit("pixel art");

        assert_eq!(rx.try_recv().unwrap(), commit("pixel art"));
        assert!(!debouncer.is_pending());

        advance(1_000).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn blank_submit_clears() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_submit("");
        assert_eq!(rx.try_recv().unwrap(), SearchEvent::Cleared);
    }

    #[tokio::test]
    async fn reset_cancels_without_emitting() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_submit("first");
        let _ = rx.try_recv();
        debouncer.on_text_changed("second");
        debouncer.reset();

        advance(1_000).await;
        assert!(rx.try_recv().is_err());
        let snapshot = debouncer.snapshot();
        assert_eq!(snapshot.raw_input, "");
        assert_eq!(snapshot.committed_query, None);
        assert!(!snapshot.pending);
    }

    #[tokio::test]
    async fn reset_then_dispose_silences_everything() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("a");
        debouncer.reset();
        debouncer.dispose();
        debouncer.on_text_changed("b");
        debouncer.on_submit("c");

        advance(2_000).await;
        assert!(rx.try_recv().is_err());
        assert!(debouncer.is_disposed());
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let (debouncer, _rx) = debouncer();
        debouncer.on_text_changed("x");
        debouncer.dispose();
        debouncer.dispose();
        assert!(debouncer.snapshot().disposed);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn drop_disposes_and_closes_channel() {
        let (debouncer, mut rx) = debouncer();
        debouncer.on_text_changed("never");
        drop(debouncer);

        advance(1_000).await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[tokio::test]
    async fn scope_shutdown_stops_pending_commit() {
        tokio::time::pause();
        let scope = TaskScope::new("screen").unwrap();
        let (debouncer, mut rx) = SearchDebouncer::new(DEFAULT_QUIET_INTERVAL, scope.clone());
        debouncer.on_text_changed("late");
        scope.shutdown();

        advance(1_000).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn watch_observes_transitions() {
        let (debouncer, _rx) = debouncer();
        let mut watcher = debouncer.watch();
        debouncer.on_text_changed("q");
        assert!(watcher.has_changed().unwrap());
        let seen = watcher.borrow_and_update().clone();
        assert_eq!(seen.raw_input, "q");
        assert!(seen.pending);

        advance(600).await;
        watcher.changed().await.unwrap();
        let seen = watcher.borrow().clone();
        assert!(!seen.pending);
        assert_eq!(seen.emitted, 1);
    }
}
