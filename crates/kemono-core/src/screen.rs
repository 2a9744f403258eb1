//! Server browse/search screen.
//!
//! [`ServerScreen`] wires one [`SearchDebouncer`], one [`SearchSession`] and
//! one [`IncrementalPager`] to a shared [`TaskScope`]:
//!
//! ```text
//! on_text_changed ─► SearchDebouncer ─► event pump ─► SearchSession ─► provider
//!                                                          │
//!                              Ready / Idle outcome ───────┘
//!                                     ▼
//! on_scroll / next_page ──────► IncrementalPager ─► visible()
//! ```
//!
//! A `Ready` outcome replaces the pager's backing list with the results; an
//! `Idle` outcome restores the browse list. Tearing the screen down disposes
//! every unit and shuts the scope, so no commit or reveal lands afterwards.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::backing::{BackingList, BackingSnapshot};
use crate::config::Config;
use crate::debounce::{DEFAULT_QUIET_INTERVAL, SearchDebouncer, SearchSnapshot};
use crate::pager::{IncrementalPager, PageSnapshot, PagerSettings};
use crate::scheduler::{ScheduledTask, TaskScope};
use crate::search::{OutcomeSink, SearchOutcome, SearchProvider, SearchSession};
use crate::Result;

/// Timing and paging knobs for a screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSettings {
    pub quiet_interval: Duration,
    pub pager: PagerSettings,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            quiet_interval: DEFAULT_QUIET_INTERVAL,
            pager: PagerSettings::default(),
        }
    }
}

impl From<&Config> for ScreenSettings {
    fn from(config: &Config) -> Self {
        Self {
            quiet_interval: config.search.quiet_interval(),
            pager: PagerSettings::from(&config.paging),
        }
    }
}

/// Browse/search screen over a list of `T`.
pub struct ServerScreen<T, P> {
    scope: TaskScope,
    debouncer: SearchDebouncer,
    session: SearchSession<T, P>,
    pager: IncrementalPager<T>,
    pump: Option<ScheduledTask>,
}

impl<T, P> ServerScreen<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: SearchProvider<T> + 'static,
{
    /// Build a screen showing `browse` until a search commits.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(settings: ScreenSettings, browse: BackingSnapshot<T>, provider: P) -> Result<Self> {
        let scope = TaskScope::new("server-screen")?;
        let pager = IncrementalPager::new(settings.pager, scope.clone(), browse.clone());

        let target = pager.clone();
        let sink: OutcomeSink<T> = Arc::new(move |outcome: &SearchOutcome<T>| match outcome {
            SearchOutcome::Ready { results, .. } => {
                target.sync_backing(BackingList::from_items(results.clone()).snapshot());
            }
            SearchOutcome::Idle => {
                target.sync_backing(browse.clone());
            }
            SearchOutcome::Loading { .. } | SearchOutcome::Failed { .. } => {}
        });
        let session = SearchSession::with_sink(provider, scope.clone(), sink);

        let (debouncer, events) = SearchDebouncer::new(settings.quiet_interval, scope.clone());
        let pump = session.attach(events);

        tracing::debug!(
            mode = %pager.mode(),
            backing_len = pager.snapshot().backing_len,
            quiet_interval = ?settings.quiet_interval,
            "Server screen ready"
        );
        Ok(Self {
            scope,
            debouncer,
            session,
            pager,
            pump,
        })
    }

    // =========================================================================
    // Input
    // =========================================================================

    pub fn on_text_changed(&self, text: impl Into<String>) {
        self.debouncer.on_text_changed(text);
    }

    pub fn on_submit(&self, text: impl Into<String>) {
        self.debouncer.on_submit(text);
    }

    /// Returns `true` when a reveal step was started.
    pub fn on_scroll(&self, scroll_position: f64, max_scroll_extent: f64) -> bool {
        self.pager.maybe_expand(scroll_position, max_scroll_extent)
    }

    pub fn next_page(&self) -> bool {
        self.pager.next_page()
    }

    pub fn prev_page(&self) -> bool {
        self.pager.prev_page()
    }

    pub fn go_to_page(&self, page: usize) -> bool {
        self.pager.go_to_page(page)
    }

    /// Re-issue the last committed query. `false` when there is none.
    pub fn retry(&self) -> bool {
        self.session.retry()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    #[must_use]
    pub fn visible(&self) -> Vec<T> {
        self.pager.visible()
    }

    #[must_use]
    pub fn outcome(&self) -> SearchOutcome<T> {
        self.session.outcome()
    }

    #[must_use]
    pub fn page(&self) -> PageSnapshot {
        self.pager.snapshot()
    }

    #[must_use]
    pub fn search(&self) -> SearchSnapshot {
        self.debouncer.snapshot()
    }

    /// Subscribe to search outcomes. The pager already reflects an outcome
    /// by the time a subscriber observes it.
    #[must_use]
    pub fn watch_outcome(&self) -> watch::Receiver<SearchOutcome<T>> {
        self.session.watch()
    }

    #[must_use]
    pub fn pager(&self) -> &IncrementalPager<T> {
        &self.pager
    }

    /// Wait until typed input has committed, every emitted event has reached
    /// the session, and no search is in flight.
    pub async fn wait_for_outcome(&self) -> SearchOutcome<T> {
        let mut outcomes = self.session.watch();
        let mut input = self.debouncer.watch();
        loop {
            let outcome = outcomes.borrow_and_update().clone();
            let search = input.borrow_and_update().clone();
            let caught_up = !search.pending && self.session.events_handled() >= search.emitted;
            if search.disposed || (caught_up && !outcome.is_loading()) {
                return outcome;
            }
            tokio::select! {
                changed = outcomes.changed() => {
                    if changed.is_err() {
                        return self.session.outcome();
                    }
                }
                changed = input.changed() => {
                    if changed.is_err() {
                        return self.session.outcome();
                    }
                }
            }
        }
    }

    /// Wait until no reveal step is in flight.
    pub async fn wait_until_settled(&self) {
        self.pager.wait_until_settled().await;
    }
}

impl<T, P> ServerScreen<T, P> {
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        !self.scope.is_alive()
    }

    /// Dispose every unit and cancel all scheduled work. Idempotent.
    pub fn teardown(&self) {
        if self.is_torn_down() {
            return;
        }
        self.debouncer.dispose();
        self.session.dispose();
        self.pager.dispose();
        if let Some(pump) = &self.pump {
            pump.cancel();
        }
        let aborted = self.scope.shutdown();
        tracing::debug!(aborted, "Server screen torn down");
    }
}

impl<T, P> Drop for ServerScreen<T, P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
