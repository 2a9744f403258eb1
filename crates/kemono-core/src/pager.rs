//! Incremental reveal of a backing list.
//!
//! Two presentation modes share one pager:
//!
//! - **Windowed**: page-by-page navigation driven by [`PageCursor`].
//! - **Infinite scroll**: the visible prefix grows by one page per reveal
//!   step, driven by [`RevealWindow`]. A reveal step waits a settle delay
//!   before widening the window, and at most one step is in flight.
//!
//! [`PageCursor`] and [`RevealWindow`] are plain state machines with no
//! timers. [`IncrementalPager`] wraps them with scheduled reveal steps, a
//! liveness check on completion, and a `watch` channel publishing a
//! [`PageSnapshot`] after every transition.

use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::backing::{BackingChange, BackingSnapshot};
use crate::config::{PagingConfig, PagingMode};
use crate::scheduler::{ScheduledTask, TaskScope};

/// Default items per page / per reveal step.
pub const DEFAULT_PAGE_SIZE: usize = 20;
/// Default distance from the end of the scroll extent that triggers a reveal.
pub const DEFAULT_SCROLL_THRESHOLD: f64 = 200.0;
/// Default settle delay of one reveal step.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

// =============================================================================
// PageCursor (windowed mode)
// =============================================================================

/// Current page over a list of `len` items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    page_size: usize,
    len: usize,
    current_page: usize,
}

impl PageCursor {
    /// A zero page size is treated as 1.
    #[must_use]
    pub fn new(page_size: usize, len: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            len,
            current_page: 0,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// `ceil(len / page_size)`; zero for an empty list.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.len.div_ceil(self.page_size)
    }

    #[must_use]
    pub fn last_page(&self) -> usize {
        self.total_pages().saturating_sub(1)
    }

    /// Advance one page. No-op on the last page.
    pub fn next_page(&mut self) -> bool {
        if self.current_page < self.last_page() {
            self.current_page += 1;
            true
        } else {
            false
        }
    }

    /// Go back one page. No-op on the first page.
    pub fn prev_page(&mut self) -> bool {
        if self.current_page > 0 {
            self.current_page -= 1;
            true
        } else {
            false
        }
    }

    /// Jump to `page`, clamped to the last page. Returns the resulting page.
    pub fn go_to(&mut self, page: usize) -> usize {
        self.current_page = page.min(self.last_page());
        self.current_page
    }

    /// Index range of the current page.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        let start = self.current_page.saturating_mul(self.page_size).min(self.len);
        let end = start.saturating_add(self.page_size).min(self.len);
        start..end
    }

    /// New list contents: back to the first page.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.current_page = 0;
    }

    /// Appended items: keep the current page.
    pub fn grow(&mut self, len: usize) {
        self.len = len;
        self.current_page = self.current_page.min(self.last_page());
    }
}

// =============================================================================
// RevealWindow (infinite-scroll mode)
// =============================================================================

/// Proof that a reveal step was started under a given window epoch.
///
/// A ticket from before a reset is rejected by [`RevealWindow::complete_reveal`].
#[derive(Debug, PartialEq, Eq)]
pub struct RevealTicket {
    epoch: u64,
}

/// Visible prefix of a list of `len` items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealWindow {
    page_size: usize,
    len: usize,
    visible_count: usize,
    expanding: bool,
    epoch: u64,
}

impl RevealWindow {
    /// A zero page size is treated as 1.
    #[must_use]
    pub fn new(page_size: usize, len: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            page_size,
            len,
            visible_count: page_size.min(len),
            expanding: false,
            epoch: 0,
        }
    }

    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    #[must_use]
    pub fn is_expanding(&self) -> bool {
        self.expanding
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every item is visible; further reveals are no-ops.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.visible_count >= self.len
    }

    /// Whether a scroll position near the end should start a reveal step.
    #[must_use]
    pub fn should_expand(&self, scroll_position: f64, max_scroll_extent: f64, threshold: f64) -> bool {
        scroll_position >= max_scroll_extent - threshold && !self.is_exhausted() && !self.expanding
    }

    /// Start a reveal step. `None` while one is in flight or nothing is left.
    pub fn begin_reveal(&mut self) -> Option<RevealTicket> {
        if self.expanding || self.is_exhausted() {
            return None;
        }
        self.expanding = true;
        Some(RevealTicket { epoch: self.epoch })
    }

    /// Finish the reveal step started with `ticket`.
    ///
    /// Returns `false` for a ticket issued before the last reset.
    pub fn complete_reveal(&mut self, ticket: RevealTicket) -> bool {
        if ticket.epoch != self.epoch || !self.expanding {
            return false;
        }
        self.visible_count = (self.visible_count + self.page_size).min(self.len);
        self.expanding = false;
        true
    }

    /// Drop the in-flight step, invalidating its ticket.
    pub fn abandon(&mut self) {
        self.expanding = false;
        self.epoch += 1;
    }

    /// New list contents: back to the first page, nothing in flight.
    pub fn reset(&mut self, len: usize) {
        self.abandon();
        self.len = len;
        self.visible_count = self.page_size.min(len);
    }

    /// Appended items: fill the first page if it was short.
    pub fn grow(&mut self, len: usize) {
        self.len = len;
        self.visible_count = self.visible_count.max(self.page_size.min(len));
    }
}

// =============================================================================
// IncrementalPager
// =============================================================================

/// Pager tuning, usually built from [`PagingConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PagerSettings {
    pub mode: PagingMode,
    pub page_size: usize,
    pub scroll_threshold: f64,
    pub settle_delay: Duration,
}

impl Default for PagerSettings {
    fn default() -> Self {
        Self {
            mode: PagingMode::InfiniteScroll,
            page_size: DEFAULT_PAGE_SIZE,
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl From<&PagingConfig> for PagerSettings {
    fn from(config: &PagingConfig) -> Self {
        Self {
            mode: config.mode,
            page_size: config.page_size,
            scroll_threshold: config.scroll_threshold,
            settle_delay: config.settle_delay(),
        }
    }
}

impl PagerSettings {
    #[must_use]
    pub fn with_mode(mut self, mode: PagingMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Observable pager state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSnapshot {
    pub mode: PagingMode,
    /// Generation of the backing list currently shown
    pub generation: u64,
    pub backing_len: usize,
    /// Visible index range, start inclusive
    pub visible_start: usize,
    /// Visible index range, end exclusive
    pub visible_end: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub is_expanding: bool,
    /// Reveal steps completed since the pager was created
    pub reveals: u64,
    pub disposed: bool,
}

impl PageSnapshot {
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible_end - self.visible_start
    }
}

struct PagerState<T> {
    backing: BackingSnapshot<T>,
    cursor: PageCursor,
    window: RevealWindow,
    in_flight: Option<ScheduledTask>,
    reveals: u64,
    disposed: bool,
}

impl<T> PagerState<T> {
    fn visible_range(&self, mode: PagingMode) -> Range<usize> {
        match mode {
            PagingMode::Windowed => self.cursor.range(),
            PagingMode::InfiniteScroll => 0..self.window.visible_count(),
        }
    }

    fn snapshot(&self, mode: PagingMode) -> PageSnapshot {
        let visible = self.visible_range(mode);
        PageSnapshot {
            mode,
            generation: self.backing.generation(),
            backing_len: self.backing.len(),
            visible_start: visible.start,
            visible_end: visible.end,
            current_page: self.cursor.current_page(),
            total_pages: self.cursor.total_pages(),
            is_expanding: self.window.is_expanding(),
            reveals: self.reveals,
            disposed: self.disposed,
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.cancel();
        }
        self.window.abandon();
    }
}

struct PagerShared<T> {
    mode: PagingMode,
    state: Mutex<PagerState<T>>,
    snapshot: watch::Sender<PageSnapshot>,
}

impl<T> PagerShared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, PagerState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &PagerState<T>) {
        self.snapshot.send_replace(state.snapshot(self.mode));
    }

    /// The owning scope shut down; its reveal task is already aborted.
    fn abandon_in_flight(&self) {
        let mut state = self.lock();
        if !state.window.is_expanding() {
            return;
        }
        state.cancel_in_flight();
        tracing::debug!(
            visible_count = state.window.visible_count(),
            "Reveal step abandoned on scope shutdown"
        );
        self.publish(&state);
    }

    /// Settle-delay completion of a reveal step.
    fn complete(&self, ticket: RevealTicket) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }
        if state.window.complete_reveal(ticket) {
            state.in_flight = None;
            state.reveals += 1;
            tracing::debug!(
                visible_count = state.window.visible_count(),
                backing_len = state.backing.len(),
                generation = state.backing.generation(),
                "Reveal step completed"
            );
            self.publish(&state);
        } else {
            tracing::trace!("Stale reveal step ignored");
        }
    }
}

/// Reveals a backing list page by page.
///
/// Clones share the same window. Scheduled reveal steps run on the
/// [`TaskScope`] given at construction.
pub struct IncrementalPager<T> {
    settings: PagerSettings,
    scope: TaskScope,
    shared: Arc<PagerShared<T>>,
}

impl<T> Clone for IncrementalPager<T> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            scope: self.scope.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for IncrementalPager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalPager")
            .field("settings", &self.settings)
            .field("state", &self.snapshot())
            .finish()
    }
}

impl<T> IncrementalPager<T> {
    #[must_use]
    pub fn settings(&self) -> &PagerSettings {
        &self.settings
    }

    #[must_use]
    pub fn mode(&self) -> PagingMode {
        self.settings.mode
    }

    /// Adopt the collaborator's latest snapshot.
    ///
    /// Growth keeps the current position; replacement or shrinkage resets to
    /// the first page and abandons any reveal step in flight. A disposed
    /// pager ignores new snapshots and reports [`BackingChange::Unchanged`].
    pub fn sync_backing(&self, backing: BackingSnapshot<T>) -> BackingChange {
        let mut state = self.shared.lock();
        if state.disposed {
            return BackingChange::Unchanged;
        }
        let change = BackingChange::classify(
            state.backing.generation(),
            state.backing.len(),
            backing.generation(),
            backing.len(),
        );
        let len = backing.len();
        match change {
            BackingChange::Unchanged => {}
            BackingChange::Grew => {
                state.window.grow(len);
                state.cursor.grow(len);
            }
            BackingChange::Replaced => {
                state.cancel_in_flight();
                state.window.reset(len);
                state.cursor.reset(len);
                tracing::debug!(
                    generation = backing.generation(),
                    backing_len = len,
                    "Backing list replaced, window reset"
                );
            }
        }
        state.backing = backing;
        if change != BackingChange::Unchanged {
            self.shared.publish(&state);
        }
        change
    }

    /// Run `f` over the visible items without cloning them.
    pub fn with_visible<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        let state = self.shared.lock();
        let range = state.visible_range(self.settings.mode);
        f(state.backing.slice(range))
    }

    /// Windowed mode: advance one page. No-op on the last page.
    pub fn next_page(&self) -> bool {
        self.navigate(PageCursor::next_page)
    }

    /// Windowed mode: go back one page. No-op on the first page.
    pub fn prev_page(&self) -> bool {
        self.navigate(PageCursor::prev_page)
    }

    /// Windowed mode: jump to `page`, clamped to the last page.
    pub fn go_to_page(&self, page: usize) -> bool {
        self.navigate(|cursor| {
            let before = cursor.current_page();
            cursor.go_to(page) != before
        })
    }

    fn navigate(&self, step: impl FnOnce(&mut PageCursor) -> bool) -> bool {
        if self.settings.mode != PagingMode::Windowed {
            return false;
        }
        let mut state = self.shared.lock();
        if state.disposed {
            return false;
        }
        let moved = step(&mut state.cursor);
        if moved {
            tracing::trace!(page = state.cursor.current_page(), "Page changed");
            self.shared.publish(&state);
        }
        moved
    }

    /// Abandon any in-flight reveal; further operations are no-ops.
    ///
    /// Safe to call repeatedly.
    pub fn dispose(&self) {
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.cancel_in_flight();
        state.disposed = true;
        tracing::debug!(reveals = state.reveals, "Pager disposed");
        self.shared.publish(&state);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    #[must_use]
    pub fn is_expanding(&self) -> bool {
        self.shared.lock().window.is_expanding()
    }

    #[must_use]
    pub fn snapshot(&self) -> PageSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Subscribe to every state transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PageSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Wait until no reveal step is in flight.
    pub async fn wait_until_settled(&self) {
        let mut rx = self.watch();
        loop {
            if !rx.borrow_and_update().is_expanding {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<T: Send + Sync + 'static> IncrementalPager<T> {
    /// A step in flight when `scope` shuts down is abandoned, so waiters on
    /// [`IncrementalPager::wait_until_settled`] are released.
    #[must_use]
    pub fn new(settings: PagerSettings, scope: TaskScope, backing: BackingSnapshot<T>) -> Self {
        let len = backing.len();
        let state = PagerState {
            cursor: PageCursor::new(settings.page_size, len),
            window: RevealWindow::new(settings.page_size, len),
            backing,
            in_flight: None,
            reveals: 0,
            disposed: false,
        };
        let (snapshot, _) = watch::channel(state.snapshot(settings.mode));
        let shared = Arc::new(PagerShared {
            mode: settings.mode,
            state: Mutex::new(state),
            snapshot,
        });

        let weak = Arc::downgrade(&shared);
        scope.on_shutdown(move || {
            if let Some(shared) = weak.upgrade() {
                shared.abandon_in_flight();
            }
        });
        Self {
            shared,
            settings,
            scope,
        }
    }

    /// Infinite-scroll mode: start a reveal step if the scroll position is
    /// within the threshold of the end.
    ///
    /// Returns `true` when a step was started. Dropped (not queued) while a
    /// step is in flight, when everything is visible, and in windowed mode.
    pub fn maybe_expand(&self, scroll_position: f64, max_scroll_extent: f64) -> bool {
        if self.settings.mode != PagingMode::InfiniteScroll {
            return false;
        }
        let mut state = self.shared.lock();
        if state.disposed
            || !state.window.should_expand(
                scroll_position,
                max_scroll_extent,
                self.settings.scroll_threshold,
            )
        {
            return false;
        }
        let Some(ticket) = state.window.begin_reveal() else {
            return false;
        };

        let shared = Arc::downgrade(&self.shared);
        state.in_flight = self.scope.spawn_after(self.settings.settle_delay, move || {
            if let Some(shared) = shared.upgrade() {
                shared.complete(ticket);
            }
        });
        if state.in_flight.is_none() {
            state.window.abandon();
            return false;
        }
        tracing::debug!(
            visible_count = state.window.visible_count(),
            backing_len = state.backing.len(),
            "Reveal step started"
        );
        self.shared.publish(&state);
        true
    }
}

impl<T: Clone> IncrementalPager<T> {
    /// Clone of the visible items.
    #[must_use]
    pub fn visible(&self) -> Vec<T> {
        self.with_visible(<[T]>::to_vec)
    }
}
