//! kemono-core: UI-state core for the Kemono server browser
//!
//! This crate holds the state machines behind the server browse/search
//! screen: a debounced search field and an incremental pager over a backing
//! list, both driven by cancellable scheduled work on tokio.
//!
//! # Architecture
//!
//! ```text
//! keystrokes → SearchDebouncer → SearchSession → SearchProvider
//!                                     ↓
//!  scroll / page → IncrementalPager ← BackingList snapshots
//!                        ↓
//!                    visible()
//! ```
//!
//! # Modules
//!
//! - `debounce`: Quiet-interval search input with commit/clear events
//! - `pager`: Windowed and infinite-scroll reveal over a backing list
//! - `scheduler`: Task scopes, cancellable timers, liveness
//! - `backing`: Generation-tagged backing lists and snapshots
//! - `search`: Search provider trait and the request session
//! - `screen`: Composition of the above for one screen
//! - `catalog`: Discord server items, JSON catalogs, in-memory search
//! - `config`: TOML configuration
//! - `logging`: tracing subscriber setup
//! - `error`: Error types with remediation guidance
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod backing;
pub mod catalog;
pub mod config;
pub mod debounce;
pub mod error;
pub mod logging;
pub mod pager;
pub mod scheduler;
pub mod screen;
pub mod search;

pub use backing::{BackingChange, BackingList, BackingSnapshot};
pub use catalog::{CatalogItem, DiscordServer, LocalSearch};
pub use config::{Config, PagingMode};
pub use debounce::{SearchDebouncer, SearchEvent, SearchSnapshot};
pub use error::{Error, Result};
pub use pager::{IncrementalPager, PageSnapshot, PagerSettings};
pub use scheduler::{ScheduledTask, TaskScope};
pub use screen::{ScreenSettings, ServerScreen};
pub use search::{SearchOutcome, SearchProvider, SearchSession};
