//! Watch-driven mirror of the coordination store.
//!
//! # Data Flow
//! ```text
//! ConfigMirror::start
//!     → store::Session::connect (blocks until Connected)
//!     → dispatcher.rs populate: walker.rs walks each root (watched reads)
//!         → model::Decoder → cache.rs
//!     → spawn dispatch loop + reconcile.rs timer
//!
//! Store event stream (one task, serial):
//!     Changed(P)  → re-read with watch → cache → notifier.rs (if /lds/ or /cds/)
//!     Deleted(P)  → drop from cache (no notification)
//!     Expired     → clear watch state → re-walk every root
//!
//! Consumers:
//!     manager.rs get/snapshot (cache, fetch-through inside mirrored roots)
//!     notifier.rs subscriptions (push, bounded, lossy)
//! ```
//!
//! # Design Decisions
//! - Only the dispatch loop writes the cache, except fetch-through inserts
//!   that never overwrite
//! - Watches are tracked per path as `Watching` or `RearmPending`
//! - Walks are one level deep; new children appear on resync or fetch-through
//! - Deletions are not notified
//! - A failed resync stops the loop; the cache keeps serving its last contents

pub mod cache;
pub mod dispatcher;
pub mod manager;
pub mod notifier;
pub mod reconcile;
pub mod types;
pub mod walker;

pub use cache::ConfigCache;
pub use dispatcher::{Dispatcher, WatchTable};
pub use manager::ConfigMirror;
pub use notifier::{ChangeNotifier, ChangeSubscription, Delivery};
pub use reconcile::{CallbackError, CallbackRegistry, Reconciler, SweepReport};
pub use types::{ChangeEvent, MirrorError, MirrorResult, MirrorState, WatchState};
pub use walker::{child_path, TreeWalker};
