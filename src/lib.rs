//! Watch-driven configuration mirror for a hierarchical coordination store.
//!
//! # Architecture Overview
//!
//! ```text
//!   coordination store ──events──▶ store::Session ──▶ mirror dispatch loop
//!          ▲                            │                    │
//!          │ watched reads              │                    ├─▶ mirror::ConfigCache ◀── ConfigMirror::get
//!          └──── mirror::TreeWalker ◀───┘                    │          (model::Decoder)
//!                                                            └─▶ mirror::ChangeNotifier ──▶ subscribers
//!
//!   mirror::Reconciler ── every 30s ──▶ registered callbacks (Session)
//!   load_balancer::RoundRobin ◀── BackendSet from the cache
//! ```

pub mod config;
pub mod connection;
pub mod lifecycle;
pub mod load_balancer;
pub mod mirror;
pub mod model;
pub mod observability;
pub mod store;

pub use config::MirrorConfig;
pub use lifecycle::Shutdown;
pub use load_balancer::{EndpointSelector, RoundRobin, SelectError};
pub use mirror::{ChangeEvent, ConfigMirror, MirrorError, MirrorResult, MirrorState};
pub use model::{BackendSet, DecodedValue, Endpoint, ListenerSet};
pub use store::{MemoryStore, Session, StoreConnector, StoreError};
