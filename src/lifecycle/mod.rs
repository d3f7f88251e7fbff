//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigMirror::start → Shutdown::new → subscribe() per background task
//! ConfigMirror::close / drop → Shutdown::trigger
//!     → dispatch loop exits → reconciler exits → session closed
//! ```
//!
//! # Design Decisions
//! - One broadcast signal per mirror; tasks subscribe before they start
//! - Triggering is idempotent and never blocks

pub mod shutdown;

pub use shutdown::Shutdown;
