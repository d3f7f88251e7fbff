//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MirrorConfig (validated, immutable)
//!     → handed to ConfigMirror::start
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the mirror reads it only at start
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Mirrored data itself lives in the store, never in this file

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::MirrorConfig;
pub use schema::MirrorSettings;
pub use schema::DEFAULT_ROOTS;
pub use schema::ObservabilityConfig;
pub use schema::StoreConfig;
pub use validation::{validate_config, ValidationError};
