//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ClusterConfig (validated, immutable)
//!     → shared by value with the coordinator and every worker
//! ```
//!
//! # Design Decisions
//! - Config is immutable for the lifetime of the process
//! - All fields have defaults to allow minimal (or absent) config files
//! - Workers are re-executed with the coordinator's arguments, so they load
//!   exactly the same file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ClusterConfig;
pub use schema::ClusterSection;
pub use schema::ObservabilityConfig;
pub use schema::ServerConfig;
pub use schema::WorkerConfig;
