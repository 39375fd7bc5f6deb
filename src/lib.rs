//! Sobit ECR - Main Library
//!
//! This crate hosts the interactive terminal client for the ECR
//! transaction service and the helpers its binaries share.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config, token store, runner)
//! - **ecr_session**: Session engine (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use sobit_ecr::bin_common::{load_config_from_env, ConfigType, FileConfig};
//!
//! let path = load_config_from_env(ConfigType::Session);
//! let config = FileConfig::load_or_default(&path).unwrap();
//! ```

// Re-export workspace libraries for convenience
pub use ecr_session;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables
    //!
    //! Configuration loading, token persistence, terminal result decoding
    //! and the startup/shutdown runner shared by the binaries.

    pub mod cli;
    pub mod runner;
    pub mod terminal;
    pub mod token_store;

    pub use cli::{load_config_from_env, parse_args, require_env, ConfigType, FileConfig};
    pub use runner::{BinaryRunner, RunConfig};
    pub use terminal::{ClientCommand, TransactionResult};
    pub use token_store::TokenStore;
}
