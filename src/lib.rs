//! dir-projector - Director projector and bundle builder
//!
//! Builds projectors from a skeleton (directory, zip, tar, tar.gz or disk
//! image), customizing the executable while or after extracting it, and
//! optionally wraps them in a bundle with a small launcher.

// Enforce strict code quality and reliability
#![deny(
    // Safety
    unsafe_code,

    // Correctness
    missing_debug_implementations,
    unreachable_pub,

    // Future compatibility
    future_incompatible,

    // Rust 2018 idioms
    rust_2018_idioms,
)]
#![warn(
    // Documentation
    missing_docs,

    // Error handling best practices
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo,

    // Performance
    clippy::inefficient_to_string,
    clippy::large_enum_variant,

    // Code clarity and maintainability
    clippy::cognitive_complexity,
    clippy::type_complexity,

    // Best practices
    clippy::clone_on_ref_ptr,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::if_not_else,
    clippy::single_match_else,
    clippy::needless_continue,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod api;
pub mod archive;
pub mod bundle;
pub mod exceptions;
pub mod exit_codes;
pub mod launcher;
pub mod logger;
pub mod macho;
pub mod patcher;
pub mod pe;
pub mod projector;
pub mod utils;
pub mod version;

// Re-export main API functions
pub use api::{BuildManifest, BuildOptions, build, build_projector};
pub use bundle::{Bundle, ResourceOptions};
pub use exceptions::{ProjectorError, Result};
pub use launcher::{LauncherDirectory, LauncherSource, MemoryLaunchers};
pub use projector::{BuildReport, BuildState, ProjectorConfig, ProjectorKind, write};
