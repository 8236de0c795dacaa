//! Standard exit codes for the projector builder binary
//!
//! Each failure class of a build maps onto one of these so wrapper scripts
//! can tell a bad manifest from a bad skeleton.

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// Generic error (avoid using - be more specific)
pub const EXIT_ERROR: i32 = 1;

/// Panic or unrecoverable error
pub const EXIT_PANIC: i32 = 101;

/// Invalid command-line arguments
pub const EXIT_INVALID_ARGS: i32 = 105;

/// I/O error (file not found, permission denied, disk error)
pub const EXIT_IO_ERROR: i32 = 106;

/// Build error not covered by a more specific code
pub const EXIT_BUILD_ERROR: i32 = 108;

/// Configuration error (invalid manifest, missing required fields)
pub const EXIT_CONFIG_ERROR: i32 = 109;

/// Dependency error (missing launcher payloads or disk image tool)
pub const EXIT_DEPENDENCY_ERROR: i32 = 110;

/// Skeleton did not have the expected layout or patch sites
pub const EXIT_SKELETON_ERROR: i32 = 111;

/// Executable format error (PE or Mach-O parsing)
pub const EXIT_FORMAT_ERROR: i32 = 112;

/// Refused to overwrite an existing output
pub const EXIT_OUTPUT_EXISTS: i32 = 113;
