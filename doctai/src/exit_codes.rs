//! Stable exit codes for the doctai CLI.

/// The run succeeded (every executed script passed).
pub const OK: i32 = 0;
/// The run completed with a failure: a stage error or a failed script.
pub const FAILED: i32 = 1;
/// Invalid configuration or arguments; nothing was run.
pub const INVALID: i32 = 2;
/// Interrupted by Ctrl-C.
pub const INTERRUPTED: i32 = 130;
