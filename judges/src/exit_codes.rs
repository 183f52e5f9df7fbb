//! Stable exit codes for the `judges` CLI.

/// Run finished cleanly (or with errors suppressed by `--quiet`).
pub const OK: i32 = 0;
/// Configuration error or a run that ended with unresolved errors.
pub const FAILURE: i32 = 1;
