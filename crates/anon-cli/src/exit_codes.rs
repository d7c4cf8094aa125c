//! Exit codes of the `anon` binary. Part of the public contract.

pub const SUCCESS: i32 = 0;
pub const CHECK_FAILED: i32 = 1; // Datasets missing or unreadable
pub const INTERNAL_ERROR: i32 = 2; // Config, engine or state store error
