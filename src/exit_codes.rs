//! Process exit codes.
//!
//! - `0`: every target succeeded or was skipped
//! - `1`: fatal error (configuration, authentication, invalid field path,
//!   unreadable input set), or invalid rows for `targets`
//! - `2`: invalid command-line usage (reported by clap)
//! - `3`: the batch finished but at least one repository failed

pub const SUCCESS: u8 = 0;
pub const ERROR: u8 = 1;
pub const USAGE: u8 = 2;
pub const FAILURES: u8 = 3;
