//! Build-time configuration for the process-wide pool in [`crate::global`].
//!
//! `Pool::new` takes these knobs at runtime instead, so embedders that manage
//! their own pool are not bound by the values here.

use static_assertions::const_assert;

/// Maximum number of banks the process-wide registry can hold.
pub const MAX_BANKS: usize = 8;

/// Number of blocks in each pre-built pool bank (and in each bank created on
/// demand).
pub const BLOCKS_PER_BANK: usize = 32;

const_assert!(MAX_BANKS > 0);
const_assert!(MAX_BANKS <= 32);
const_assert!(BLOCKS_PER_BANK > 0);
