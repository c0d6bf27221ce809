//! Caching.
//!
//! Two independent mechanisms:
//!
//! | Mechanism | Module | Scope | Key |
//! |-----------|--------|-------|-----|
//! | `Memo` | `memo` | one process, unbounded | canonical argument content (WKT) |
//! | `DiskCache` | `disk` | survives restarts | SHA-256 of function + rendered args |

pub mod memo;
pub mod disk;

pub use memo::{CanonicalKey, Memo, MemoStats};
pub use disk::{DiskCache, InvalidationPolicy};
