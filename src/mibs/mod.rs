//! Example MIB glue: small, self-contained OID tables an embedder can
//! hand to a [`crate::subagent::SubAgent`] as a starting point. Ported in
//! spirit from the original `mibImps` package, not literally -- these are
//! demonstrations of how to wire callbacks to OIDs, not a complete MIB-II
//! implementation.

pub mod system;
pub mod ucd;
