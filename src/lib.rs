//! An embeddable SNMP v1/v2c/v3 agent.
//!
//! A process links this crate to expose its own counters and knobs over
//! SNMP: build a [`pdu::PduControlItem`] table, hand it to a [`subagent::SubAgent`],
//! register that sub-agent with a [`master::MasterAgent`], and drive the
//! whole thing from a [`server::SnmpServer`] over any [`server::Transport`]
//! (a concrete UDP one is provided in [`transport`]).

pub mod codec;
pub mod config;
pub mod master;
pub mod mibs;
pub mod oid;
pub mod pdu;
pub mod security;
pub mod server;
pub mod subagent;
pub mod transport;
pub mod usm;
pub mod utils;

pub mod error;

pub use error::{Error, Result};

/// Crate version information, surfaced over SNMP via the example MIB glue.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
