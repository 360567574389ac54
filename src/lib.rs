//! Poolscope: bounded, read-only exploration of storage pool structures.
//!
//! The crate turns two kinds of effectively unbounded on-disk structures,
//! block-pointer trees and allocate/free extent logs, into capped,
//! cursor-resumable views. Decoding of individual records is delegated to a
//! [`provider::PoolAccess`] implementation; [`session::PoolSession`]
//! serializes access to it and [`dashboard`] serves the views over HTTP.

pub mod dashboard;
pub mod error;
pub mod explore;
pub mod provider;
pub mod session;
pub mod types;

pub use error::{ErrorCode, ExplorerError, Result};
pub use explore::{ExploreLimits, Explorer, Outcome};
pub use session::PoolSession;
