//! # ktrepl Testkit
//!
//! Test utilities for ktrepl.
//!
//! This crate provides:
//! - Property-based test generators using proptest
//! - A scripted mock master speaking the replication protocol over TCP
//! - Golden wire vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ktrepl_testkit::prelude::*;
//!
//! #[test]
//! fn test_against_master() {
//!     let master = MockMaster::start(vec![MasterStep::accept(), MasterStep::sync(1)]).unwrap();
//!     // ... connect a slave to master.port()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
