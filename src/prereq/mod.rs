// src/prereq/mod.rs

//! Prerequisite tracking for queued invocations.
//!
//! An invocation may declare that it must run after other invocations have
//! completed successfully. [`PrereqManager`] persists those edges in two
//! tables and tells an [`Activator`] when an invocation has nothing left to
//! wait for. Invocation status is read through a [`StatusOracle`].

pub mod manager;
pub mod status;

pub use manager::{Activator, PREREQ_TABLE_NAME, PrereqManager, SUCCESSOR_TABLE_NAME};
pub use status::{FunctionInstanceStore, StatusOracle};
