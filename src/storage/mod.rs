// src/storage/mod.rs

//! Durable collaborators consumed by the scheduler core.
//!
//! - [`table`] defines the partition/row keyed [`Table`] abstraction and the
//!   [`GenericEntity`] payload record.
//! - [`queue`] defines the lease-based [`QueueTransport`] abstraction.
//! - [`memory_table`] and [`memory_queue`] are in-process implementations
//!   used by the local host and by tests.
//!
//! Components receive their tables and queues through constructors (or a
//! [`TableService`] / [`QueueService`] factory); there is no global default.

pub mod memory_queue;
pub mod memory_table;
pub mod queue;
pub mod table;

pub use memory_queue::{MemoryQueue, MemoryQueueService};
pub use memory_table::{MemoryTable, MemoryTableService};
pub use queue::{Lease, QueueMessage, QueueService, QueueTransport};
pub use table::{GenericEntity, Table, TableRow, TableService};
