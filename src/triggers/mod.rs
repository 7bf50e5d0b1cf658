// src/triggers/mod.rs

//! Trigger definitions, the trigger index, and construction of invocation
//! requests from trigger events.

pub mod blob_path;
pub mod causality;
pub mod invocation;
pub mod model;
pub mod trigger_map;

pub use blob_path::{BlobPath, BlobPathError, BlobPattern};
pub use causality::{BlobWriteLog, BlobWrittenMessage, PARENT_ID_PROPERTY};
pub use invocation::{
    BindingSource, InvocationBuilder, InvocationRequest, NameParameterBinder, ParameterBinder,
    TriggerReason,
};
pub use model::{
    BlobTrigger, FunctionDefinition, FunctionLocation, QueueTrigger, TimerTrigger, Trigger,
};
pub use trigger_map::{TriggerMap, should_invoke_blob_trigger};
