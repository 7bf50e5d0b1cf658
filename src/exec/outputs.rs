// src/exec/outputs.rs

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::errors::Result;
use crate::exec::backend::{FunctionOutput, OutputSink};
use crate::storage::queue::{QueueService, QueueTransport};
use crate::triggers::causality::{BlobWrittenMessage, stamp_owner};
use crate::types::InvocationId;

/// Publishes outputs onto queues of a [`QueueService`].
///
/// Queue outputs go to the named queue with the producer stamped in as the
/// causality parent. Blob outputs become notifications on the host's blob
/// notification queue.
#[derive(Debug, Clone)]
pub struct QueueOutputSink<S> {
    queues: S,
    blob_notification_queue: String,
}

impl<S: QueueService> QueueOutputSink<S> {
    pub fn new(queues: S, blob_notification_queue: impl Into<String>) -> Self {
        Self {
            queues,
            blob_notification_queue: blob_notification_queue.into(),
        }
    }

    async fn publish_output(&self, producer: InvocationId, output: &FunctionOutput) -> Result<()> {
        let (queue_name, payload) = match output {
            FunctionOutput::Queue { queue, payload } => {
                (queue.as_str(), stamp_owner(payload, producer))
            }
            FunctionOutput::Blob(path) => (
                self.blob_notification_queue.as_str(),
                BlobWrittenMessage::new(path, Some(producer)).to_json()?,
            ),
        };

        let queue = self.queues.queue(queue_name);
        queue.create_if_not_exists().await?;
        let id = queue.add_message(payload).await?;
        debug!(%producer, queue = %queue_name, message = %id, "output published");
        Ok(())
    }
}

impl<S: QueueService> OutputSink for QueueOutputSink<S> {
    fn publish<'a>(
        &'a self,
        producer: InvocationId,
        output: &'a FunctionOutput,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.publish_output(producer, output))
    }
}
