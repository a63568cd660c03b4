//! Internal client implementation.

use std::sync::Arc;

use uuid::Uuid;

use crate::flags::FlagStore;
use crate::pipeline::Pipeline;
use crate::queue::EventQueue;
use crate::transport::TransportClient;
use crate::types::Event;

pub(crate) struct ClientInner {
    /// Backend host the REST transport talks to.
    pub host: String,

    /// Drop every capture without delivery.
    pub disabled: bool,

    /// Log every accepted event at `debug`.
    pub debug: bool,

    /// Before-send processors.
    pub pipeline: Pipeline,

    /// Delivery queue. `None` when disabled.
    pub queue: Option<EventQueue>,

    /// Flag definitions and remote decisions.
    pub flags: FlagStore,

    /// Transport used by the queue and flag store. `None` when disabled.
    pub transport: Option<Arc<dyn TransportClient>>,
}

impl ClientInner {
    /// Runs the pipeline and enqueues the result.
    ///
    /// Returns the event uuid when the event was accepted.
    pub(crate) fn enqueue(&self, event: Event) -> Option<Uuid> {
        let queue = self.queue.as_ref()?;
        let event = self.pipeline.run(event)?;
        let uuid = event.uuid();

        if self.debug {
            tracing::debug!(
                event = event.event(),
                distinct_id = event.distinct_id().unwrap_or("<anonymous>"),
                %uuid,
                "captured event"
            );
        }

        queue.push(event).then_some(uuid)
    }
}
