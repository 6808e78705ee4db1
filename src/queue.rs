/// Serialized inbound event queue.
///
/// On a multi-threaded host, producers (host transport, Wi-Fi driver
/// callbacks) push owned events into an [`EventChannel`] and a single consumer
/// feeds them to the [`Manager`] one at a time. That keeps the step and the
/// host endpoint single-writer without locking the manager itself.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver};

use crate::manager::{Manager, Outcome};
use crate::platform::{AsyncResult, Event, HostMessage, Platform};
use crate::protocol::MsgBuffer;

/// Maximum number of events waiting for the consumer
pub const QUEUE_DEPTH: usize = 8;

/// Queue of inbound events for a single manager
pub type EventChannel = Channel<CriticalSectionRawMutex, QueuedEvent, QUEUE_DEPTH>;
pub type EventReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, QueuedEvent, QUEUE_DEPTH>;

#[derive(Debug, Clone)]
enum QueuedPayload {
    MessageFromHost {
        host_endpoint: u16,
        message_type: u32,
        message: MsgBuffer,
    },
    WifiAsyncResult(AsyncResult),
    Other(u16),
}

/// An inbound event with its payload copied out of the runtime's buffer.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub sender_instance_id: u32,
    payload: QueuedPayload,
}

impl QueuedEvent {
    /// Copy a host message. Returns `None` if the payload is longer than
    /// [`crate::protocol::MAX_MSG_LEN`].
    pub fn host_message(sender_instance_id: u32, msg: &HostMessage<'_>) -> Option<Self> {
        let message = MsgBuffer::from_slice(msg.message).ok()?;
        Some(Self {
            sender_instance_id,
            payload: QueuedPayload::MessageFromHost {
                host_endpoint: msg.host_endpoint,
                message_type: msg.message_type,
                message,
            },
        })
    }

    pub fn wifi_async_result(sender_instance_id: u32, result: AsyncResult) -> Self {
        Self {
            sender_instance_id,
            payload: QueuedPayload::WifiAsyncResult(result),
        }
    }

    pub fn other(sender_instance_id: u32, event_type: u16) -> Self {
        Self {
            sender_instance_id,
            payload: QueuedPayload::Other(event_type),
        }
    }

    /// Borrow the event in the form the manager dispatches on.
    pub fn as_event(&self) -> Event<'_> {
        match &self.payload {
            QueuedPayload::MessageFromHost {
                host_endpoint,
                message_type,
                message,
            } => Event::MessageFromHost(HostMessage {
                host_endpoint: *host_endpoint,
                message_type: *message_type,
                message,
            }),
            QueuedPayload::WifiAsyncResult(result) => Event::WifiAsyncResult(*result),
            QueuedPayload::Other(event_type) => Event::Other(*event_type),
        }
    }
}

/// Handle every event currently queued. Returns how many were processed.
pub fn drain<P: Platform>(channel: &EventChannel, manager: &mut Manager<P>) -> usize {
    let mut processed = 0;
    while let Ok(event) = channel.try_receive() {
        manager.handle_event(event.sender_instance_id, event.as_event());
        processed += 1;
    }
    processed
}

/// Wait for the next event and handle it.
pub async fn process_next<P: Platform>(
    receiver: &EventReceiver<'_>,
    manager: &mut Manager<P>,
) -> Outcome {
    let event = receiver.receive().await;
    manager.handle_event(event.sender_instance_id, event.as_event())
}
