/// Runtime boundary for the agent.
///
/// The hosting sensor-hub runtime delivers events and exposes three services:
/// the asynchronous Wi-Fi scan monitor request, heap allocation for outbound
/// buffers, and the host message transport. The agent reaches them only
/// through [`Platform`], so the state machine runs unchanged under test.

/// Sender instance id the runtime uses for messages it relays from the host
pub const RUNTIME_INSTANCE_ID: u32 = 0;

/// Event type: message from the host
pub const EVENT_MESSAGE_FROM_HOST: u16 = 0x0001;

/// Event type: completion of an asynchronous Wi-Fi request
pub const EVENT_WIFI_ASYNC_RESULT: u16 = 0x0300;

/// Async request type: scan monitor configuration
pub const WIFI_REQUEST_TYPE_CONFIGURE_SCAN_MONITOR: u8 = 1;

/// Host endpoint used before any host message has been seen
pub const HOST_ENDPOINT_UNSPECIFIED: u16 = 0xFFFE;

/// Cookie passed with the scan monitor request. Correlation relies on the
/// request type, so the value itself is never checked.
pub const SCAN_MONITOR_COOKIE: u32 = 0;

/// A message relayed from the host.
#[derive(Debug, Clone, Copy)]
pub struct HostMessage<'a> {
    /// Host-side session that sent the message
    pub host_endpoint: u16,
    /// Raw message type tag (see [`crate::protocol::MessageType`])
    pub message_type: u32,
    /// Encoded payload
    pub message: &'a [u8],
}

/// Completion of an asynchronous Wi-Fi request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncResult {
    pub request_type: u8,
    pub success: bool,
    /// Runtime error code, meaningful only when `success` is false
    pub error_code: u8,
    pub cookie: u32,
}

/// Inbound event as delivered by the runtime's dispatch loop.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    MessageFromHost(HostMessage<'a>),
    WifiAsyncResult(AsyncResult),
    /// Any event type the agent does not subscribe to
    Other(u16),
}

impl Event<'_> {
    pub fn event_type(&self) -> u16 {
        match self {
            Event::MessageFromHost(_) => EVENT_MESSAGE_FROM_HOST,
            Event::WifiAsyncResult(_) => EVENT_WIFI_ASYNC_RESULT,
            Event::Other(event_type) => *event_type,
        }
    }
}

/// Services the hosting runtime provides to the agent.
pub trait Platform {
    /// Heap buffer handed to the transport on send.
    type Buffer: AsMut<[u8]>;

    /// Ask the Wi-Fi subsystem to enable or disable scan monitoring.
    ///
    /// Returns whether the request was accepted. The outcome arrives later as
    /// an [`Event::WifiAsyncResult`].
    fn configure_scan_monitor_async(&mut self, enable: bool, cookie: u32) -> bool;

    /// Allocate a buffer of exactly `len` bytes, or `None` when out of memory.
    fn alloc(&mut self, len: usize) -> Option<Self::Buffer>;

    /// Send the first `len` bytes of `message` to `host_endpoint`.
    ///
    /// The transport owns the buffer from here on and releases it after
    /// transmission, whether or not the send succeeds.
    fn send_message_to_host(
        &mut self,
        message: Self::Buffer,
        len: usize,
        message_type: u32,
        host_endpoint: u16,
    ) -> bool;
}
