/// Step-driven validation state machine and event dispatcher.
///
/// The host walks the agent through INIT → SETUP → VALIDATE with
/// `StepStartCommand`s. SETUP enables Wi-Fi scan monitoring, whose outcome
/// arrives later as an async result event; that event is checked against the
/// step recorded when it arrives, so stale or out-of-order results are
/// reported as failures instead of passes.
///
/// One event is handled to completion before the next. A [`Manager`] owns all
/// mutable agent state; create one per agent instance.
use core::fmt;

use crate::codec::{self, DecodeError};
use crate::comm::{self, SendError};
use crate::platform::{
    AsyncResult, Event, HostMessage, Platform, HOST_ENDPOINT_UNSPECIFIED, RUNTIME_INSTANCE_ID,
    SCAN_MONITOR_COOKIE, WIFI_REQUEST_TYPE_CONFIGURE_SCAN_MONITOR,
};
use crate::protocol::{make_test_result, MessageType, Step, StepStartCommand, TestResult};
use crate::report::{self, AgentReport};

/// Failure texts reported to the host.
pub mod errors {
    pub const INIT_STEP_RECEIVED: &str = "Received StepStartCommand for INIT step";
    pub const SCAN_MONITOR_REQUEST_FAILED: &str = "setupWifiScanMonitoring failed";
    pub const UNKNOWN_ASYNC_RESULT_TYPE: &str = "Unknown async result type received";
    pub const SCAN_MONITOR_RESULT_WRONG_STEP: &str =
        "Received scan monitor result event when step is not SETUP";
    pub const SCAN_MONITOR_SETUP_FAILED: &str = "Wifi scan monitoring setup failed async.";
}

/// Per-instance agent configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Only host messages from this sender instance are accepted
    pub host_sender_id: u32,
    /// Cookie attached to the scan monitor request
    pub scan_monitor_cookie: u32,
}

impl ManagerConfig {
    pub const fn new() -> Self {
        Self {
            host_sender_id: RUNTIME_INSTANCE_ID,
            scan_monitor_cookie: SCAN_MONITOR_COOKIE,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Why an inbound event was discarded without touching agent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Host message from a sender other than the runtime
    SenderMismatch(u32),
    /// Host message payload could not be decoded
    Decode(DecodeError),
    /// Host message type other than STEP_START
    UnknownHostMessageType(u32),
    /// Event type the agent does not handle
    UnknownEventType(u16),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::SenderMismatch(id) => write!(f, "incorrect sender instance id {}", id),
            DropReason::Decode(e) => write!(f, "undecodable StepStartCommand: {}", e),
            DropReason::UnknownHostMessageType(t) => write!(f, "unknown host message type {}", t),
            DropReason::UnknownEventType(t) => write!(f, "unknown event type {:#06x}", t),
        }
    }
}

/// What handling one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to report
    Idle,
    /// Scan monitor request accepted; the result follows the async event
    AwaitingAsync,
    /// Result delivered to the transport
    Sent(TestResult<'static>),
    /// Result built but the send path failed
    SendFailed(TestResult<'static>, SendError),
    /// Result built but deliberately not transmitted
    Withheld(TestResult<'static>),
    /// Event discarded, no state change
    Dropped(DropReason),
}

/// Cross-validation agent state.
pub struct Manager<P: Platform> {
    platform: P,
    config: ManagerConfig,
    step: Step,
    host_endpoint: u16,
}

impl<P: Platform> Manager<P> {
    pub fn new(platform: P, config: ManagerConfig) -> Self {
        Self {
            platform,
            config,
            step: Step::Init,
            host_endpoint: HOST_ENDPOINT_UNSPECIFIED,
        }
    }

    /// Step recorded by the most recent `StepStartCommand`.
    pub fn step(&self) -> Step {
        self.step
    }

    /// Endpoint of the most recent valid host message.
    pub fn host_endpoint(&self) -> u16 {
        self.host_endpoint
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Route one inbound event.
    pub fn handle_event(&mut self, sender_instance_id: u32, event: Event<'_>) -> Outcome {
        match event {
            Event::MessageFromHost(msg) => self.handle_message_from_host(sender_instance_id, &msg),
            Event::WifiAsyncResult(result) => self.handle_wifi_async_result(&result),
            Event::Other(event_type) => {
                log::error!("Unknown event type {:#06x} received when handling event", event_type);
                Outcome::Dropped(DropReason::UnknownEventType(event_type))
            }
        }
    }

    fn handle_message_from_host(
        &mut self,
        sender_instance_id: u32,
        msg: &HostMessage<'_>,
    ) -> Outcome {
        if sender_instance_id != self.config.host_sender_id {
            log::error!("Incorrect sender instance id: {}", sender_instance_id);
            return Outcome::Dropped(DropReason::SenderMismatch(sender_instance_id));
        }

        // Captured before decoding so results sent while handling this
        // message go to its sender.
        self.host_endpoint = msg.host_endpoint;

        match MessageType::from_raw(msg.message_type) {
            Some(MessageType::StepStart) => match codec::decode_step_start(msg.message) {
                Ok(cmd) => self.handle_step_start(cmd),
                Err(e) => {
                    log::error!("Error decoding StepStartCommand: {}", e);
                    Outcome::Dropped(DropReason::Decode(e))
                }
            },
            _ => {
                log::error!("Unknown message type {} for host message", msg.message_type);
                Outcome::Dropped(DropReason::UnknownHostMessageType(msg.message_type))
            }
        }
    }

    /// Apply a step transition. The new step always replaces the old one.
    pub fn handle_step_start(&mut self, cmd: StepStartCommand) -> Outcome {
        log::info!("Starting step {}", cmd.step.as_str());
        report::log_report(&AgentReport::StepStart { step: cmd.step });
        self.step = cmd.step;

        match cmd.step {
            // The host never starts INIT; the failure is built but not sent.
            Step::Init => {
                Outcome::Withheld(make_test_result(false, Some(errors::INIT_STEP_RECEIVED)))
            }
            Step::Setup => {
                if self
                    .platform
                    .configure_scan_monitor_async(true, self.config.scan_monitor_cookie)
                {
                    log::debug!("Scan monitor enable request accepted");
                    Outcome::AwaitingAsync
                } else {
                    log::error!("Scan monitor enable request failed");
                    self.report(make_test_result(false, Some(errors::SCAN_MONITOR_REQUEST_FAILED)))
                }
            }
            Step::Validate => Outcome::Idle,
        }
    }

    /// Check an async Wi-Fi result against the current step and report it.
    pub fn handle_wifi_async_result(&mut self, result: &AsyncResult) -> Outcome {
        log::info!(
            "Wifi async result: type {}, success {}",
            result.request_type,
            result.success
        );

        if result.request_type != WIFI_REQUEST_TYPE_CONFIGURE_SCAN_MONITOR {
            log::error!("Unknown async result type {}", result.request_type);
            return Outcome::Withheld(make_test_result(
                false,
                Some(errors::UNKNOWN_ASYNC_RESULT_TYPE),
            ));
        }

        let test_result = if self.step != Step::Setup {
            make_test_result(false, Some(errors::SCAN_MONITOR_RESULT_WRONG_STEP))
        } else if result.success {
            log::debug!("Wifi scan monitoring setup successfully");
            make_test_result(true, None)
        } else {
            log::error!(
                "Wifi scan monitoring setup failed async w/ error code {}.",
                result.error_code
            );
            make_test_result(false, Some(errors::SCAN_MONITOR_SETUP_FAILED))
        };

        self.report(test_result)
    }

    fn report(&mut self, result: TestResult<'static>) -> Outcome {
        match comm::send_result(&mut self.platform, &result, self.host_endpoint) {
            Ok(_) => {
                report::log_report(&AgentReport::StepResult {
                    step: self.step,
                    code: result.code,
                    error: result.error_message,
                    endpoint: self.host_endpoint,
                });
                Outcome::Sent(result)
            }
            Err(e) => Outcome::SendFailed(result, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_test_result, encode_step_start};
    use crate::platform::mock::MockPlatform;
    use crate::protocol::ResultCode;

    const ENDPOINT: u16 = 0x0042;

    fn manager() -> Manager<MockPlatform> {
        Manager::new(MockPlatform::new(), ManagerConfig::new())
    }

    fn step_start_bytes(step: Step) -> [u8; 2] {
        let mut buf = [0u8; 2];
        let len = encode_step_start(&StepStartCommand { step }, &mut buf).unwrap();
        assert_eq!(len, 2);
        buf
    }

    fn send_step(m: &mut Manager<MockPlatform>, step: Step) -> Outcome {
        send_step_from(m, RUNTIME_INSTANCE_ID, ENDPOINT, step)
    }

    fn send_step_from(
        m: &mut Manager<MockPlatform>,
        sender: u32,
        endpoint: u16,
        step: Step,
    ) -> Outcome {
        let bytes = step_start_bytes(step);
        let msg = HostMessage {
            host_endpoint: endpoint,
            message_type: MessageType::StepStart.as_raw(),
            message: &bytes,
        };
        m.handle_event(sender, Event::MessageFromHost(msg))
    }

    fn scan_monitor_result(success: bool, error_code: u8) -> Event<'static> {
        Event::WifiAsyncResult(AsyncResult {
            request_type: WIFI_REQUEST_TYPE_CONFIGURE_SCAN_MONITOR,
            success,
            error_code,
            cookie: SCAN_MONITOR_COOKIE,
        })
    }

    // ── Step transitions ────────────────────────────────────────────

    #[test]
    fn starts_at_init_with_unspecified_endpoint() {
        let m = manager();
        assert_eq!(m.step(), Step::Init);
        assert_eq!(m.host_endpoint(), HOST_ENDPOINT_UNSPECIFIED);
    }

    #[test]
    fn last_step_start_wins() {
        let steps = [Step::Init, Step::Setup, Step::Validate];
        for &first in &steps {
            for &second in &steps {
                let mut m = manager();
                send_step(&mut m, first);
                send_step(&mut m, second);
                assert_eq!(m.step(), second, "{:?} then {:?}", first, second);
            }
        }
    }

    #[test]
    fn init_step_builds_failure_without_sending() {
        let mut m = manager();
        send_step(&mut m, Step::Validate);
        let outcome = send_step(&mut m, Step::Init);
        assert_eq!(
            outcome,
            Outcome::Withheld(TestResult::failed(errors::INIT_STEP_RECEIVED))
        );
        assert_eq!(m.step(), Step::Init);
        assert!(m.platform().sent.is_empty());
    }

    #[test]
    fn setup_requests_scan_monitor_and_waits() {
        let mut m = manager();
        let outcome = send_step(&mut m, Step::Setup);
        assert_eq!(outcome, Outcome::AwaitingAsync);
        assert_eq!(m.step(), Step::Setup);
        assert_eq!(m.platform().requests, vec![(true, SCAN_MONITOR_COOKIE)]);
        assert!(m.platform().sent.is_empty());
    }

    #[test]
    fn setup_request_rejected_sends_failure_immediately() {
        let mut m = manager();
        m.platform_mut().accept_requests = false;
        let outcome = send_step(&mut m, Step::Setup);

        assert_eq!(
            outcome,
            Outcome::Sent(TestResult::failed(errors::SCAN_MONITOR_REQUEST_FAILED))
        );
        assert_eq!(m.step(), Step::Setup);

        let sent = &m.platform().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].host_endpoint, ENDPOINT);
        assert_eq!(sent[0].message_type, MessageType::StepResult.as_raw());
        let decoded = decode_test_result(&sent[0].bytes).unwrap();
        assert_eq!(decoded.code, ResultCode::Failed);
        assert_eq!(decoded.error_message, Some(errors::SCAN_MONITOR_REQUEST_FAILED));
    }

    #[test]
    fn validate_does_nothing_but_record_step() {
        let mut m = manager();
        let outcome = send_step(&mut m, Step::Validate);
        assert_eq!(outcome, Outcome::Idle);
        assert_eq!(m.step(), Step::Validate);
        assert!(m.platform().requests.is_empty());
        assert!(m.platform().sent.is_empty());
    }

    // ── Async results ───────────────────────────────────────────────

    #[test]
    fn async_success_during_setup_passes() {
        let mut m = manager();
        send_step(&mut m, Step::Setup);
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(true, 0));

        assert_eq!(outcome, Outcome::Sent(TestResult::passed()));
        let sent = &m.platform().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].host_endpoint, ENDPOINT);
        let decoded = decode_test_result(&sent[0].bytes).unwrap();
        assert_eq!(decoded.code, ResultCode::Passed);
        assert!(decoded.error_message.is_none());
    }

    #[test]
    fn async_failure_during_setup_reports_failure() {
        let mut m = manager();
        send_step(&mut m, Step::Setup);
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(false, 5));

        assert_eq!(
            outcome,
            Outcome::Sent(TestResult::failed(errors::SCAN_MONITOR_SETUP_FAILED))
        );
        assert_eq!(m.platform().sent.len(), 1);
    }

    #[test]
    fn async_result_after_setup_skipped_fails() {
        let mut m = manager();
        send_step(&mut m, Step::Validate);
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(true, 0));

        assert_eq!(
            outcome,
            Outcome::Sent(TestResult::failed(errors::SCAN_MONITOR_RESULT_WRONG_STEP))
        );
        let sent = &m.platform().sent;
        assert_eq!(sent.len(), 1);
        let decoded = decode_test_result(&sent[0].bytes).unwrap();
        assert_eq!(decoded.code, ResultCode::Failed);
        assert_eq!(decoded.error_message, Some(errors::SCAN_MONITOR_RESULT_WRONG_STEP));
    }

    #[test]
    fn async_result_before_any_host_message_uses_unspecified_endpoint() {
        let mut m = manager();
        m.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(true, 0));
        let sent = &m.platform().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].host_endpoint, HOST_ENDPOINT_UNSPECIFIED);
    }

    #[test]
    fn unknown_async_result_type_is_withheld() {
        let mut m = manager();
        send_step(&mut m, Step::Setup);
        let outcome = m.handle_event(
            RUNTIME_INSTANCE_ID,
            Event::WifiAsyncResult(AsyncResult {
                request_type: 2,
                success: true,
                error_code: 0,
                cookie: 0,
            }),
        );

        assert_eq!(
            outcome,
            Outcome::Withheld(TestResult::failed(errors::UNKNOWN_ASYNC_RESULT_TYPE))
        );
        assert!(m.platform().sent.is_empty());
        assert_eq!(m.step(), Step::Setup);
    }

    #[test]
    fn send_failure_keeps_step() {
        let mut m = manager();
        send_step(&mut m, Step::Setup);
        m.platform_mut().fail_alloc = true;
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(true, 0));

        assert!(matches!(
            outcome,
            Outcome::SendFailed(_, SendError::OutOfMemory { .. })
        ));
        assert_eq!(m.step(), Step::Setup);
        assert!(m.platform().sent.is_empty());
    }

    // ── Dispatch ────────────────────────────────────────────────────

    #[test]
    fn foreign_sender_changes_nothing() {
        let mut m = manager();
        let outcome = send_step_from(&mut m, 17, ENDPOINT, Step::Setup);

        assert_eq!(outcome, Outcome::Dropped(DropReason::SenderMismatch(17)));
        assert_eq!(m.step(), Step::Init);
        assert_eq!(m.host_endpoint(), HOST_ENDPOINT_UNSPECIFIED);
        assert!(m.platform().requests.is_empty());
        assert!(m.platform().sent.is_empty());
    }

    #[test]
    fn configured_sender_id_is_honored() {
        let config = ManagerConfig {
            host_sender_id: 9,
            ..ManagerConfig::new()
        };
        let mut m = Manager::new(MockPlatform::new(), config);
        assert_eq!(m.config().host_sender_id, 9);
        assert_eq!(m.config().scan_monitor_cookie, SCAN_MONITOR_COOKIE);

        assert!(matches!(
            send_step_from(&mut m, RUNTIME_INSTANCE_ID, ENDPOINT, Step::Validate),
            Outcome::Dropped(DropReason::SenderMismatch(_))
        ));
        assert_eq!(send_step_from(&mut m, 9, ENDPOINT, Step::Validate), Outcome::Idle);
        assert_eq!(m.step(), Step::Validate);
    }

    #[test]
    fn endpoint_follows_latest_host_message() {
        let mut m = manager();
        send_step_from(&mut m, RUNTIME_INSTANCE_ID, 1, Step::Validate);
        send_step_from(&mut m, RUNTIME_INSTANCE_ID, 2, Step::Setup);
        assert_eq!(m.host_endpoint(), 2);

        m.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(true, 0));
        assert_eq!(m.platform().sent[0].host_endpoint, 2);
    }

    #[test]
    fn undecodable_step_start_is_dropped() {
        let mut m = manager();
        send_step(&mut m, Step::Validate);
        let msg = HostMessage {
            host_endpoint: 9,
            message_type: MessageType::StepStart.as_raw(),
            message: &[0x08, 0x09],
        };
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, Event::MessageFromHost(msg));

        assert_eq!(
            outcome,
            Outcome::Dropped(DropReason::Decode(DecodeError::InvalidStep(9)))
        );
        assert_eq!(m.step(), Step::Validate);
        assert!(m.platform().sent.is_empty());
        // The endpoint is captured before decoding.
        assert_eq!(m.host_endpoint(), 9);
    }

    #[test]
    fn step_start_with_overflowing_varint_requests_nothing() {
        let mut m = manager();
        let msg = HostMessage {
            host_endpoint: ENDPOINT,
            message_type: MessageType::StepStart.as_raw(),
            message: &[0x08, 0x81, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02],
        };
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, Event::MessageFromHost(msg));

        assert_eq!(
            outcome,
            Outcome::Dropped(DropReason::Decode(DecodeError::VarintOverflow))
        );
        assert_eq!(m.step(), Step::Init);
        assert!(m.platform().requests.is_empty());
        assert!(m.platform().sent.is_empty());
    }

    #[test]
    fn unknown_host_message_type_is_dropped() {
        let mut m = manager();
        let msg = HostMessage {
            host_endpoint: ENDPOINT,
            message_type: MessageType::StepResult.as_raw(),
            message: &[0x08, 0x01],
        };
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, Event::MessageFromHost(msg));

        assert_eq!(
            outcome,
            Outcome::Dropped(DropReason::UnknownHostMessageType(2))
        );
        assert_eq!(m.step(), Step::Init);
        assert!(m.platform().requests.is_empty());
    }

    #[test]
    fn unknown_event_type_is_dropped() {
        let mut m = manager();
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, Event::Other(0x0401));
        assert_eq!(outcome, Outcome::Dropped(DropReason::UnknownEventType(0x0401)));
        assert!(m.platform().sent.is_empty());
    }

    #[test]
    fn async_result_is_not_treated_as_unknown_event() {
        let mut m = manager();
        send_step(&mut m, Step::Setup);
        let outcome = m.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(true, 0));
        assert!(!matches!(outcome, Outcome::Dropped(_)));
    }

    #[test]
    fn independent_managers_do_not_share_state() {
        let mut a = manager();
        let mut b = manager();
        send_step(&mut a, Step::Setup);
        assert_eq!(a.step(), Step::Setup);
        assert_eq!(b.step(), Step::Init);

        b.handle_event(RUNTIME_INSTANCE_ID, scan_monitor_result(true, 0));
        assert_eq!(
            decode_test_result(&b.platform().sent[0].bytes).unwrap().code,
            ResultCode::Failed
        );
        assert!(a.platform().sent.is_empty());
    }
}
