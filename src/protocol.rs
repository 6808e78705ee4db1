/// Message types exchanged between the cross-validation agent and the host.
///
/// Inbound: `StepStartCommand` framed as [`MessageType::StepStart`].
/// Outbound: `TestResult` framed as [`MessageType::StepResult`].
/// The binary encoding lives in [`crate::codec`].
use heapless::Vec;
use serde::Serialize;

/// Validation phase requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Init,
    Setup,
    Validate,
}

impl Step {
    /// Map a wire enum value to a step. Values outside the schema yield `None`.
    pub const fn from_wire(value: u64) -> Option<Self> {
        match value {
            0 => Some(Step::Init),
            1 => Some(Step::Setup),
            2 => Some(Step::Validate),
            _ => None,
        }
    }

    pub const fn as_wire(self) -> u64 {
        match self {
            Step::Init => 0,
            Step::Setup => 1,
            Step::Validate => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Init => "INIT",
            Step::Setup => "SETUP",
            Step::Validate => "VALIDATE",
        }
    }
}

/// Host channel message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Undefined,
    StepStart,
    StepResult,
}

impl MessageType {
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(MessageType::Undefined),
            1 => Some(MessageType::StepStart),
            2 => Some(MessageType::StepResult),
            _ => None,
        }
    }

    pub const fn as_raw(self) -> u32 {
        match self {
            MessageType::Undefined => 0,
            MessageType::StepStart => 1,
            MessageType::StepResult => 2,
        }
    }
}

/// Pass/fail code carried by a [`TestResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Passed,
    Failed,
}

impl ResultCode {
    pub const fn from_wire(value: u64) -> Option<Self> {
        match value {
            0 => Some(ResultCode::Passed),
            1 => Some(ResultCode::Failed),
            _ => None,
        }
    }

    pub const fn as_wire(self) -> u64 {
        match self {
            ResultCode::Passed => 0,
            ResultCode::Failed => 1,
        }
    }
}

/// Host → agent: begin a validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepStartCommand {
    pub step: Step,
}

/// Agent → host: outcome of a validation step.
///
/// The error text is borrowed, not copied. It is written to the wire only in
/// the second encode pass, so it must outlive the encode call. Every message
/// the agent itself produces is a `'static` literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestResult<'a> {
    pub code: ResultCode,
    pub error_message: Option<&'a str>,
}

impl<'a> TestResult<'a> {
    pub const fn passed() -> Self {
        Self {
            code: ResultCode::Passed,
            error_message: None,
        }
    }

    pub const fn failed(message: &'a str) -> Self {
        Self {
            code: ResultCode::Failed,
            error_message: Some(message),
        }
    }
}

/// Build a test result from a success flag and optional error text.
///
/// On success the message is ignored. On failure it is attached when present.
pub fn make_test_result(success: bool, message: Option<&str>) -> TestResult<'_> {
    if success {
        TestResult::passed()
    } else {
        TestResult {
            code: ResultCode::Failed,
            error_message: message,
        }
    }
}

/// Maximum size of an encoded host message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for encoded host messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;
