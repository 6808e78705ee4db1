/// One-line NDJSON diagnostics for the serial log.
///
/// The binary result goes to the host; the same event is mirrored here as a
/// JSON line so a bench operator can follow a run from the runtime log alone.
use serde::Serialize;

use crate::protocol::{ResultCode, Step};

/// Maximum size of a rendered report line
pub const MAX_REPORT_LEN: usize = 192;

/// Diagnostic event emitted by the agent
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum AgentReport<'a> {
    /// Host started a step
    #[serde(rename = "step_start")]
    StepStart { step: Step },
    /// A test result was delivered to the host
    #[serde(rename = "step_result")]
    StepResult {
        step: Step,
        code: ResultCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a str>,
        endpoint: u16,
    },
}

/// Render a report as a single JSON object, or None if it does not fit.
pub fn render<'b>(
    report: &AgentReport<'_>,
    buf: &'b mut [u8; MAX_REPORT_LEN],
) -> Option<&'b str> {
    let len = serde_json_core::to_slice(report, buf).ok()?;
    core::str::from_utf8(&buf[..len]).ok()
}

/// Log a report at debug level.
pub fn log_report(report: &AgentReport<'_>) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let mut buf = [0u8; MAX_REPORT_LEN];
    match render(report, &mut buf) {
        Some(line) => log::debug!("{}", line),
        None => log::warn!("Report did not fit in {} bytes", MAX_REPORT_LEN),
    }
}
