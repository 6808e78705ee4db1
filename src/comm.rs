/// Host transport adapter.
///
/// Turns a [`TestResult`] into a STEP_RESULT host message: size, allocate,
/// encode, send. Every failure is logged here and reported to the caller;
/// nothing is retried.
use core::fmt;

use crate::codec::{self, EncodeError};
use crate::platform::Platform;
use crate::protocol::{MessageType, TestResult};

/// Why a result did not reach the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Encoded size could not be computed
    Size(EncodeError),
    /// Runtime heap could not provide the buffer
    OutOfMemory { len: usize },
    /// Encoding into the allocated buffer failed
    Encode(EncodeError),
    /// Transport refused the message
    Transport,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Size(e) => write!(f, "could not size test result: {}", e),
            SendError::OutOfMemory { len } => write!(f, "out of memory allocating {} bytes", len),
            SendError::Encode(e) => write!(f, "could not encode test result: {}", e),
            SendError::Transport => write!(f, "could not send message to host"),
        }
    }
}

/// Encode `result` and send it to `host_endpoint` as a STEP_RESULT message.
/// Returns the number of bytes handed to the transport.
pub fn send_result<P: Platform>(
    platform: &mut P,
    result: &TestResult<'_>,
    host_endpoint: u16,
) -> Result<usize, SendError> {
    let len = codec::test_result_encoded_len(result).map_err(|e| {
        log::error!("Could not get encoded size of test result message: {}", e);
        SendError::Size(e)
    })?;

    let Some(mut buffer) = platform.alloc(len) else {
        log::error!("Out of memory allocating {} byte host message", len);
        return Err(SendError::OutOfMemory { len });
    };

    // On failure the buffer is dropped here, which releases it.
    let written = codec::encode_test_result(result, buffer.as_mut()).map_err(|e| {
        log::error!("Could not encode test result message: {}", e);
        SendError::Encode(e)
    })?;

    if !platform.send_message_to_host(
        buffer,
        written,
        MessageType::StepResult.as_raw(),
        host_endpoint,
    ) {
        log::error!("Could not send message to host endpoint {}", host_endpoint);
        return Err(SendError::Transport);
    }

    Ok(written)
}
