/// Binary wire codec for host messages.
///
/// Messages use the protocol-buffers (proto2) wire format:
///
/// ```text
/// StepStartCommand { optional Step step = 1; }          // varint
/// TestResult { optional Code code = 1;                  // varint, always emitted
///              optional bytes errorMessage = 2; }       // length-delimited
/// ```
///
/// Encoding is two-phase: size first, then write into a buffer of exactly that
/// size. The error text is only touched in the write pass.
use core::fmt;

use crate::protocol::{ResultCode, Step, StepStartCommand, TestResult, MAX_MSG_LEN};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

const STEP_FIELD: u32 = 1;
const CODE_FIELD: u32 = 1;
const ERROR_MESSAGE_FIELD: u32 = 2;

/// Longest valid varint (64-bit value, 7 bits per byte)
const MAX_VARINT_LEN: usize = 10;

/// Inbound buffer could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer ended inside a field
    Truncated,
    /// Varint longer than 10 bytes or wider than 64 bits
    VarintOverflow,
    /// Wire type 3, 4, 6 or 7
    InvalidWireType(u8),
    /// Field number 0 or wider than 29 bits
    InvalidFieldNumber,
    /// Known field carried with the wrong wire type
    WrongWireType { field: u32, wire_type: u8 },
    /// Step value outside the schema
    InvalidStep(u64),
    /// Result code outside the schema
    InvalidCode(u64),
    /// Error message bytes are not UTF-8
    InvalidUtf8,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "buffer truncated"),
            DecodeError::VarintOverflow => write!(f, "varint overflow"),
            DecodeError::InvalidWireType(wt) => write!(f, "invalid wire type {}", wt),
            DecodeError::InvalidFieldNumber => write!(f, "invalid field number"),
            DecodeError::WrongWireType { field, wire_type } => {
                write!(f, "field {} has wrong wire type {}", field, wire_type)
            }
            DecodeError::InvalidStep(v) => write!(f, "invalid step {}", v),
            DecodeError::InvalidCode(v) => write!(f, "invalid result code {}", v),
            DecodeError::InvalidUtf8 => write!(f, "error message is not UTF-8"),
        }
    }
}

/// Outbound message could not be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Destination buffer cannot hold the encoded message
    BufferTooSmall { needed: usize, available: usize },
    /// Encoded message exceeds [`MAX_MSG_LEN`]
    MessageTooLong { len: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small ({} needed, {} available)", needed, available)
            }
            EncodeError::MessageTooLong { len } => {
                write!(f, "message of {} bytes exceeds {} byte limit", len, MAX_MSG_LEN)
            }
        }
    }
}

// ── Decoding ───────────────────────────────────────────────────────────

/// Cursor over an inbound buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self.buf.get(self.pos).ok_or(DecodeError::Truncated)?;
            self.pos += 1;
            // The tenth byte holds only bit 63.
            if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
                return Err(DecodeError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow)
    }

    /// Read a field key, returning (field number, wire type).
    fn read_key(&mut self) -> Result<(u32, u8), DecodeError> {
        let key = self.read_varint()?;
        let wire_type = (key & 0x7) as u8;
        let field = key >> 3;
        if field == 0 || field > 0x1FFF_FFFF {
            return Err(DecodeError::InvalidFieldNumber);
        }
        Ok((field as u32, wire_type))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::Truncated)?;
        self.read_slice(len)
    }

    /// Skip over the value of a field we do not know.
    fn skip(&mut self, wire_type: u8) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => self.read_varint().map(|_| ()),
            WIRE_FIXED64 => self.read_slice(8).map(|_| ()),
            WIRE_LEN => self.read_len_delimited().map(|_| ()),
            WIRE_FIXED32 => self.read_slice(4).map(|_| ()),
            other => Err(DecodeError::InvalidWireType(other)),
        }
    }
}

/// Decode a `StepStartCommand`. A missing step field decodes to INIT.
pub fn decode_step_start(buf: &[u8]) -> Result<StepStartCommand, DecodeError> {
    let mut reader = Reader::new(buf);
    let mut step = Step::Init;

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_key()?;
        match (field, wire_type) {
            (STEP_FIELD, WIRE_VARINT) => {
                let raw = reader.read_varint()?;
                step = Step::from_wire(raw).ok_or(DecodeError::InvalidStep(raw))?;
            }
            (STEP_FIELD, _) => {
                return Err(DecodeError::WrongWireType { field, wire_type });
            }
            _ => reader.skip(wire_type)?,
        }
    }

    Ok(StepStartCommand { step })
}

/// Decode a `TestResult`, borrowing the error text from `buf`.
/// A missing code field decodes to FAILED.
pub fn decode_test_result(buf: &[u8]) -> Result<TestResult<'_>, DecodeError> {
    let mut reader = Reader::new(buf);
    let mut result = TestResult {
        code: ResultCode::Failed,
        error_message: None,
    };

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_key()?;
        match (field, wire_type) {
            (CODE_FIELD, WIRE_VARINT) => {
                let raw = reader.read_varint()?;
                result.code = ResultCode::from_wire(raw).ok_or(DecodeError::InvalidCode(raw))?;
            }
            (ERROR_MESSAGE_FIELD, WIRE_LEN) => {
                let bytes = reader.read_len_delimited()?;
                let text = core::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
                result.error_message = Some(text);
            }
            (CODE_FIELD, _) | (ERROR_MESSAGE_FIELD, _) => {
                return Err(DecodeError::WrongWireType { field, wire_type });
            }
            _ => reader.skip(wire_type)?,
        }
    }

    Ok(result)
}

// ── Encoding ───────────────────────────────────────────────────────────

/// Number of bytes `value` occupies as a varint.
const fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

const fn key(field: u32, wire_type: u8) -> u64 {
    ((field as u64) << 3) | wire_type as u64
}

/// Cursor over an outbound buffer.
struct Writer<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Writer<'b> {
    fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_byte(&mut self, byte: u8) -> Result<(), EncodeError> {
        let available = self.buf.len();
        let slot = self.buf.get_mut(self.pos).ok_or(EncodeError::BufferTooSmall {
            needed: self.pos + 1,
            available,
        })?;
        *slot = byte;
        self.pos += 1;
        Ok(())
    }

    fn put_varint(&mut self, mut value: u64) -> Result<(), EncodeError> {
        while value >= 0x80 {
            self.put_byte((value as u8 & 0x7F) | 0x80)?;
            value >>= 7;
        }
        self.put_byte(value as u8)
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let end = self.pos + bytes.len();
        let available = self.buf.len();
        let dest = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(EncodeError::BufferTooSmall { needed: end, available })?;
        dest.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

/// Write the error text as a length-prefixed byte field.
///
/// Called only from the write pass; the size pass uses the string length.
fn encode_error_message(writer: &mut Writer<'_>, message: &str) -> Result<(), EncodeError> {
    writer.put_varint(key(ERROR_MESSAGE_FIELD, WIRE_LEN))?;
    writer.put_varint(message.len() as u64)?;
    writer.put_bytes(message.as_bytes())
}

/// Exact encoded size of a `TestResult`. Fails if the message would exceed
/// [`MAX_MSG_LEN`].
pub fn test_result_encoded_len(result: &TestResult<'_>) -> Result<usize, EncodeError> {
    let mut len = varint_len(key(CODE_FIELD, WIRE_VARINT)) + varint_len(result.code.as_wire());
    if let Some(message) = result.error_message {
        len += varint_len(key(ERROR_MESSAGE_FIELD, WIRE_LEN))
            + varint_len(message.len() as u64)
            + message.len();
    }
    if len > MAX_MSG_LEN {
        return Err(EncodeError::MessageTooLong { len });
    }
    Ok(len)
}

/// Encode a `TestResult` into `buf`. Returns the number of bytes written.
pub fn encode_test_result(result: &TestResult<'_>, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut writer = Writer::new(buf);
    writer.put_varint(key(CODE_FIELD, WIRE_VARINT))?;
    writer.put_varint(result.code.as_wire())?;
    if let Some(message) = result.error_message {
        encode_error_message(&mut writer, message)?;
    }
    Ok(writer.pos)
}

/// Exact encoded size of a `StepStartCommand`.
pub fn step_start_encoded_len(cmd: &StepStartCommand) -> usize {
    varint_len(key(STEP_FIELD, WIRE_VARINT)) + varint_len(cmd.step.as_wire())
}

/// Encode a `StepStartCommand` into `buf`. Returns the number of bytes written.
pub fn encode_step_start(cmd: &StepStartCommand, buf: &mut [u8]) -> Result<usize, EncodeError> {
    let mut writer = Writer::new(buf);
    writer.put_varint(key(STEP_FIELD, WIRE_VARINT))?;
    writer.put_varint(cmd.step.as_wire())?;
    Ok(writer.pos)
}
