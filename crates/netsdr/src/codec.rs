//! NetSDR binary message framing.
//!
//! Every NetSDR message starts with a 16-bit little-endian header:
//!
//! ```text
//!  15  14  13  12                                      0
//! +-----------+----------------------------------------+
//! |   type    |        total length (header incl.)     |
//! +-----------+----------------------------------------+
//! ```
//!
//! The header alone tells a reader both the kind of message and exactly where
//! it ends, so frames can be cut out of a TCP byte stream without any other
//! delimiter (see [`split_frame`]).
//!
//! # Layouts
//!
//! ```text
//! Control item:  [header:2][code:2 LE i16][parameters...]
//! Data item:     [header:2][sequence:2 LE u16][body...]
//! ```
//!
//! All functions here are pure: no I/O, no state.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use netsdr_core::error::{CodecError, MAX_FRAME_LEN, Result};

/// Size of the message header in bytes.
pub const HEADER_SIZE: usize = 2;

/// Size of the control-item code / data-item sequence field in bytes.
const ITEM_FIELD_SIZE: usize = 2;

/// Mask for the 13-bit length field.
const LENGTH_MASK: u16 = 0x1FFF;

/// Message type from the top 3 bits of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Host asks the receiver to change a setting.
    SetControlItem,
    /// Current value of a setting (request or reply).
    CurrentControlItem,
    /// Allowed range of a setting.
    ControlItemRange,
    /// Acknowledgement.
    Ack,
    /// Data item, channel 0.
    DataItem0,
    /// Data item, channel 1.
    DataItem1,
    /// Data item, channel 2.
    DataItem2,
    /// Data item, channel 3.
    DataItem3,
}

impl MessageType {
    /// The 3-bit wire value.
    pub fn bits(self) -> u8 {
        match self {
            MessageType::SetControlItem => 0,
            MessageType::CurrentControlItem => 1,
            MessageType::ControlItemRange => 2,
            MessageType::Ack => 3,
            MessageType::DataItem0 => 4,
            MessageType::DataItem1 => 5,
            MessageType::DataItem2 => 6,
            MessageType::DataItem3 => 7,
        }
    }

    /// Decode the 3-bit wire value. Only the low three bits are used, so
    /// every input maps to a type.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => MessageType::SetControlItem,
            1 => MessageType::CurrentControlItem,
            2 => MessageType::ControlItemRange,
            3 => MessageType::Ack,
            4 => MessageType::DataItem0,
            5 => MessageType::DataItem1,
            6 => MessageType::DataItem2,
            _ => MessageType::DataItem3,
        }
    }

    /// Whether messages of this type carry a control-item code.
    pub fn is_control_item(self) -> bool {
        self.bits() < 4
    }

    /// Whether messages of this type carry a sequence number and samples.
    pub fn is_data_item(self) -> bool {
        !self.is_control_item()
    }
}

/// Identifier of a receiver setting.
///
/// The code space is open; values without a named variant decode to
/// [`ControlItemCode::Unknown`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlItemCode {
    /// Run/stop state of the receiver and capture mode -- 0x0018.
    ReceiverState,
    /// Tuned frequency of a channel -- 0x0020.
    ReceiverFrequency,
    /// RF filter selection -- 0x0044.
    RfFilter,
    /// A/D converter modes (dither, gain) -- 0x008A.
    AdModes,
    /// I/Q output sample rate -- 0x00B8.
    IqOutputDataSampleRate,
    /// Any other code.
    Unknown(i16),
}

impl ControlItemCode {
    /// The 16-bit wire value.
    pub fn value(self) -> i16 {
        match self {
            ControlItemCode::ReceiverState => 0x0018,
            ControlItemCode::ReceiverFrequency => 0x0020,
            ControlItemCode::RfFilter => 0x0044,
            ControlItemCode::AdModes => 0x008A,
            ControlItemCode::IqOutputDataSampleRate => 0x00B8,
            ControlItemCode::Unknown(v) => v,
        }
    }

    /// Map a wire value to a code.
    pub fn from_value(value: i16) -> Self {
        match value {
            0x0018 => ControlItemCode::ReceiverState,
            0x0020 => ControlItemCode::ReceiverFrequency,
            0x0044 => ControlItemCode::RfFilter,
            0x008A => ControlItemCode::AdModes,
            0x00B8 => ControlItemCode::IqOutputDataSampleRate,
            other => ControlItemCode::Unknown(other),
        }
    }
}

/// A decoded message, borrowing its payload from the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    /// SetControlItem, CurrentControlItem, ControlItemRange or Ack.
    Control {
        /// Message type from the header.
        msg_type: MessageType,
        /// Control-item code.
        code: ControlItemCode,
        /// Bytes after the code.
        parameters: &'a [u8],
    },
    /// DataItem0..3.
    Data {
        /// Message type from the header.
        msg_type: MessageType,
        /// Sequence number.
        sequence: u16,
        /// Bytes after the sequence number.
        body: &'a [u8],
    },
}

impl<'a> Message<'a> {
    /// The message type from the header.
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Control { msg_type, .. } | Message::Data { msg_type, .. } => *msg_type,
        }
    }

    /// The control-item code; `None` for data items.
    pub fn code(&self) -> Option<ControlItemCode> {
        match self {
            Message::Control { code, .. } => Some(*code),
            Message::Data { .. } => None,
        }
    }

    /// The sequence number; `None` for control items.
    pub fn sequence(&self) -> Option<u16> {
        match self {
            Message::Control { .. } => None,
            Message::Data { sequence, .. } => Some(*sequence),
        }
    }

    /// Parameters (control items) or body (data items).
    pub fn body(&self) -> &'a [u8] {
        match self {
            Message::Control { parameters, .. } => parameters,
            Message::Data { body, .. } => body,
        }
    }
}

/// Pack a type and total length into header bytes.
fn encode_header(msg_type: MessageType, length: usize) -> [u8; HEADER_SIZE] {
    let word = ((msg_type.bits() as u16) << 13) | (length as u16 & LENGTH_MASK);
    word.to_le_bytes()
}

/// Check a total length against the 13-bit ceiling.
fn check_length(length: usize) -> std::result::Result<(), CodecError> {
    if length > MAX_FRAME_LEN {
        return Err(CodecError::LengthExceeded { length });
    }
    Ok(())
}

/// Encode a control-item message.
///
/// Fails with [`CodecError::KindMismatch`] if `msg_type` is a data-item type,
/// or [`CodecError::LengthExceeded`] if the message would exceed 8191 bytes.
///
/// # Example
///
/// ```
/// use netsdr::codec::{encode_control_item, ControlItemCode, MessageType};
///
/// let msg = encode_control_item(
///     MessageType::SetControlItem,
///     ControlItemCode::RfFilter,
///     &[0x00, 0x00],
/// ).unwrap();
/// assert_eq!(msg, [0x06, 0x00, 0x44, 0x00, 0x00, 0x00]);
/// ```
pub fn encode_control_item(
    msg_type: MessageType,
    code: ControlItemCode,
    parameters: &[u8],
) -> Result<Vec<u8>> {
    if !msg_type.is_control_item() {
        return Err(CodecError::KindMismatch(format!("{:?}", msg_type)).into());
    }
    let length = HEADER_SIZE + ITEM_FIELD_SIZE + parameters.len();
    check_length(length)?;

    let mut buf = BytesMut::with_capacity(length);
    buf.put_slice(&encode_header(msg_type, length));
    buf.put_i16_le(code.value());
    buf.put_slice(parameters);
    Ok(buf.to_vec())
}

/// Encode a data-item message.
///
/// The codec does not interpret `parameters`; by convention they start with a
/// 2-byte sequence number followed by the sample body.
pub fn encode_data_item(msg_type: MessageType, parameters: &[u8]) -> Result<Vec<u8>> {
    if !msg_type.is_data_item() {
        return Err(CodecError::KindMismatch(format!("{:?}", msg_type)).into());
    }
    let length = HEADER_SIZE + parameters.len();
    check_length(length)?;

    let mut buf = BytesMut::with_capacity(length);
    buf.put_slice(&encode_header(msg_type, length));
    buf.put_slice(parameters);
    Ok(buf.to_vec())
}

/// Decode one complete message.
///
/// The buffer must hold exactly one frame: its length must equal the length
/// declared in the header, otherwise [`CodecError::LengthMismatch`] is
/// returned. A frame too short to contain its code or sequence field fails
/// with [`CodecError::MalformedHeader`].
pub fn decode(data: &[u8]) -> Result<Message<'_>> {
    if data.len() < HEADER_SIZE {
        return Err(CodecError::LengthMismatch {
            declared: 0,
            actual: data.len(),
        }
        .into());
    }

    let word = u16::from_le_bytes([data[0], data[1]]);
    let msg_type = MessageType::from_bits((word >> 13) as u8);
    let declared = (word & LENGTH_MASK) as usize;

    if declared != data.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: data.len(),
        }
        .into());
    }

    if declared < HEADER_SIZE + ITEM_FIELD_SIZE {
        return Err(CodecError::MalformedHeader(format!(
            "{:?} frame of {} bytes has no room for its {} field",
            msg_type,
            declared,
            if msg_type.is_control_item() {
                "code"
            } else {
                "sequence"
            }
        ))
        .into());
    }

    let field = &data[HEADER_SIZE..HEADER_SIZE + ITEM_FIELD_SIZE];
    let rest = &data[HEADER_SIZE + ITEM_FIELD_SIZE..];

    if msg_type.is_control_item() {
        Ok(Message::Control {
            msg_type,
            code: ControlItemCode::from_value(i16::from_le_bytes([field[0], field[1]])),
            parameters: rest,
        })
    } else {
        Ok(Message::Data {
            msg_type,
            sequence: u16::from_le_bytes([field[0], field[1]]),
            body: rest,
        })
    }
}

/// Read the total frame length from the start of a buffer.
///
/// Returns `None` if fewer than two bytes are available.
pub fn peek_frame_len(data: &[u8]) -> Option<usize> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    Some((u16::from_le_bytes([data[0], data[1]]) & LENGTH_MASK) as usize)
}

/// Cut one complete frame off the front of a stream accumulator.
///
/// Returns `None` when the accumulator does not yet hold a whole frame.
/// A header declaring fewer than two bytes can never be satisfied, so the
/// accumulator is cleared and [`CodecError::MalformedHeader`] is returned to
/// let the reader resynchronise on the next chunk.
pub fn split_frame(acc: &mut BytesMut) -> Option<Result<Bytes>> {
    let len = peek_frame_len(acc)?;
    if len < HEADER_SIZE {
        let discarded = acc.len();
        acc.advance(discarded);
        return Some(Err(CodecError::MalformedHeader(format!(
            "declared length {} is shorter than the header; discarded {} bytes",
            len, discarded
        ))
        .into()));
    }
    if acc.len() < len {
        return None;
    }
    Some(Ok(acc.split_to(len).freeze()))
}

// ---------------------------------------------------------------------------
// Command builders
//
// Each builder returns a complete SetControlItem frame ready for the control
// channel.
// ---------------------------------------------------------------------------

/// Low five bytes of a 64-bit value, little-endian.
///
/// NetSDR encodes frequencies and sample rates as 40-bit integers.
pub fn le_40bit(value: u64) -> [u8; 5] {
    let b = value.to_le_bytes();
    [b[0], b[1], b[2], b[3], b[4]]
}

/// Set the I/Q output sample rate.
///
/// The parameter is the rate alone, as five little-endian bytes.
/// Example output: `09 00 B8 00 A0 86 01 00 00` for 100 kHz.
pub fn sample_rate_message(rate_hz: u64) -> Result<Vec<u8>> {
    encode_control_item(
        MessageType::SetControlItem,
        ControlItemCode::IqOutputDataSampleRate,
        &le_40bit(rate_hz),
    )
}

/// Select the RF filter. `0` is automatic.
pub fn rf_filter_message(mode: u16) -> Result<Vec<u8>> {
    encode_control_item(
        MessageType::SetControlItem,
        ControlItemCode::RfFilter,
        &mode.to_le_bytes(),
    )
}

/// Set the A/D converter modes.
pub fn ad_modes_message(mode: [u8; 2]) -> Result<Vec<u8>> {
    encode_control_item(MessageType::SetControlItem, ControlItemCode::AdModes, &mode)
}

/// ReceiverState parameter: I/Q (complex) data mode.
pub const IQ_DATA_MODE: u8 = 0x80;
/// ReceiverState parameter: run.
pub const RECEIVER_RUN: u8 = 0x02;
/// ReceiverState parameter: stop.
pub const RECEIVER_STOP: u8 = 0x01;
/// ReceiverState parameter: contiguous 16-bit FIFO capture.
pub const CAPTURE_FIFO_16BIT: u8 = 0x01;

/// Start the I/Q stream in 16-bit FIFO capture mode.
///
/// Example output: `08 00 18 00 80 02 01 01` for one channel.
pub fn receiver_state_start_message(channels: u8) -> Result<Vec<u8>> {
    encode_control_item(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverState,
        &[IQ_DATA_MODE, RECEIVER_RUN, CAPTURE_FIFO_16BIT, channels],
    )
}

/// Stop the I/Q stream.
pub fn receiver_state_stop_message() -> Result<Vec<u8>> {
    encode_control_item(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverState,
        &[0x00, RECEIVER_STOP, 0x00, 0x00],
    )
}

/// Tune a channel.
///
/// Parameters are the channel byte followed by the low five bytes of `hz`.
pub fn frequency_message(hz: u64, channel: u8) -> Result<Vec<u8>> {
    let mut params = Vec::with_capacity(6);
    params.push(channel);
    params.extend_from_slice(&le_40bit(hz));
    encode_control_item(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverFrequency,
        &params,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
