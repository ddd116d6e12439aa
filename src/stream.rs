//! Unified serialization streams.
//!
//! A single user routine drives three stream modes through the same field
//! operations: [`WriteStream`] packs values into a buffer, [`ReadStream`]
//! unpacks them, and [`MeasureStream`] only accounts the bit cost. Because
//! encoding and decoding share one routine, the two sides stay in
//! lock-step by construction; the wire format carries no field tags, so a
//! reader that applies a different field sequence is reading garbage and
//! will be rejected by the range and padding checks.

use tracing::trace;

use crate::bits::bits_required;
use crate::error::{Result, SerializationError};
use crate::reader::BitReader;
use crate::writer::BitWriter;

/// Cascading delta buckets for [`Stream::serialize_int_relative`]. The
/// boundaries are wire format; changing them breaks compatibility.
const RELATIVE_INT_BUCKETS: [(u32, u32); 5] =
    [(2, 6), (7, 23), (24, 280), (281, 4377), (4378, 69914)];

/// One serialization mode: write, read, or measure.
///
/// The required methods are the mode-dependent primitives; every field
/// encoder is a provided method built on top of them, so all three modes
/// agree on the exact bit layout of every field.
///
/// Field encoders take the value as `&mut`: the write and measure streams
/// read it, the read stream assigns it. A routine generic over `S: Stream`
/// monomorphizes into three specialized routines with no dispatch cost.
pub trait Stream {
    /// True for the write and measure streams; field encoders source their
    /// payload from the value when set.
    const IS_WRITING: bool;
    /// True only for the read stream; field encoders assign the value when
    /// set.
    const IS_READING: bool;

    /// Moves `bits` bits (`1..=64`) between `value` and the stream.
    fn serialize_bits(&mut self, value: &mut u64, bits: u32) -> Result<()>;

    /// Moves a byte payload, aligning to a byte boundary first.
    fn serialize_bytes(&mut self, bytes: &mut [u8]) -> Result<()>;

    /// Pads to the next byte boundary. On read the padding must be zero.
    fn serialize_align(&mut self) -> Result<()>;

    /// Number of padding bits the next `serialize_align` would cost.
    fn align_bits(&self) -> u32;

    /// Bits written, read, or measured so far.
    fn bits_processed(&self) -> usize;

    fn bytes_processed(&self) -> usize {
        self.bits_processed().div_ceil(8)
    }

    /// An integer in `[min, max]`, packed into `bits_required` bits.
    ///
    /// The offset from `min` travels unsigned, so negative bounds work;
    /// a decoded offset that lands outside `[min, max]` rejects the frame.
    fn serialize_int(&mut self, value: &mut i32, min: i32, max: i32) -> Result<()> {
        debug_assert!(min <= max);
        let bits = bits_required(0, (i64::from(max) - i64::from(min)) as u64);
        if Self::IS_WRITING {
            debug_assert!(*value >= min && *value <= max);
        }

        let mut unsigned = (i64::from(*value) - i64::from(min)) as u64;
        self.serialize_bits(&mut unsigned, bits)?;

        if Self::IS_READING {
            let relative = i64::from(min) + unsigned as i64;
            if relative < i64::from(min) || relative > i64::from(max) {
                trace!(
                    min,
                    max,
                    relative,
                    "rejecting frame: ranged integer out of bounds"
                );
                return Err(SerializationError::InvalidValue);
            }
            *value = relative as i32;
        }
        Ok(())
    }

    fn serialize_bool(&mut self, value: &mut bool) -> Result<()> {
        let mut bit = u64::from(*value);
        self.serialize_bits(&mut bit, 1)?;
        if Self::IS_READING {
            *value = bit != 0;
        }
        Ok(())
    }

    /// An `f32`, bit pattern preserved.
    fn serialize_f32(&mut self, value: &mut f32) -> Result<()> {
        let mut bits = u64::from(value.to_bits());
        self.serialize_bits(&mut bits, 32)?;
        if Self::IS_READING {
            *value = f32::from_bits(bits as u32);
        }
        Ok(())
    }

    /// An `f64`, bit pattern preserved.
    fn serialize_f64(&mut self, value: &mut f64) -> Result<()> {
        let mut bits = value.to_bits();
        self.serialize_bits(&mut bits, 64)?;
        if Self::IS_READING {
            *value = f64::from_bits(bits);
        }
        Ok(())
    }

    /// An `f32` quantised onto a regular grid over `[min, max]`.
    ///
    /// The value is clamped into the interval before quantisation; the
    /// round-trip error is at most `resolution / 2`.
    fn serialize_compressed_f32(
        &mut self,
        value: &mut f32,
        min: f32,
        max: f32,
        resolution: f32,
    ) -> Result<()> {
        debug_assert!(max > min);
        debug_assert!(resolution > 0.0);

        let delta = max - min;
        let steps = (delta / resolution).ceil() as u32;
        let bits = bits_required(0, u64::from(steps));

        let mut index = 0u64;
        if Self::IS_WRITING {
            let normalized = ((*value - min) / delta).clamp(0.0, 1.0);
            index = u64::from((normalized * steps as f32 + 0.5).floor() as u32);
        }
        self.serialize_bits(&mut index, bits)?;
        if Self::IS_READING {
            let normalized = index as f32 / steps as f32;
            *value = normalized * delta + min;
        }
        Ok(())
    }

    /// A length-prefixed string with `len <= max_length`.
    ///
    /// The length travels as a ranged integer, the bytes byte-aligned. On
    /// read the string's own allocation is reused for the incoming bytes,
    /// and non-UTF-8 input rejects the frame.
    fn serialize_string(&mut self, value: &mut String, max_length: usize) -> Result<()> {
        debug_assert!(max_length <= i32::MAX as usize);
        if Self::IS_WRITING {
            debug_assert!(value.len() <= max_length);
        }

        let mut length = value.len() as i32;
        self.serialize_int(&mut length, 0, max_length as i32)?;

        let mut bytes = std::mem::take(value).into_bytes();
        if Self::IS_READING {
            bytes.clear();
            bytes.resize(length as usize, 0);
        }
        self.serialize_bytes(&mut bytes)?;
        *value = String::from_utf8(bytes).map_err(|_| {
            trace!("rejecting frame: string bytes are not valid utf-8");
            SerializationError::InvalidString
        })?;
        Ok(())
    }

    /// A strictly-positive delta from `previous` to `current`, packed with
    /// cascading bucket prefixes that prefer small deltas.
    ///
    /// A delta of 1 costs a single bit; each further bucket spends one
    /// more prefix bit for a wider payload, and anything past the last
    /// bucket falls back to the absolute value as 32 raw bits.
    fn serialize_int_relative(&mut self, previous: u32, current: &mut u32) -> Result<()> {
        let mut difference = 0u32;
        if Self::IS_WRITING {
            debug_assert!(previous < *current);
            difference = *current - previous;
        }

        let mut unit = difference == 1;
        self.serialize_bool(&mut unit)?;
        if unit {
            if Self::IS_READING {
                *current = previous.wrapping_add(1);
            }
            return Ok(());
        }

        for &(lo, hi) in &RELATIVE_INT_BUCKETS {
            let mut in_bucket = difference <= hi;
            self.serialize_bool(&mut in_bucket)?;
            if in_bucket {
                let mut delta = difference as i32;
                self.serialize_int(&mut delta, lo as i32, hi as i32)?;
                if Self::IS_READING {
                    *current = previous.wrapping_add(delta as u32);
                }
                return Ok(());
            }
        }

        // Past the last bucket the absolute value travels, not the delta.
        let mut absolute = u64::from(*current);
        self.serialize_bits(&mut absolute, 32)?;
        if Self::IS_READING {
            *current = absolute as u32;
        }
        Ok(())
    }

    /// A `u16` sequence number encoded relative to an older one, safe
    /// across one wrap-around of the sequence space.
    fn serialize_sequence_relative(&mut self, previous: u16, current: &mut u16) -> Result<()> {
        let mut extended = u32::from(*current);
        if Self::IS_WRITING && previous > *current {
            extended += 65536;
        }
        self.serialize_int_relative(u32::from(previous), &mut extended)?;
        if Self::IS_READING {
            *current = (extended % 65536) as u16;
        }
        Ok(())
    }
}

/// Packs fields into a caller-supplied buffer.
#[derive(Debug)]
pub struct WriteStream<'a> {
    writer: BitWriter<'a>,
}

impl<'a> WriteStream<'a> {
    /// The buffer length must be a positive multiple of 4.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            writer: BitWriter::new(buffer),
        }
    }

    /// Drains the residual scratch bits. Must be called before the buffer
    /// is observed as the encoded message.
    pub fn flush(&mut self) {
        self.writer.flush();
    }

    /// The encoded prefix of the buffer. Meaningful after [`flush`](Self::flush).
    pub fn data(&self) -> &[u8] {
        self.writer.data()
    }

    pub fn bits_available(&self) -> usize {
        self.writer.bits_available()
    }
}

impl Stream for WriteStream<'_> {
    const IS_WRITING: bool = true;
    const IS_READING: bool = false;

    fn serialize_bits(&mut self, value: &mut u64, bits: u32) -> Result<()> {
        debug_assert!(bits >= 1 && bits <= 64);
        debug_assert!(bits == 64 || *value >> bits == 0);
        if bits <= 32 {
            self.writer.write_bits(*value as u32, bits);
        } else {
            self.writer.write_bits(*value as u32, 32);
            self.writer.write_bits((*value >> 32) as u32, bits - 32);
        }
        Ok(())
    }

    fn serialize_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.serialize_align()?;
        self.writer.write_bytes(bytes);
        Ok(())
    }

    fn serialize_align(&mut self) -> Result<()> {
        self.writer.write_align();
        Ok(())
    }

    fn align_bits(&self) -> u32 {
        self.writer.align_bits()
    }

    fn bits_processed(&self) -> usize {
        self.writer.bits_written()
    }
}

/// Unpacks fields from an untrusted buffer.
#[derive(Debug)]
pub struct ReadStream<'a> {
    reader: BitReader<'a>,
}

impl<'a> ReadStream<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            reader: BitReader::new(buffer),
        }
    }
}

impl Stream for ReadStream<'_> {
    const IS_WRITING: bool = false;
    const IS_READING: bool = true;

    fn serialize_bits(&mut self, value: &mut u64, bits: u32) -> Result<()> {
        debug_assert!(bits >= 1 && bits <= 64);
        if bits <= 32 {
            *value = u64::from(self.reader.read_bits(bits)?);
        } else {
            let low = u64::from(self.reader.read_bits(32)?);
            let high = u64::from(self.reader.read_bits(bits - 32)?);
            *value = low | (high << 32);
        }
        Ok(())
    }

    fn serialize_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.serialize_align()?;
        self.reader.read_bytes(bytes)
    }

    fn serialize_align(&mut self) -> Result<()> {
        self.reader.read_align()
    }

    fn align_bits(&self) -> u32 {
        self.reader.align_bits()
    }

    fn bits_processed(&self) -> usize {
        self.reader.bits_read()
    }
}

/// Accounts the bit cost of a field sequence without touching a buffer.
///
/// Runs the write-side value path, so the measured cost reflects the
/// actual value (a string's length, a delta's bucket). Never errors.
#[derive(Debug, Default)]
pub struct MeasureStream {
    bits_written: usize,
}

impl MeasureStream {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stream for MeasureStream {
    const IS_WRITING: bool = true;
    const IS_READING: bool = false;

    fn serialize_bits(&mut self, _value: &mut u64, bits: u32) -> Result<()> {
        debug_assert!(bits >= 1 && bits <= 64);
        self.bits_written += bits as usize;
        Ok(())
    }

    fn serialize_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.serialize_align()?;
        self.bits_written += bytes.len() * 8;
        Ok(())
    }

    fn serialize_align(&mut self) -> Result<()> {
        self.bits_written += self.align_bits() as usize;
        Ok(())
    }

    fn align_bits(&self) -> u32 {
        ((8 - self.bits_written % 8) % 8) as u32
    }

    fn bits_processed(&self) -> usize {
        self.bits_written
    }
}

/// A value with a bitpacked wire representation.
///
/// One routine serves encoding, decoding and measuring; implementations
/// propagate failures with `?` so a rejected frame short-circuits.
pub trait Streamable {
    fn serialize<S: Stream>(&mut self, stream: &mut S) -> Result<()>;
}

/// Encodes `value` into `buffer` (length a positive multiple of 4) and
/// returns the number of bytes written.
pub fn encode<T: Streamable>(value: &mut T, buffer: &mut [u8]) -> Result<usize> {
    let mut stream = WriteStream::new(buffer);
    value.serialize(&mut stream)?;
    stream.flush();
    Ok(stream.bytes_processed())
}

/// Decodes `value` from `buffer`. An `Err` means the frame is rejected;
/// the value may be partially assigned and must not be used.
pub fn decode<T: Streamable>(value: &mut T, buffer: &[u8]) -> Result<()> {
    let mut stream = ReadStream::new(buffer);
    let result = value.serialize(&mut stream);
    if let Err(err) = &result {
        trace!(
            ?err,
            bits_read = stream.bits_processed(),
            "rejected incoming frame"
        );
    }
    result
}

/// Returns the encoded size of `value` in bytes without writing anything.
pub fn measure<T: Streamable>(value: &mut T) -> Result<usize> {
    let mut stream = MeasureStream::new();
    value.serialize(&mut stream)?;
    Ok(stream.bytes_processed())
}
