use std::fmt::Display;

use log::{debug, trace};

use crate::io::cursor::{ByteCursor, ByteOrder, CursorError};

/// Escape code for the delta family: the next word holds an absolute value
pub const DELTA_ESCAPE: i16 = i16::MIN;
/// Escape code for the double-delta family: the next six bytes hold an
/// absolute 48-bit position
pub const DOUBLE_DELTA_ESCAPE: i16 = i16::MAX;
/// Mask selecting the run length bits of a delta run header
pub const RUN_LENGTH_MASK: u16 = 0x0FFF;

/// The compression scheme used by a single-trace signal region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalEncoding {
    /// Run-length framed first differences with 32-bit absolute escapes
    Delta(ByteOrder),
    /// Second differences with 48-bit absolute escapes
    DoubleDelta(ByteOrder),
    /// Uncompressed IEEE-754 doubles
    DoubleArray(ByteOrder),
}

impl Display for SignalEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Raised when a run or escape sequence promises more bytes than remain.
///
/// The samples decoded before the inconsistency are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorruptRun {
    /// The byte offset of the run header or escape that could not be completed
    pub offset: u64,
    /// The number of samples the run declared
    pub declared: usize,
    /// The number of samples of that run that were decoded
    pub decoded: usize,
}

/// The output of a signal decoder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedSignal {
    pub samples: Vec<f64>,
    pub corruption: Option<CorruptRun>,
}

impl DecodedSignal {
    pub fn is_complete(&self) -> bool {
        self.corruption.is_none()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One accumulator stepping through escape-coded first differences.
///
/// Shared by the run-length framed trace codec and the unframed per-scan
/// codec used by spectral files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaAccumulator {
    value: i64,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Consume one delta (and its escape payload, if any). On failure the
    /// cursor is left at the start of the incomplete step.
    pub fn step(&mut self, cursor: &mut ByteCursor<'_>, order: ByteOrder) -> Result<i64, CursorError> {
        let start = cursor.position();
        let delta = cursor.read_i16(order)?;
        if delta == DELTA_ESCAPE {
            match cursor.read_i32(order) {
                Ok(absolute) => self.value = absolute as i64,
                Err(e) => {
                    cursor.seek(start)?;
                    return Err(e);
                }
            }
        } else {
            self.value += delta as i64;
        }
        Ok(self.value)
    }
}

/// Decode a run-length framed delta stream from the cursor's position to the
/// end of the source
pub fn decode_delta(cursor: &mut ByteCursor<'_>, order: ByteOrder) -> DecodedSignal {
    let mut samples = Vec::with_capacity(cursor.remaining() / 2);
    let mut accumulator = DeltaAccumulator::new();
    let mut corruption = None;

    'runs: while cursor.remaining() >= 2 {
        let run_offset = cursor.position();
        let Ok(header) = cursor.read_u16(order) else {
            break;
        };
        let run_length = (header & RUN_LENGTH_MASK) as usize;
        if run_length == 0 {
            trace!("End of delta stream sentinel at {run_offset}");
            break;
        }
        for i in 0..run_length {
            match accumulator.step(cursor, order) {
                Ok(value) => samples.push(value as f64),
                Err(_) => {
                    corruption = Some(CorruptRun {
                        offset: run_offset,
                        declared: run_length,
                        decoded: i,
                    });
                    break 'runs;
                }
            }
        }
    }
    if let Some(c) = corruption.as_ref() {
        debug!(
            "Delta run at {} declared {} samples but only {} were present",
            c.offset, c.declared, c.decoded
        );
    }
    samples.shrink_to_fit();
    DecodedSignal {
        samples,
        corruption,
    }
}

/// Decode a double-delta stream from the cursor's position to the end of the source
pub fn decode_double_delta(cursor: &mut ByteCursor<'_>, order: ByteOrder) -> DecodedSignal {
    let mut samples = Vec::with_capacity(cursor.remaining() / 2);
    let mut velocity: i64 = 0;
    let mut position: i64 = 0;
    let mut corruption = None;

    while cursor.remaining() >= 2 {
        let step_offset = cursor.position();
        let Ok(value) = cursor.read_i16(order) else {
            break;
        };
        if value == DOUBLE_DELTA_ESCAPE {
            let high = cursor.read_i16(order);
            let low = cursor.read_u32(order);
            match (high, low) {
                (Ok(high), Ok(low)) => {
                    position = ((high as i64) << 32) | low as i64;
                    velocity = 0;
                }
                _ => {
                    corruption = Some(CorruptRun {
                        offset: step_offset,
                        declared: 1,
                        decoded: 0,
                    });
                    break;
                }
            }
        } else {
            let next = velocity
                .checked_add(value as i64)
                .and_then(|v| Some((v, position.checked_add(v)?)));
            let Some((v, p)) = next else {
                debug!("Double-delta position overflowed at {step_offset}");
                corruption = Some(CorruptRun {
                    offset: step_offset,
                    declared: 1,
                    decoded: 0,
                });
                break;
            };
            velocity = v;
            position = p;
        }
        samples.push(position as f64);
    }
    if cursor.remaining() == 1 {
        trace!("Ignoring trailing byte after double-delta stream");
    }
    samples.shrink_to_fit();
    DecodedSignal {
        samples,
        corruption,
    }
}

/// Reinterpret the rest of the source as IEEE-754 doubles. A trailing partial
/// value is ignored. When `zero` is given it replaces the first sample.
pub fn decode_double_array(
    cursor: &mut ByteCursor<'_>,
    order: ByteOrder,
    zero: Option<f64>,
) -> DecodedSignal {
    let bytes = cursor.rest();
    let whole = bytes.len() - bytes.len() % 8;
    if whole != bytes.len() {
        trace!("Ignoring {} trailing bytes of a double array", bytes.len() - whole);
    }
    // pod_collect_to_vec copies, so the source does not need to be aligned
    let mut samples: Vec<f64> = bytemuck::pod_collect_to_vec(&bytes[..whole]);
    if order != ByteOrder::native() {
        samples
            .iter_mut()
            .for_each(|v| *v = f64::from_bits(v.to_bits().swap_bytes()));
    }
    if let (Some(zero), Some(first)) = (zero, samples.first_mut()) {
        *first = zero;
    }
    DecodedSignal {
        samples,
        corruption: None,
    }
}

/// Decode a single-trace signal region with the given encoding
pub fn decode_signal(
    cursor: &mut ByteCursor<'_>,
    encoding: SignalEncoding,
    zero: Option<f64>,
) -> DecodedSignal {
    match encoding {
        SignalEncoding::Delta(order) => decode_delta(cursor, order),
        SignalEncoding::DoubleDelta(order) => decode_double_delta(cursor, order),
        SignalEncoding::DoubleArray(order) => decode_double_array(cursor, order, zero),
    }
}

/// Decode `count` unframed escape-coded deltas, as stored per scan in
/// spectral trace files. The accumulator starts at zero for every call.
pub fn decode_scan_deltas(
    cursor: &mut ByteCursor<'_>,
    count: usize,
    order: ByteOrder,
) -> Result<Vec<f64>, CursorError> {
    let mut accumulator = DeltaAccumulator::new();
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(accumulator.step(cursor, order)? as f64);
    }
    Ok(values)
}

/// Unpack a packed abundance word: a 14-bit mantissa and a 2-bit base-8 exponent
#[inline]
pub fn unpack_abundance(word: u16) -> f64 {
    let mantissa = (word & 0x3FFF) as f64;
    let exponent = (word >> 14) as i32;
    mantissa * 8f64.powi(exponent)
}

/// Unpack an m/z word stored in twentieths of a unit
#[inline]
pub fn unpack_mz(word: u16) -> f64 {
    word as f64 / 20.0
}
