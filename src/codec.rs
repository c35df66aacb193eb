//! Trace sample encoding and decoding
//!
//! The store never hard-codes sample arithmetic: every trace format is
//! handled by a [`TraceCodec`]. Plain IEEE formats ship with the crate;
//! scaled fixed-point formats are supplied by the surrounding system through
//! [`crate::store::OpenOptions::with_codec`].

use crate::error::{FrameStoreError, Result};
use crate::types::{ByteOrder, TraceFormat};
use ndarray::{ArrayView2, ArrayViewMut2};
use std::sync::Arc;

/// Capability for packing traces into fixed-length records
pub trait TraceCodec: Send + Sync {
    /// Format handled by this codec
    fn format(&self) -> TraceFormat;

    /// Encoded length of one trace of `sample_count` samples
    ///
    /// Must be deterministic and at least 1 for a non-zero sample count; it
    /// is the stride of every trace slot in a Traces object. Lengths that do
    /// not fit in `usize` saturate at `usize::MAX`.
    fn record_length(&self, sample_count: usize) -> usize;

    /// Encode the first `trace_count` rows of `samples` into `dest`
    fn encode(&self, trace_count: usize, samples: ArrayView2<'_, f32>, dest: &mut [u8])
        -> Result<()>;

    /// Decode `trace_count` records from `src` into the first rows of `dest`
    fn decode(&self, trace_count: usize, src: &[u8], dest: ArrayViewMut2<'_, f32>) -> Result<()>;
}

/// Uncompressed IEEE floating point samples
#[derive(Debug, Clone, Copy)]
pub struct IeeeCodec {
    format: TraceFormat,
    byte_order: ByteOrder,
}

impl IeeeCodec {
    pub fn new(format: TraceFormat, byte_order: ByteOrder) -> Result<Self> {
        if !format.is_ieee() {
            return Err(FrameStoreError::UnsupportedFormat(format!(
                "{} is not an IEEE sample format",
                format
            )));
        }
        Ok(Self { format, byte_order })
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn sample_bytes(&self) -> usize {
        match self.format {
            TraceFormat::Double => 8,
            _ => 4,
        }
    }
}

/// Check row/column counts and buffer size shared by encode and decode
fn check_frame_shape(
    codec: &dyn TraceCodec,
    trace_count: usize,
    rows: usize,
    sample_count: usize,
    buffer_len: usize,
) -> Result<usize> {
    if trace_count > rows {
        return Err(FrameStoreError::InvalidDimensions(format!(
            "Trace count {} exceeds {} rows in sample array",
            trace_count, rows
        )));
    }
    let record_length = codec.record_length(sample_count);
    let needed = record_length.checked_mul(trace_count).unwrap_or(usize::MAX);
    if buffer_len < needed {
        return Err(FrameStoreError::InvalidDimensions(format!(
            "Record buffer holds {} bytes, {} traces of {} samples need {}",
            buffer_len, trace_count, sample_count, needed
        )));
    }
    Ok(record_length)
}

impl TraceCodec for IeeeCodec {
    fn format(&self) -> TraceFormat {
        self.format
    }

    fn record_length(&self, sample_count: usize) -> usize {
        sample_count.saturating_mul(self.sample_bytes())
    }

    fn encode(
        &self,
        trace_count: usize,
        samples: ArrayView2<'_, f32>,
        dest: &mut [u8],
    ) -> Result<()> {
        let (rows, nsamp) = samples.dim();
        let record_length = check_frame_shape(self, trace_count, rows, nsamp, dest.len())?;
        let width = self.sample_bytes();

        for (j, trace) in samples.outer_iter().take(trace_count).enumerate() {
            let record = &mut dest[j * record_length..(j + 1) * record_length];
            for (word, &value) in record.chunks_exact_mut(width).zip(trace.iter()) {
                match self.format {
                    TraceFormat::Double => self.byte_order.write_f64(word, value as f64),
                    _ => self.byte_order.write_f32(word, value),
                }
            }
        }
        Ok(())
    }

    fn decode(
        &self,
        trace_count: usize,
        src: &[u8],
        mut dest: ArrayViewMut2<'_, f32>,
    ) -> Result<()> {
        let (rows, nsamp) = dest.dim();
        let record_length = check_frame_shape(self, trace_count, rows, nsamp, src.len())?;
        let width = self.sample_bytes();

        for (j, mut trace) in dest.outer_iter_mut().take(trace_count).enumerate() {
            let record = &src[j * record_length..(j + 1) * record_length];
            for (value, word) in trace.iter_mut().zip(record.chunks_exact(width)) {
                *value = match self.format {
                    TraceFormat::Double => self.byte_order.read_f64(word) as f32,
                    _ => self.byte_order.read_f32(word),
                };
            }
        }
        Ok(())
    }
}

/// Get the built-in codec for a declared trace format
pub fn get_codec(format: TraceFormat, byte_order: ByteOrder) -> Result<Arc<dyn TraceCodec>> {
    match format {
        TraceFormat::Float | TraceFormat::Double => Ok(Arc::new(IeeeCodec::new(format, byte_order)?)),
        TraceFormat::CompressedInt16 | TraceFormat::CompressedInt08 => {
            Err(FrameStoreError::UnsupportedFormat(format!(
                "No built-in codec for {}; supply one with OpenOptions::with_codec",
                format
            )))
        }
    }
}
