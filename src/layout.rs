//! Record layout - per-trace record lengths and frame buffer capacities

use crate::codec::TraceCodec;
use crate::error::{FrameStoreError, Result};
use crate::grid::GridModel;
use crate::utils::align_up;
use serde::{Deserialize, Serialize};

/// Header words are 4-byte machine words
pub const HEADER_WORD_BYTES: usize = 4;

/// Header record length: declared bytes rounded up to a whole word
pub fn header_record_length(declared_header_bytes: usize) -> usize {
    align_up(declared_header_bytes, HEADER_WORD_BYTES)
}

fn frame_capacity(record_length: usize, max_traces_per_frame: usize) -> Option<usize> {
    record_length
        .checked_mul(max_traces_per_frame)
        .filter(|&bytes| bytes <= MAX_BUFFER_BYTES)
}

/// Largest buffer the layout will size; larger frames cannot be allocated
const MAX_BUFFER_BYTES: usize = isize::MAX as usize;

/// Byte layout of the trace and header records of one frame
///
/// Computed once when a session opens and fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayout {
    /// Samples per trace (grid axis 0)
    pub samples_per_trace: usize,
    /// Maximum traces per frame (grid axis 1)
    pub max_traces_per_frame: usize,
    /// Stride of one encoded trace
    pub trace_record_length: usize,
    /// Stride of one header record, zero when the dataset has no headers
    pub header_record_length: usize,
    trace_buffer_capacity: usize,
    header_buffer_capacity: usize,
}

impl RecordLayout {
    /// Derive the layout from the grid, the trace codec and the declared
    /// header length
    ///
    /// Fails with a configuration error when a full frame of records cannot
    /// be sized in memory.
    pub fn new(
        grid: &GridModel,
        codec: &dyn TraceCodec,
        declared_header_bytes: Option<usize>,
    ) -> Result<Self> {
        let samples_per_trace = grid.samples_per_trace();
        let max_traces_per_frame = grid.max_traces_per_frame();
        let trace_record_length = codec.record_length(samples_per_trace);
        if trace_record_length == 0 {
            return Err(FrameStoreError::Configuration(format!(
                "{} codec reports zero record length for {} samples",
                codec.format(),
                samples_per_trace
            )));
        }
        let trace_buffer_capacity = frame_capacity(trace_record_length, max_traces_per_frame)
            .ok_or_else(|| {
                FrameStoreError::Configuration(format!(
                    "{} traces of {} {} samples exceed the addressable frame size",
                    max_traces_per_frame,
                    samples_per_trace,
                    codec.format()
                ))
            })?;

        let header_record_length = match declared_header_bytes {
            Some(bytes) => bytes.checked_next_multiple_of(HEADER_WORD_BYTES).ok_or_else(|| {
                FrameStoreError::Configuration(format!(
                    "Header length {} bytes is not addressable",
                    bytes
                ))
            })?,
            None => 0,
        };
        let header_buffer_capacity = frame_capacity(header_record_length, max_traces_per_frame)
            .ok_or_else(|| {
                FrameStoreError::Configuration(format!(
                    "{} header records of {} bytes exceed the addressable frame size",
                    max_traces_per_frame, header_record_length
                ))
            })?;

        Ok(Self {
            samples_per_trace,
            max_traces_per_frame,
            trace_record_length,
            header_record_length,
            trace_buffer_capacity,
            header_buffer_capacity,
        })
    }

    pub fn has_headers(&self) -> bool {
        self.header_record_length > 0
    }

    /// Number of 32-bit words per header record
    pub fn header_words(&self) -> usize {
        self.header_record_length / HEADER_WORD_BYTES
    }

    /// Capacity of the reusable trace buffer
    pub fn trace_buffer_capacity(&self) -> usize {
        self.trace_buffer_capacity
    }

    /// Capacity of the reusable header buffer
    pub fn header_buffer_capacity(&self) -> usize {
        self.header_buffer_capacity
    }

    /// Bytes occupied by `trace_count` encoded traces
    ///
    /// `trace_count` must already have passed [`Self::check_trace_count`].
    pub fn trace_bytes(&self, trace_count: usize) -> usize {
        debug_assert!(trace_count <= self.max_traces_per_frame);
        self.trace_record_length * trace_count
    }

    /// Bytes occupied by `trace_count` header records
    pub fn header_bytes(&self, trace_count: usize) -> usize {
        debug_assert!(trace_count <= self.max_traces_per_frame);
        self.header_record_length * trace_count
    }

    /// Fail unless `trace_count` fits in one frame
    pub fn check_trace_count(&self, trace_count: usize) -> Result<()> {
        if trace_count > self.max_traces_per_frame {
            return Err(FrameStoreError::InvalidDimensions(format!(
                "Trace count {} exceeds {} traces per frame",
                trace_count, self.max_traces_per_frame
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IeeeCodec;
    use crate::types::{ByteOrder, TraceFormat};

    fn grid() -> GridModel {
        GridModel::from_triples([(0, 4, 250), (1, 1, 4), (100, 2, 3), (10, 1, 3)]).unwrap()
    }

    #[test]
    fn test_header_record_length() {
        assert_eq!(header_record_length(13), 16);
        assert_eq!(header_record_length(16), 16);
        assert_eq!(header_record_length(0), 0);
        assert_eq!(header_record_length(1), 4);
        assert_eq!(header_record_length(242), 244);
    }

    #[test]
    fn test_layout_capacities() {
        let codec = IeeeCodec::new(TraceFormat::Float, ByteOrder::LittleEndian).unwrap();
        let layout = RecordLayout::new(&grid(), &codec, Some(13)).unwrap();
        assert_eq!(layout.trace_record_length, 1000);
        assert_eq!(layout.header_record_length, 16);
        assert_eq!(layout.header_words(), 4);
        assert_eq!(layout.trace_buffer_capacity(), 4000);
        assert_eq!(layout.header_buffer_capacity(), 64);
        assert_eq!(layout.trace_bytes(3), 3000);
        assert_eq!(layout.header_bytes(3), 48);
        assert!(layout.check_trace_count(4).is_ok());
        assert!(layout.check_trace_count(5).is_err());
    }

    #[test]
    fn test_layout_without_headers() {
        let codec = IeeeCodec::new(TraceFormat::Double, ByteOrder::BigEndian).unwrap();
        let layout = RecordLayout::new(&grid(), &codec, None).unwrap();
        assert!(!layout.has_headers());
        assert_eq!(layout.trace_record_length, 2000);
        assert_eq!(layout.header_buffer_capacity(), 0);
    }

    #[test]
    fn test_oversized_grid_is_configuration_error() {
        let codec = IeeeCodec::new(TraceFormat::Float, ByteOrder::LittleEndian).unwrap();
        let huge_traces =
            GridModel::from_triples([(0, 1, 1 << 62), (1, 1, 4), (100, 2, 3), (10, 1, 3)])
                .unwrap();
        let err = RecordLayout::new(&huge_traces, &codec, None).unwrap_err();
        assert!(matches!(err, FrameStoreError::Configuration(_)));

        let many_traces =
            GridModel::from_triples([(0, 4, 250), (1, 1, 1 << 60), (100, 2, 3), (10, 1, 3)])
                .unwrap();
        let err = RecordLayout::new(&many_traces, &codec, None).unwrap_err();
        assert!(matches!(err, FrameStoreError::Configuration(_)));

        let err = RecordLayout::new(&grid(), &codec, Some(usize::MAX)).unwrap_err();
        assert!(matches!(err, FrameStoreError::Configuration(_)));
    }
}
