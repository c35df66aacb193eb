//! Frame store sessions - main API for reading/writing frame objects
//!
//! A [`FrameStore`] owns one reusable trace buffer and one header buffer,
//! both sized for a full frame when the session opens. Every get/put call
//! streams through those buffers, so calls take `&mut self` and at most one
//! call is in flight per session. Open one session per worker for parallel
//! access (see [`crate::scan::scan_frames_parallel`]).

use crate::address::{frame_key, Namespace};
use crate::codec::{get_codec, TraceCodec};
use crate::error::{FrameStoreError, Result};
use crate::grid::GridModel;
use crate::io::{fill_from_body, metadata_value, BlobStore, ObjectMetadata};
use crate::layout::{RecordLayout, HEADER_WORD_BYTES};
use crate::metadata::DatasetMetadata;
use crate::source::{load_metadata, store_metadata, DatasetLocation, MetadataSource};
use crate::types::ByteOrder;
use crate::utils::restride_records;
use crate::{DEFAULT_TRANSFER_SIZE, TRACE_COUNT_ATTRIBUTE};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options applied when a session opens
#[derive(Clone)]
pub struct OpenOptions {
    codec: Option<Arc<dyn TraceCodec>>,
    transfer_size: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            codec: None,
            transfer_size: DEFAULT_TRANSFER_SIZE,
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("codec", &self.codec.as_ref().map(|c| c.format()))
            .field("transfer_size", &self.transfer_size)
            .finish()
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `codec` instead of the built-in codec for the declared format
    ///
    /// The codec must handle the trace format declared by the dataset.
    pub fn with_codec(mut self, codec: Arc<dyn TraceCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Upper bound on bytes requested per body read
    pub fn with_transfer_size(mut self, transfer_size: usize) -> Self {
        self.transfer_size = transfer_size.max(1);
        self
    }

    pub fn transfer_size(&self) -> usize {
        self.transfer_size
    }

    fn resolve_codec(&self, metadata: &DatasetMetadata) -> Result<Arc<dyn TraceCodec>> {
        match &self.codec {
            Some(codec) if codec.format() != metadata.trace_format => {
                Err(FrameStoreError::Configuration(format!(
                    "Codec handles {} but the dataset stores {}",
                    codec.format(),
                    metadata.trace_format
                )))
            }
            Some(codec) => Ok(Arc::clone(codec)),
            None => get_codec(metadata.trace_format, metadata.byte_order),
        }
    }
}

/// Lifecycle state of a [`FrameStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Open,
    Closed,
}

/// Decoded traces of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTraces {
    /// Valid leading traces; zero when the frame was never written
    pub trace_count: usize,
    /// `trace_count` rows of `samples_per_trace` samples
    pub samples: Array2<f32>,
}

/// Decoded header words of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHeaders {
    pub trace_count: usize,
    /// `trace_count` rows of 32-bit header words
    pub words: Array2<i32>,
}

/// Raw header records at a caller-chosen stride
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRecords {
    pub trace_count: usize,
    pub stride: usize,
    pub bytes: Vec<u8>,
}

/// Headers and traces of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub trace_count: usize,
    pub samples: Array2<f32>,
    /// Present when the dataset declares headers and the frame exists
    pub headers: Option<Array2<i32>>,
}

struct Session {
    blob_store: Arc<dyn BlobStore>,
    location: DatasetLocation,
    metadata: DatasetMetadata,
    layout: RecordLayout,
    codec: Arc<dyn TraceCodec>,
    trace_buffer: Vec<u8>,
    header_buffer: Vec<u8>,
    transfer_size: usize,
}

/// Fail with a format error, logging it first
fn format_violation(message: String) -> FrameStoreError {
    warn!("{}", message);
    FrameStoreError::InvalidFormat(message)
}

/// Bytes spanned by `trace_count` caller records of `stride` bytes
fn records_bytes(trace_count: usize, stride: usize) -> Result<usize> {
    trace_count.checked_mul(stride).ok_or_else(|| {
        FrameStoreError::InvalidDimensions(format!(
            "{} header records of {} bytes overflow the addressable size",
            trace_count, stride
        ))
    })
}

/// Fetch one frame object into `buffer`
///
/// Returns `None` when the object does not exist. Otherwise validates the
/// trace count attribute and requires the body to hold exactly
/// `trace_count * record_length` bytes.
async fn fetch_records(
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
    record_length: usize,
    max_traces: usize,
    buffer: &mut [u8],
    transfer_size: usize,
) -> Result<Option<usize>> {
    let mut object = match store.get(bucket, key).await {
        Ok(object) => object,
        Err(FrameStoreError::NotFound { .. }) => {
            debug!(bucket, key, "frame object not found");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let attribute = metadata_value(&object.metadata, TRACE_COUNT_ATTRIBUTE).ok_or_else(|| {
        format_violation(format!(
            "Object {}/{} has no {} attribute",
            bucket, key, TRACE_COUNT_ATTRIBUTE
        ))
    })?;
    let trace_count: usize = attribute.trim().parse().map_err(|_| {
        format_violation(format!(
            "Object {}/{} has non-numeric {} '{}'",
            bucket, key, TRACE_COUNT_ATTRIBUTE, attribute
        ))
    })?;
    if trace_count > max_traces {
        return Err(format_violation(format!(
            "Object {}/{} claims {} traces, frame holds at most {}",
            bucket, key, trace_count, max_traces
        )));
    }

    let expected = trace_count * record_length;
    let fill = fill_from_body(object.body.as_mut(), &mut buffer[..expected], transfer_size).await?;
    if fill.bytes < expected {
        return Err(format_violation(format!(
            "Object {}/{} holds {} bytes, {} traces need {}",
            bucket, key, fill.bytes, trace_count, expected
        )));
    }
    if fill.overflow {
        return Err(format_violation(format!(
            "Object {}/{} is longer than the {} bytes of {} traces",
            bucket, key, expected, trace_count
        )));
    }

    debug!(bucket, key, bytes = expected, trace_count, "fetched frame object");
    Ok(Some(trace_count))
}

/// Upload `body` with its trace count attribute
async fn upload_records(
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
    body: &[u8],
    trace_count: usize,
) -> Result<()> {
    let mut metadata = ObjectMetadata::new();
    metadata.insert(TRACE_COUNT_ATTRIBUTE.to_string(), trace_count.to_string());
    store.put(bucket, key, body, &metadata).await?;
    debug!(bucket, key, bytes = body.len(), trace_count, "stored frame object");
    Ok(())
}

fn decode_header_words(
    src: &[u8],
    stride: usize,
    byte_order: ByteOrder,
    trace_count: usize,
    mut dest: ArrayViewMut2<'_, i32>,
) {
    for (j, mut row) in dest.outer_iter_mut().take(trace_count).enumerate() {
        let record = &src[j * stride..(j + 1) * stride];
        for (word, bytes) in row.iter_mut().zip(record.chunks_exact(HEADER_WORD_BYTES)) {
            *word = byte_order.read_i32(bytes);
        }
    }
}

fn encode_header_words(
    words: ArrayView2<'_, i32>,
    trace_count: usize,
    stride: usize,
    byte_order: ByteOrder,
    dest: &mut [u8],
) {
    for (j, row) in words.outer_iter().take(trace_count).enumerate() {
        let record = &mut dest[j * stride..(j + 1) * stride];
        for (bytes, &word) in record.chunks_exact_mut(HEADER_WORD_BYTES).zip(row.iter()) {
            byte_order.write_i32(bytes, word);
        }
    }
}

impl Session {
    fn key(&self, namespace: Namespace, volume: i64, frame: i64) -> Result<String> {
        self.metadata.grid.check_frame(volume, frame)?;
        Ok(frame_key(&self.location.prefix, namespace, volume, frame))
    }

    fn require_headers(&self) -> Result<()> {
        if !self.layout.has_headers() {
            return Err(FrameStoreError::Configuration(format!(
                "Dataset {} declares no trace headers",
                self.location
            )));
        }
        Ok(())
    }

    fn check_trace_rows(&self, trace_count: usize, rows: usize) -> Result<()> {
        self.layout.check_trace_count(trace_count)?;
        if trace_count > rows {
            return Err(FrameStoreError::InvalidDimensions(format!(
                "Trace count {} exceeds {} rows supplied",
                trace_count, rows
            )));
        }
        Ok(())
    }

    fn check_columns(what: &str, columns: usize, expected: usize) -> Result<()> {
        if columns != expected {
            return Err(FrameStoreError::InvalidDimensions(format!(
                "{} array has {} columns, dataset expects {}",
                what, columns, expected
            )));
        }
        Ok(())
    }

    async fn fetch(&mut self, namespace: Namespace, volume: i64, frame: i64) -> Result<Option<usize>> {
        let key = self.key(namespace, volume, frame)?;
        let (record_length, buffer) = match namespace {
            Namespace::Traces => (self.layout.trace_record_length, &mut self.trace_buffer[..]),
            Namespace::Headers => (self.layout.header_record_length, &mut self.header_buffer[..]),
        };
        fetch_records(
            self.blob_store.as_ref(),
            &self.location.bucket,
            &key,
            record_length,
            self.layout.max_traces_per_frame,
            buffer,
            self.transfer_size,
        )
        .await
    }

    async fn upload(
        &self,
        namespace: Namespace,
        volume: i64,
        frame: i64,
        trace_count: usize,
    ) -> Result<()> {
        let key = self.key(namespace, volume, frame)?;
        let body = match namespace {
            Namespace::Traces => &self.trace_buffer[..self.layout.trace_bytes(trace_count)],
            Namespace::Headers => &self.header_buffer[..self.layout.header_bytes(trace_count)],
        };
        upload_records(
            self.blob_store.as_ref(),
            &self.location.bucket,
            &key,
            body,
            trace_count,
        )
        .await
    }

    async fn get_traces(&mut self, volume: i64, frame: i64) -> Result<FrameTraces> {
        let samples_per_trace = self.layout.samples_per_trace;
        let trace_count = self
            .fetch(Namespace::Traces, volume, frame)
            .await?
            .unwrap_or(0);
        let mut samples = Array2::zeros((trace_count, samples_per_trace));
        if trace_count > 0 {
            let bytes = self.layout.trace_bytes(trace_count);
            self.codec
                .decode(trace_count, &self.trace_buffer[..bytes], samples.view_mut())?;
        }
        Ok(FrameTraces {
            trace_count,
            samples,
        })
    }

    async fn get_headers(&mut self, volume: i64, frame: i64) -> Result<Option<FrameHeaders>> {
        self.require_headers()?;
        let Some(trace_count) = self.fetch(Namespace::Headers, volume, frame).await? else {
            return Ok(None);
        };
        let mut words = Array2::zeros((trace_count, self.layout.header_words()));
        decode_header_words(
            &self.header_buffer,
            self.layout.header_record_length,
            self.metadata.byte_order,
            trace_count,
            words.view_mut(),
        );
        Ok(Some(FrameHeaders { trace_count, words }))
    }

    async fn put_traces(
        &mut self,
        volume: i64,
        frame: i64,
        trace_count: usize,
        samples: ArrayView2<'_, f32>,
    ) -> Result<()> {
        self.key(Namespace::Traces, volume, frame)?;
        self.check_trace_rows(trace_count, samples.nrows())?;
        Self::check_columns("Sample", samples.ncols(), self.layout.samples_per_trace)?;
        let bytes = self.layout.trace_bytes(trace_count);
        self.codec
            .encode(trace_count, samples, &mut self.trace_buffer[..bytes])?;
        self.upload(Namespace::Traces, volume, frame, trace_count)
            .await
    }

    async fn put_headers(
        &mut self,
        volume: i64,
        frame: i64,
        trace_count: usize,
        words: ArrayView2<'_, i32>,
    ) -> Result<()> {
        self.require_headers()?;
        self.key(Namespace::Headers, volume, frame)?;
        self.check_trace_rows(trace_count, words.nrows())?;
        Self::check_columns("Header", words.ncols(), self.layout.header_words())?;
        encode_header_words(
            words,
            trace_count,
            self.layout.header_record_length,
            self.metadata.byte_order,
            &mut self.header_buffer,
        );
        self.upload(Namespace::Headers, volume, frame, trace_count)
            .await
    }
}

/// An open frame store session
pub struct FrameStore {
    session: Option<Session>,
}

impl fmt::Debug for FrameStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FrameStore");
        debug.field("state", &self.state());
        if let Some(session) = &self.session {
            debug
                .field("location", &session.location)
                .field("layout", &session.layout);
        }
        debug.finish()
    }
}

impl FrameStore {
    /// Open an existing dataset, loading its metadata through `source`
    pub async fn open(
        blob_store: Arc<dyn BlobStore>,
        location: DatasetLocation,
        source: MetadataSource,
        options: OpenOptions,
    ) -> Result<Self> {
        let metadata = load_metadata(blob_store.as_ref(), &location, &source).await?;
        Self::with_metadata(blob_store, location, metadata, &options)
    }

    /// Open a dataset whose metadata document lives in the blob store
    pub async fn open_remote(blob_store: Arc<dyn BlobStore>, location: DatasetLocation) -> Result<Self> {
        Self::open(blob_store, location, MetadataSource::Remote, OpenOptions::default()).await
    }

    /// Open a dataset described by a local `*.js` dataset directory
    ///
    /// The storage prefix is derived from the directory path and the
    /// metadata is read from the directory's properties file.
    pub async fn open_local(
        blob_store: Arc<dyn BlobStore>,
        bucket: impl Into<String>,
        dataset_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let dataset_dir = dataset_dir.as_ref();
        let location = DatasetLocation::from_local_path(bucket, dataset_dir)?;
        let source = MetadataSource::local_dataset(dataset_dir);
        Self::open(blob_store, location, source, OpenOptions::default()).await
    }

    /// Create a dataset by writing its metadata document, then open it
    ///
    /// Fails with `AlreadyExists` if the document exists and `overwrite`
    /// is false.
    pub async fn create(
        blob_store: Arc<dyn BlobStore>,
        location: DatasetLocation,
        metadata: DatasetMetadata,
        overwrite: bool,
        options: OpenOptions,
    ) -> Result<Self> {
        metadata.validate()?;
        let store = Self::with_metadata(Arc::clone(&blob_store), location.clone(), metadata, &options)?;
        if let Some(session) = &store.session {
            store_metadata(blob_store.as_ref(), &location, &session.metadata, overwrite).await?;
        }
        info!(location = %location, overwrite, "created frame store dataset");
        Ok(store)
    }

    fn with_metadata(
        blob_store: Arc<dyn BlobStore>,
        location: DatasetLocation,
        metadata: DatasetMetadata,
        options: &OpenOptions,
    ) -> Result<Self> {
        let codec = options.resolve_codec(&metadata)?;
        let layout = RecordLayout::new(&metadata.grid, codec.as_ref(), metadata.header_bytes())?;

        info!(
            location = %location,
            format = %metadata.trace_format,
            frames = metadata.grid.frame_count(),
            trace_record_length = layout.trace_record_length,
            header_record_length = layout.header_record_length,
            "opened frame store"
        );

        Ok(Self {
            session: Some(Session {
                blob_store,
                location,
                trace_buffer: vec![0u8; layout.trace_buffer_capacity()],
                header_buffer: vec![0u8; layout.header_buffer_capacity()],
                metadata,
                layout,
                codec,
                transfer_size: options.transfer_size,
            }),
        })
    }

    /// Release buffers and the blob store handle
    pub fn close(&mut self) -> Result<()> {
        let session = self.session.take().ok_or(FrameStoreError::Closed)?;
        info!(location = %session.location, "closed frame store");
        Ok(())
    }

    pub fn state(&self) -> StoreState {
        if self.session.is_some() {
            StoreState::Open
        } else {
            StoreState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(FrameStoreError::Closed)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(FrameStoreError::Closed)
    }

    /// Get the dataset metadata
    pub fn metadata(&self) -> Result<&DatasetMetadata> {
        Ok(&self.session()?.metadata)
    }

    pub fn grid(&self) -> Result<&GridModel> {
        Ok(&self.session()?.metadata.grid)
    }

    /// Get the record layout
    pub fn layout(&self) -> Result<&RecordLayout> {
        Ok(&self.session()?.layout)
    }

    pub fn location(&self) -> Result<&DatasetLocation> {
        Ok(&self.session()?.location)
    }

    /// Zeroed sample array sized for a full frame
    pub fn allocate_trace_array(&self) -> Result<Array2<f32>> {
        let layout = &self.session()?.layout;
        Ok(Array2::zeros((
            layout.max_traces_per_frame,
            layout.samples_per_trace,
        )))
    }

    /// Zeroed header word array sized for a full frame
    pub fn allocate_header_array(&self) -> Result<Array2<i32>> {
        let layout = &self.session()?.layout;
        Ok(Array2::zeros((layout.max_traces_per_frame, layout.header_words())))
    }

    /// Check whether traces were stored for a frame
    pub async fn frame_exists(&self, volume: i64, frame: i64) -> Result<bool> {
        let session = self.session()?;
        let key = session.key(Namespace::Traces, volume, frame)?;
        session
            .blob_store
            .exists(&session.location.bucket, &key)
            .await
    }

    /// Read and decode the traces of a frame
    ///
    /// A frame that was never written yields a zero trace count and an
    /// empty sample array.
    pub async fn get_frame_traces(&mut self, volume: i64, frame: i64) -> Result<FrameTraces> {
        self.session_mut()?.get_traces(volume, frame).await
    }

    /// Decode the traces of a frame into the leading rows of `samples`
    ///
    /// Returns the trace count. Rows past it are left untouched, as is the
    /// whole array when the call fails.
    pub async fn read_frame_traces_into(
        &mut self,
        volume: i64,
        frame: i64,
        samples: ArrayViewMut2<'_, f32>,
    ) -> Result<usize> {
        let session = self.session_mut()?;
        Session::check_columns("Sample", samples.ncols(), session.layout.samples_per_trace)?;
        let Some(trace_count) = session.fetch(Namespace::Traces, volume, frame).await? else {
            return Ok(0);
        };
        let bytes = session.layout.trace_bytes(trace_count);
        session
            .codec
            .decode(trace_count, &session.trace_buffer[..bytes], samples)?;
        Ok(trace_count)
    }

    /// Fetch the trace object of a frame into the session buffer without
    /// decoding it; `None` when the frame was never written
    pub(crate) async fn fetch_frame_traces(&mut self, volume: i64, frame: i64) -> Result<Option<usize>> {
        self.session_mut()?
            .fetch(Namespace::Traces, volume, frame)
            .await
    }

    /// Encode and store the first `trace_count` rows of `samples`
    ///
    /// Replaces any existing object for the frame.
    pub async fn put_frame_traces(
        &mut self,
        volume: i64,
        frame: i64,
        trace_count: usize,
        samples: ArrayView2<'_, f32>,
    ) -> Result<()> {
        self.session_mut()?
            .put_traces(volume, frame, trace_count, samples)
            .await
    }

    /// Read the header words of a frame
    pub async fn get_frame_headers(&mut self, volume: i64, frame: i64) -> Result<FrameHeaders> {
        let session = self.session_mut()?;
        let header_words = session.layout.header_words();
        Ok(session
            .get_headers(volume, frame)
            .await?
            .unwrap_or_else(|| FrameHeaders {
                trace_count: 0,
                words: Array2::zeros((0, header_words)),
            }))
    }

    /// Decode the header words of a frame into the leading rows of `words`
    pub async fn read_frame_headers_into(
        &mut self,
        volume: i64,
        frame: i64,
        mut words: ArrayViewMut2<'_, i32>,
    ) -> Result<usize> {
        let session = self.session_mut()?;
        session.require_headers()?;
        Session::check_columns("Header", words.ncols(), session.layout.header_words())?;
        let Some(trace_count) = session.fetch(Namespace::Headers, volume, frame).await? else {
            return Ok(0);
        };
        if trace_count > words.nrows() {
            return Err(FrameStoreError::InvalidDimensions(format!(
                "Frame holds {} header records, array has {} rows",
                trace_count,
                words.nrows()
            )));
        }
        decode_header_words(
            &session.header_buffer,
            session.layout.header_record_length,
            session.metadata.byte_order,
            trace_count,
            words.view_mut(),
        );
        Ok(trace_count)
    }

    /// Store the first `trace_count` rows of header words
    pub async fn put_frame_headers(
        &mut self,
        volume: i64,
        frame: i64,
        trace_count: usize,
        words: ArrayView2<'_, i32>,
    ) -> Result<()> {
        self.session_mut()?
            .put_headers(volume, frame, trace_count, words)
            .await
    }

    /// Store raw header records laid out at `src_stride` bytes apart
    ///
    /// Records are copied one by one into the dataset's header stride,
    /// zero-padded when shorter and truncated when longer.
    pub async fn put_frame_header_records(
        &mut self,
        volume: i64,
        frame: i64,
        trace_count: usize,
        src: &[u8],
        src_stride: usize,
    ) -> Result<()> {
        let session = self.session_mut()?;
        session.require_headers()?;
        session.key(Namespace::Headers, volume, frame)?;
        session.layout.check_trace_count(trace_count)?;
        let needed = records_bytes(trace_count, src_stride)?;
        if src.len() < needed {
            return Err(FrameStoreError::InvalidDimensions(format!(
                "{} header records of {} bytes need {} bytes, got {}",
                trace_count,
                src_stride,
                needed,
                src.len()
            )));
        }
        let stride = session.layout.header_record_length;
        restride_records(src, src_stride, &mut session.header_buffer, stride, trace_count);
        session
            .upload(Namespace::Headers, volume, frame, trace_count)
            .await
    }

    /// Read raw header records re-strided to `dest_stride` bytes apart
    pub async fn get_frame_header_records(
        &mut self,
        volume: i64,
        frame: i64,
        dest_stride: usize,
    ) -> Result<HeaderRecords> {
        let session = self.session_mut()?;
        session.require_headers()?;
        let trace_count = session
            .fetch(Namespace::Headers, volume, frame)
            .await?
            .unwrap_or(0);
        let mut bytes = vec![0u8; records_bytes(trace_count, dest_stride)?];
        restride_records(
            &session.header_buffer,
            session.layout.header_record_length,
            &mut bytes,
            dest_stride,
            trace_count,
        );
        Ok(HeaderRecords {
            trace_count,
            stride: dest_stride,
            bytes,
        })
    }

    /// Read headers then traces of a frame
    ///
    /// A frame without a Traces object is a miss regardless of its headers.
    /// When the dataset has headers, a missing Headers object or a header
    /// count differing from the trace count is a format error.
    pub async fn get_frame(&mut self, volume: i64, frame: i64) -> Result<Frame> {
        let session = self.session_mut()?;
        let headers = if session.layout.has_headers() {
            Some(session.get_headers(volume, frame).await?)
        } else {
            None
        };
        let traces = session.get_traces(volume, frame).await?;
        if traces.trace_count == 0 {
            return Ok(Frame {
                trace_count: 0,
                samples: traces.samples,
                headers: None,
            });
        }

        let headers = match headers {
            None => None,
            Some(None) => {
                return Err(format_violation(format!(
                    "Frame V{} F{} of {} has traces but no headers",
                    volume, frame, session.location
                )))
            }
            Some(Some(headers)) if headers.trace_count != traces.trace_count => {
                return Err(format_violation(format!(
                    "Frame V{} F{} of {} has {} header records for {} traces",
                    volume, frame, session.location, headers.trace_count, traces.trace_count
                )))
            }
            Some(Some(headers)) => Some(headers.words),
        };

        Ok(Frame {
            trace_count: traces.trace_count,
            samples: traces.samples,
            headers,
        })
    }

    /// Store headers then traces of a frame
    ///
    /// `headers` must be given exactly when the dataset declares headers.
    pub async fn put_frame(
        &mut self,
        volume: i64,
        frame: i64,
        trace_count: usize,
        samples: ArrayView2<'_, f32>,
        headers: Option<ArrayView2<'_, i32>>,
    ) -> Result<()> {
        let session = self.session_mut()?;
        match (headers, session.layout.has_headers()) {
            (Some(words), true) => {
                session
                    .put_headers(volume, frame, trace_count, words)
                    .await?
            }
            (None, false) => {}
            (Some(_), false) => session.require_headers()?,
            (None, true) => {
                return Err(FrameStoreError::Configuration(format!(
                    "Dataset {} declares trace headers, none given for V{} F{}",
                    session.location, volume, frame
                )))
            }
        }
        session.put_traces(volume, frame, trace_count, samples).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::MemoryBlobStore;
    use crate::metadata::HeaderLayout;
    use crate::types::TraceFormat;

    fn metadata(with_headers: bool) -> DatasetMetadata {
        let grid =
            GridModel::from_triples([(0, 4, 8), (1, 1, 4), (100, 2, 3), (10, 1, 3)]).unwrap();
        let metadata = DatasetMetadata::new(grid, TraceFormat::Float);
        if with_headers {
            metadata.with_headers(HeaderLayout::new(13))
        } else {
            metadata
        }
    }

    async fn create(with_headers: bool) -> (Arc<MemoryBlobStore>, FrameStore) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = FrameStore::create(
            blobs.clone(),
            DatasetLocation::new("bucket", "proj/line"),
            metadata(with_headers),
            false,
            OpenOptions::default(),
        )
        .await
        .unwrap();
        (blobs, store)
    }

    fn samples(rows: usize) -> Array2<f32> {
        Array2::from_shape_fn((rows, 8), |(t, s)| t as f32 + s as f32 / 8.0)
    }

    #[tokio::test]
    async fn test_put_get_traces() {
        let (blobs, mut store) = create(false).await;
        let input = samples(4);
        store.put_frame_traces(11, 102, 3, input.view()).await.unwrap();
        assert_eq!(
            blobs.keys("bucket"),
            vec![
                "proj/line/DatasetProperties.json".to_string(),
                "proj/line/Traces/V11/F102".to_string()
            ]
        );

        let traces = store.get_frame_traces(11, 102).await.unwrap();
        assert_eq!(traces.trace_count, 3);
        assert_eq!(traces.samples.dim(), (3, 8));
        for t in 0..3 {
            assert_eq!(traces.samples.row(t), input.row(t));
        }
    }

    #[tokio::test]
    async fn test_soft_miss() {
        let (_, mut store) = create(true).await;
        let traces = store.get_frame_traces(10, 100).await.unwrap();
        assert_eq!(traces.trace_count, 0);
        assert_eq!(traces.samples.nrows(), 0);
        let headers = store.get_frame_headers(10, 100).await.unwrap();
        assert_eq!(headers.trace_count, 0);
        let frame = store.get_frame(10, 100).await.unwrap();
        assert_eq!(frame.trace_count, 0);
        assert!(frame.headers.is_none());
    }

    #[tokio::test]
    async fn test_off_grid_frame_is_range_error() {
        let (_, mut store) = create(false).await;
        let err = store.get_frame_traces(11, 101).await.unwrap_err();
        assert!(matches!(err, FrameStoreError::InvalidRange(_)));
        assert!(store.frame_exists(13, 100).await.is_err());
    }

    #[tokio::test]
    async fn test_header_words_and_records() {
        let (_, mut store) = create(true).await;
        assert_eq!(store.layout().unwrap().header_words(), 4);

        let words = Array2::from_shape_fn((4, 4), |(t, w)| (t * 10 + w) as i32 - 5);
        store.put_frame_headers(12, 104, 2, words.view()).await.unwrap();
        let headers = store.get_frame_headers(12, 104).await.unwrap();
        assert_eq!(headers.trace_count, 2);
        assert_eq!(headers.words.row(1), words.row(1));

        // 20-byte caller records are truncated to the 16-byte dataset stride
        let src: Vec<u8> = (0..40).collect();
        store.put_frame_header_records(12, 104, 2, &src, 20).await.unwrap();
        let records = store.get_frame_header_records(12, 104, 20).await.unwrap();
        assert_eq!(records.trace_count, 2);
        assert_eq!(&records.bytes[..16], &src[..16]);
        assert_eq!(&records.bytes[16..20], &[0, 0, 0, 0]);
        assert_eq!(&records.bytes[20..36], &src[20..36]);
    }

    #[tokio::test]
    async fn test_headers_rejected_without_header_layout() {
        let (_, mut store) = create(false).await;
        let err = store.get_frame_headers(10, 100).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let words = Array2::<i32>::zeros((1, 4));
        assert!(store
            .put_frame(10, 100, 1, samples(1).view(), Some(words.view()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_get_frame_count_mismatch() {
        let (_, mut store) = create(true).await;
        let words = Array2::<i32>::zeros((4, 4));
        store.put_frame_headers(10, 100, 2, words.view()).await.unwrap();
        store.put_frame_traces(10, 100, 3, samples(3).view()).await.unwrap();
        let err = store.get_frame(10, 100).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn test_trace_count_limits() {
        let (_, mut store) = create(false).await;
        assert!(store
            .put_frame_traces(10, 100, 5, samples(5).view())
            .await
            .is_err());
        assert!(store
            .put_frame_traces(10, 100, 3, samples(2).view())
            .await
            .is_err());
        let wrong_width = Array2::<f32>::zeros((4, 7));
        assert!(store
            .put_frame_traces(10, 100, 1, wrong_width.view())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_header_record_stride_overflow() {
        let (blobs, mut store) = create(true).await;
        let err = store
            .put_frame_header_records(10, 100, 2, &[0u8; 8], usize::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameStoreError::InvalidDimensions(_)));
        assert!(!blobs
            .keys("bucket")
            .contains(&"proj/line/Headers/V10/F100".to_string()));

        store
            .put_frame_header_records(10, 100, 2, &[1u8; 26], 13)
            .await
            .unwrap();
        let err = store
            .get_frame_header_records(10, 100, usize::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameStoreError::InvalidDimensions(_)));
    }

    #[tokio::test]
    async fn test_oversized_grid_rejected_at_create() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let grid =
            GridModel::from_triples([(0, 1, 1 << 62), (1, 1, 4), (100, 2, 3), (10, 1, 3)])
                .unwrap();
        let err = FrameStore::create(
            blobs,
            DatasetLocation::new("bucket", "proj/line"),
            DatasetMetadata::new(grid, TraceFormat::Float),
            false,
            OpenOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_read_into_leaves_array_untouched_on_failure() {
        let (blobs, mut store) = create(false).await;
        let mut metadata = ObjectMetadata::new();
        metadata.insert(TRACE_COUNT_ATTRIBUTE.to_string(), "two".to_string());
        blobs
            .put("bucket", "proj/line/Traces/V10/F100", &[0u8; 64], &metadata)
            .await
            .unwrap();

        let mut array = Array2::from_elem((4, 8), 7.0f32);
        let err = store
            .read_frame_traces_into(10, 100, array.view_mut())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(array.iter().all(|&v| v == 7.0));
    }

    #[tokio::test]
    async fn test_codec_format_must_match() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let codec = get_codec(TraceFormat::Double, ByteOrder::LittleEndian).unwrap();
        let result = FrameStore::create(
            blobs.clone(),
            DatasetLocation::new("bucket", "p"),
            metadata(false),
            false,
            OpenOptions::default().with_codec(codec),
        )
        .await;
        assert!(matches!(result, Err(FrameStoreError::Configuration(_))));
        // nothing is written when the session cannot be built
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_close() {
        let (_, mut store) = create(false).await;
        assert_eq!(store.state(), StoreState::Open);
        store.close().unwrap();
        assert_eq!(store.state(), StoreState::Closed);
        assert!(matches!(store.close(), Err(FrameStoreError::Closed)));
        assert!(matches!(
            store.get_frame_traces(10, 100).await,
            Err(FrameStoreError::Closed)
        ));
        assert!(store.grid().is_err());
    }
}
