//! framestore - frame-addressed trace store on blob storage
//!
//! Stores a regularly gridded seismic dataset (samples × traces × frames ×
//! volumes) as one blob per (volume, frame) pair. Each blob holds a batch of
//! fixed-length trace or header records, and its `traceCount` attribute says
//! how many leading records are valid.
//!
//! # Features
//!
//! - Stable key layout `<prefix>/Traces/V<volume>/F<frame>` (and `Headers`)
//! - Logical/index coordinate mapping and range restriction against the grid
//! - Reusable per-session frame buffers with bounded streaming reads
//! - Pluggable trace codecs (IEEE float built in)
//! - File system and in-memory blob stores, optional S3-compatible HTTP store
//! - Async I/O throughout
//!
//! # Example
//!
//! ```rust,ignore
//! use framestore::{create_blob_store, DatasetLocation, FrameStore};
//!
//! # async fn example() -> framestore::Result<()> {
//! let blobs = create_blob_store("file:///data/blobs").await?;
//! let location = DatasetLocation::new("seismic", "Project/Line/shots");
//! let mut store = FrameStore::open_remote(blobs, location).await?;
//!
//! let traces = store.get_frame_traces(11, 134).await?;
//! println!("{} traces", traces.trace_count);
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod codec;
pub mod error;
pub mod grid;
#[cfg(feature = "http-client")]
pub mod http;
pub mod io;
pub mod layout;
pub mod memory;
pub mod metadata;
pub mod scan;
pub mod source;
pub mod store;
pub mod types;
pub mod utils;

// Re-exports
pub use address::{frame_key, parse_frame_key, FrameKey, Namespace};
pub use codec::{get_codec, IeeeCodec, TraceCodec};
pub use error::{ErrorKind, FrameStoreError, Result};
pub use grid::{AxisDefinition, GridModel};
pub use io::{create_blob_store, BlobObject, BlobStore, FileSystemBlobStore, StorageBackend};
pub use layout::RecordLayout;
pub use memory::MemoryBlobStore;
pub use metadata::{DatasetMetadata, HeaderField, HeaderLayout};
pub use scan::{scan_frames_parallel, FrameReadReport, FrameStatus, ScanSummary};
pub use source::{DatasetLocation, MetadataSource};
pub use store::{Frame, FrameHeaders, FrameStore, FrameTraces, HeaderRecords, OpenOptions, StoreState};
pub use types::{Axis, ByteOrder, LogicalRange, TraceFormat};

/// Version of the framestore implementation
pub const FRAMESTORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the dataset metadata document
pub const DATASET_PROPERTIES_NAME: &str = "DatasetProperties.json";

/// Object attribute holding the number of valid records
pub const TRACE_COUNT_ATTRIBUTE: &str = "traceCount";

/// Default upper bound on bytes requested per body read
pub const DEFAULT_TRANSFER_SIZE: usize = 16384;
