//! Dataset metadata document
//!
//! Created once with the dataset and read-only afterwards. Stored as JSON at
//! `<prefix>/DatasetProperties.json`, independent of any frame object.

use crate::error::{FrameStoreError, Result};
use crate::grid::GridModel;
use crate::types::{ByteOrder, TraceFormat};
use chrono::{DateTime, Utc};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata document format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Binary type of a header field element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaderFieldFormat {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl HeaderFieldFormat {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            HeaderFieldFormat::Int32 | HeaderFieldFormat::Float32 => 4,
            HeaderFieldFormat::Int64 | HeaderFieldFormat::Float64 => 8,
        }
    }
}

/// A named value inside each trace's header record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderField {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub format: HeaderFieldFormat,
    /// Byte offset within the record
    pub offset: usize,
    /// Number of elements
    pub count: usize,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, format: HeaderFieldFormat, offset: usize) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            format,
            offset,
            count: 1,
        }
    }

    /// One past the last byte of the field
    pub fn end(&self) -> usize {
        self.offset + self.format.size_in_bytes() * self.count
    }

    /// Read element `element` of this field from a header record
    pub fn value<T: NumCast>(&self, record: &[u8], order: ByteOrder, element: usize) -> Result<T> {
        if element >= self.count {
            return Err(FrameStoreError::InvalidDimensions(format!(
                "Header field {} has {} elements, asked for {}",
                self.name, self.count, element
            )));
        }
        let at = self.offset + element * self.format.size_in_bytes();
        if at + self.format.size_in_bytes() > record.len() {
            return Err(FrameStoreError::InvalidDimensions(format!(
                "Header record of {} bytes too short for field {}",
                record.len(),
                self.name
            )));
        }
        let word = &record[at..];
        let cast = match self.format {
            HeaderFieldFormat::Int32 => <T as NumCast>::from(order.read_i32(word)),
            HeaderFieldFormat::Int64 => <T as NumCast>::from(order.read_i64(word)),
            HeaderFieldFormat::Float32 => <T as NumCast>::from(order.read_f32(word)),
            HeaderFieldFormat::Float64 => <T as NumCast>::from(order.read_f64(word)),
        };
        cast.ok_or_else(|| {
            FrameStoreError::InvalidFormat(format!(
                "Header field {} value not representable in requested type",
                self.name
            ))
        })
    }
}

/// Fixed-width header record description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderLayout {
    /// Declared header length in bytes, before word rounding
    pub header_bytes: usize,
    #[serde(default)]
    pub fields: Vec<HeaderField>,
}

impl HeaderLayout {
    pub fn new(header_bytes: usize) -> Self {
        Self {
            header_bytes,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: HeaderField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&HeaderField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.header_bytes == 0 {
            return Err(FrameStoreError::Metadata(
                "Header layout declares zero bytes".to_string(),
            ));
        }
        for field in &self.fields {
            if field.count == 0 || field.end() > self.header_bytes {
                return Err(FrameStoreError::Metadata(format!(
                    "Header field {} ({}..{}) outside {} byte header",
                    field.name,
                    field.offset,
                    field.end(),
                    self.header_bytes
                )));
            }
        }
        Ok(())
    }
}

/// Map-view geometry of a regular bin grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinGrid {
    /// World coordinates of the first bin
    pub origin: [f64; 2],
    /// Bin spacing along the inline and crossline directions
    pub spacing: [f64; 2],
    /// Inline direction, degrees clockwise from north
    pub azimuth: f64,
    /// Logical (inline, crossline) numbers of the first bin
    pub first_bin: [i64; 2],
}

impl BinGrid {
    /// World coordinates of a logical (inline, crossline) bin
    pub fn bin_to_world(&self, inline: i64, crossline: i64) -> [f64; 2] {
        let di = (inline - self.first_bin[0]) as f64 * self.spacing[0];
        let dx = (crossline - self.first_bin[1]) as f64 * self.spacing[1];
        let (sin, cos) = self.azimuth.to_radians().sin_cos();
        [
            self.origin[0] + di * sin + dx * cos,
            self.origin[1] + di * cos - dx * sin,
        ]
    }
}

/// Complete metadata for a frame store dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Document format version
    pub version: FormatVersion,

    /// Encoding of trace samples
    pub trace_format: TraceFormat,

    /// Byte order of binary words
    pub byte_order: ByteOrder,

    /// True if the dataset stores per-trace headers
    pub has_headers: bool,

    /// Header record description, present iff `has_headers`
    pub headers: Option<HeaderLayout>,

    /// Sample/trace/frame/volume grid
    pub grid: GridModel,

    /// Optional map geometry
    #[serde(default)]
    pub bin_grid: Option<BinGrid>,

    /// Optional reference time of sample zero
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Custom metadata key-value pairs
    #[serde(default)]
    pub custom_metadata: HashMap<String, String>,
}

impl DatasetMetadata {
    /// Create metadata for a header-less dataset
    pub fn new(grid: GridModel, trace_format: TraceFormat) -> Self {
        Self {
            version: FormatVersion::default(),
            trace_format,
            byte_order: ByteOrder::default(),
            has_headers: false,
            headers: None,
            grid,
            bin_grid: None,
            reference_time: None,
            created_at: Utc::now(),
            custom_metadata: HashMap::new(),
        }
    }

    /// Set byte order
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Declare per-trace headers
    pub fn with_headers(mut self, headers: HeaderLayout) -> Self {
        self.has_headers = true;
        self.headers = Some(headers);
        self
    }

    pub fn with_bin_grid(mut self, bin_grid: BinGrid) -> Self {
        self.bin_grid = Some(bin_grid);
        self
    }

    pub fn with_reference_time(mut self, time: DateTime<Utc>) -> Self {
        self.reference_time = Some(time);
        self
    }

    /// Add custom metadata
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_metadata.insert(key.into(), value.into());
    }

    /// Get custom metadata
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.custom_metadata.get(key).map(|s| s.as_str())
    }

    /// Declared header length in bytes, if the dataset has headers
    pub fn header_bytes(&self) -> Option<usize> {
        self.headers.as_ref().map(|h| h.header_bytes)
    }

    /// Check the document is internally consistent
    pub fn validate(&self) -> Result<()> {
        if !self.version.is_compatible(&FormatVersion::CURRENT) {
            return Err(FrameStoreError::Metadata(format!(
                "Unsupported metadata version {}.{}",
                self.version.major, self.version.minor
            )));
        }
        self.grid.validate()?;
        match (&self.headers, self.has_headers) {
            (Some(headers), true) => headers.validate()?,
            (None, false) => {}
            (Some(_), false) => {
                return Err(FrameStoreError::Metadata(
                    "Header layout present but has_headers is false".to_string(),
                ))
            }
            (None, true) => {
                return Err(FrameStoreError::Metadata(
                    "has_headers is set but no header layout is declared".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Serialize to the JSON document form
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and validate a JSON document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let metadata: DatasetMetadata =
            serde_json::from_slice(bytes).map_err(|e| FrameStoreError::Metadata(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }
}
