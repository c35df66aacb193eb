//! Storage key construction and parsing
//!
//! Frame objects live at `<prefix>/<namespace>/V<volume>/F<frame>` where the
//! volume and frame are logical grid values rendered as plain decimal
//! integers. Logical values are embedded rather than zero-based indices so
//! keys stay stable if the in-memory index origin changes.

use crate::error::{FrameStoreError, Result};
use crate::DATASET_PROPERTIES_NAME;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Independent object families stored per (volume, frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    Traces,
    Headers,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Traces => "Traces",
            Namespace::Headers => "Headers",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Traces" => Some(Namespace::Traces),
            "Headers" => Some(Namespace::Headers),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical (volume, frame) coordinate of one stored frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameKey {
    pub volume: i64,
    pub frame: i64,
}

impl FrameKey {
    pub fn new(volume: i64, frame: i64) -> Self {
        Self { volume, frame }
    }

    /// Storage key of this frame's object in `namespace`
    pub fn key(&self, prefix: &str, namespace: Namespace) -> String {
        frame_key(prefix, namespace, self.volume, self.frame)
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}/F{}", self.volume, self.frame)
    }
}

/// Build the storage key for a frame object
///
/// The prefix is used verbatim; callers must supply key-safe characters.
pub fn frame_key(prefix: &str, namespace: Namespace, volume: i64, frame: i64) -> String {
    format!("{}/{}/V{}/F{}", prefix, namespace.as_str(), volume, frame)
}

/// Split a frame object key back into `(prefix, namespace, frame key)`
pub fn parse_frame_key(key: &str) -> Result<(String, Namespace, FrameKey)> {
    let invalid = || FrameStoreError::InvalidFormat(format!("Not a frame object key: {}", key));

    let mut parts = key.rsplitn(4, '/');
    let frame = parts.next().ok_or_else(invalid)?;
    let volume = parts.next().ok_or_else(invalid)?;
    let namespace = parts.next().ok_or_else(invalid)?;
    let prefix = parts.next().ok_or_else(invalid)?;

    let namespace = Namespace::parse(namespace).ok_or_else(invalid)?;
    let volume = parse_component(volume, 'V').ok_or_else(invalid)?;
    let frame = parse_component(frame, 'F').ok_or_else(invalid)?;

    Ok((prefix.to_string(), namespace, FrameKey::new(volume, frame)))
}

fn parse_component(component: &str, tag: char) -> Option<i64> {
    let digits = component.strip_prefix(tag)?;
    let value: i64 = digits.parse().ok()?;
    // Reject forms the key builder never produces ("+5", "007", "-0")
    if value.to_string() != digits {
        return None;
    }
    Some(value)
}

/// Key of the dataset metadata document under `prefix`
pub fn metadata_key(prefix: &str) -> String {
    format!("{}/{}", prefix, DATASET_PROPERTIES_NAME)
}

/// Suffix marking a local dataset directory
pub const LOCAL_DATASET_SUFFIX: &str = ".js";

/// Derive the default storage prefix from a local dataset path
///
/// `/data/project/line/shots.js` maps to `project/line/shots`. Returns
/// `None` when the name lacks the dataset suffix or the path has fewer than
/// two named parent directories.
pub fn derive_storage_key_from_local_path(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    let name = path.file_name()?.to_str()?;
    let base = name.strip_suffix(LOCAL_DATASET_SUFFIX)?;
    if base.is_empty() {
        return None;
    }

    let parent = path.parent()?;
    let parent_name = parent.file_name()?.to_str()?;
    let grandparent_name = parent.parent()?.file_name()?.to_str()?;

    Some(format!("{}/{}/{}", grandparent_name, parent_name, base))
}
