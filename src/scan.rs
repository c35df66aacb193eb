//! Frame range scanning with per-frame I/O reports

use crate::address::FrameKey;
use crate::error::{FrameStoreError, Result};
use crate::io::BlobStore;
use crate::source::{DatasetLocation, MetadataSource};
use crate::store::{FrameStore, OpenOptions};
use crate::types::{Axis, LogicalRange};
use crate::utils::format_bytes;
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Outcome of reading one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    Ok,
    /// No trace object stored for the frame
    Missing,
    Failed(String),
}

/// I/O report for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReadReport {
    pub volume: i64,
    pub frame: i64,
    pub status: FrameStatus,
    pub trace_count: usize,
    pub bytes: usize,
    pub elapsed_secs: f64,
}

/// Aggregate of a frame range scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Reports in volume-major, frame-minor order
    pub reports: Vec<FrameReadReport>,
    pub total_bytes: usize,
    pub elapsed_secs: f64,
}

impl ScanSummary {
    fn from_reports(reports: Vec<FrameReadReport>, elapsed_secs: f64) -> Self {
        let total_bytes = reports.iter().map(|r| r.bytes).sum();
        Self {
            reports,
            total_bytes,
            elapsed_secs,
        }
    }

    /// Bytes per second over the whole scan
    pub fn io_rate(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.total_bytes as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn missing_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == FrameStatus::Missing)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.status, FrameStatus::Failed(_)))
            .count()
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} frames ({} missing, {} failed), {} in {:.3}s ({}/s)",
            self.reports.len(),
            self.missing_count(),
            self.failed_count(),
            format_bytes(self.total_bytes),
            self.elapsed_secs,
            format_bytes(self.io_rate() as usize)
        )
    }
}

impl FrameStore {
    /// Frames selected by a volume range and a frame range
    ///
    /// Both ranges are restricted against the grid first; the all-zero
    /// range selects a whole axis.
    pub fn frame_keys(&self, volumes: LogicalRange, frames: LogicalRange) -> Result<Vec<FrameKey>> {
        let grid = self.grid()?;
        let volumes = grid.restrict_range(Axis::Volume, volumes)?;
        let frames = grid.restrict_range(Axis::Frame, frames)?;
        Ok(volumes
            .values()
            .flat_map(|volume| frames.values().map(move |frame| FrameKey::new(volume, frame)))
            .collect())
    }

    /// Read every trace object in the selected ranges, reporting per frame
    ///
    /// Per-frame failures are recorded in the report and the scan goes on.
    pub async fn scan_frames(
        &mut self,
        volumes: LogicalRange,
        frames: LogicalRange,
    ) -> Result<ScanSummary> {
        let keys = self.frame_keys(volumes, frames)?;
        let start = Instant::now();
        let reports = self.scan_keys(&keys).await?;
        let summary = ScanSummary::from_reports(reports, start.elapsed().as_secs_f64());
        info!(summary = %summary.summary(), "scanned frames");
        Ok(summary)
    }

    /// Read the trace objects of `keys` in order
    pub async fn scan_keys(&mut self, keys: &[FrameKey]) -> Result<Vec<FrameReadReport>> {
        let record_length = self.layout()?.trace_record_length;
        let mut reports = Vec::with_capacity(keys.len());
        for key in keys {
            let start = Instant::now();
            let (status, trace_count) = match self.fetch_frame_traces(key.volume, key.frame).await {
                Ok(Some(trace_count)) => (FrameStatus::Ok, trace_count),
                Ok(None) => (FrameStatus::Missing, 0),
                Err(FrameStoreError::Closed) => return Err(FrameStoreError::Closed),
                Err(e) => (FrameStatus::Failed(e.to_string()), 0),
            };
            reports.push(FrameReadReport {
                volume: key.volume,
                frame: key.frame,
                status,
                trace_count,
                bytes: trace_count * record_length,
                elapsed_secs: start.elapsed().as_secs_f64(),
            });
        }
        Ok(reports)
    }
}

/// Scan frame ranges with `workers` concurrent sessions
///
/// The selected frames are split into contiguous runs, one per worker, and
/// every worker opens its own session. Reports keep volume-major order.
pub async fn scan_frames_parallel(
    blob_store: Arc<dyn BlobStore>,
    location: DatasetLocation,
    source: MetadataSource,
    options: OpenOptions,
    volumes: LogicalRange,
    frames: LogicalRange,
    workers: usize,
) -> Result<ScanSummary> {
    let start = Instant::now();
    let mut planner = FrameStore::open(
        Arc::clone(&blob_store),
        location.clone(),
        source.clone(),
        options.clone(),
    )
    .await?;
    let keys = planner.frame_keys(volumes, frames)?;
    planner.close()?;

    let workers = workers.clamp(1, keys.len().max(1));
    let run_length = keys.len().div_ceil(workers).max(1);

    let tasks = keys.chunks(run_length).map(|run| {
        let run = run.to_vec();
        let blob_store = Arc::clone(&blob_store);
        let location = location.clone();
        let source = source.clone();
        let options = options.clone();
        async move {
            let mut store = FrameStore::open(blob_store, location, source, options).await?;
            let reports = store.scan_keys(&run).await?;
            store.close()?;
            Ok::<_, FrameStoreError>(reports)
        }
    });

    let reports: Vec<FrameReadReport> = try_join_all(tasks).await?.into_iter().flatten().collect();
    let summary = ScanSummary::from_reports(reports, start.elapsed().as_secs_f64());
    info!(workers, summary = %summary.summary(), "scanned frames in parallel");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridModel;
    use crate::io::ObjectMetadata;
    use crate::memory::MemoryBlobStore;
    use crate::metadata::DatasetMetadata;
    use crate::types::TraceFormat;
    use ndarray::Array2;

    async fn populated() -> (Arc<MemoryBlobStore>, DatasetLocation, FrameStore) {
        let blobs = Arc::new(MemoryBlobStore::new().with_max_chunk(7));
        let location = DatasetLocation::new("bucket", "survey/line");
        let grid =
            GridModel::from_triples([(0, 4, 8), (1, 1, 4), (100, 2, 3), (10, 1, 3)]).unwrap();
        let mut store = FrameStore::create(
            blobs.clone(),
            location.clone(),
            DatasetMetadata::new(grid, TraceFormat::Float),
            false,
            OpenOptions::default(),
        )
        .await
        .unwrap();

        let samples = Array2::<f32>::ones((4, 8));
        store.put_frame_traces(10, 100, 4, samples.view()).await.unwrap();
        store.put_frame_traces(11, 102, 2, samples.view()).await.unwrap();
        (blobs, location, store)
    }

    #[tokio::test]
    async fn test_frame_keys_volume_major() {
        let (_, _, store) = populated().await;
        let keys = store
            .frame_keys(LogicalRange::new(11, 12, 1), LogicalRange::new(0, 102, 2))
            .unwrap();
        assert_eq!(
            keys,
            vec![
                FrameKey::new(11, 100),
                FrameKey::new(11, 102),
                FrameKey::new(12, 100),
                FrameKey::new(12, 102),
            ]
        );
        assert_eq!(
            store
                .frame_keys(LogicalRange::UNRESTRICTED, LogicalRange::UNRESTRICTED)
                .unwrap()
                .len(),
            9
        );
        assert!(store
            .frame_keys(LogicalRange::new(13, 20, 1), LogicalRange::UNRESTRICTED)
            .is_err());
    }

    #[tokio::test]
    async fn test_scan_frames_reports() {
        let (blobs, _, mut store) = populated().await;
        // a corrupt object fails its frame without stopping the scan
        blobs
            .put("bucket", "survey/line/Traces/V12/F104", b"xx", &ObjectMetadata::new())
            .await
            .unwrap();

        let summary = store
            .scan_frames(LogicalRange::UNRESTRICTED, LogicalRange::UNRESTRICTED)
            .await
            .unwrap();
        assert_eq!(summary.reports.len(), 9);
        assert_eq!(summary.reports[0].status, FrameStatus::Ok);
        assert_eq!(summary.reports[0].bytes, 4 * 32);
        assert_eq!(summary.reports[4].trace_count, 2);
        assert_eq!(summary.missing_count(), 6);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.total_bytes, 6 * 32);
        assert!(summary.summary().starts_with("9 frames (6 missing, 1 failed)"));
    }

    #[tokio::test]
    async fn test_scan_frames_parallel_matches_sequential() {
        let (blobs, location, mut store) = populated().await;
        let sequential = store
            .scan_frames(LogicalRange::UNRESTRICTED, LogicalRange::UNRESTRICTED)
            .await
            .unwrap();

        let parallel = scan_frames_parallel(
            blobs,
            location,
            MetadataSource::Remote,
            OpenOptions::default().with_transfer_size(5),
            LogicalRange::UNRESTRICTED,
            LogicalRange::UNRESTRICTED,
            4,
        )
        .await
        .unwrap();

        assert_eq!(parallel.reports.len(), sequential.reports.len());
        assert_eq!(parallel.total_bytes, sequential.total_bytes);
        for (a, b) in parallel.reports.iter().zip(&sequential.reports) {
            assert_eq!((a.volume, a.frame, &a.status), (b.volume, b.frame, &b.status));
        }
    }

    #[tokio::test]
    async fn test_scan_offset_frame_axis_stays_on_grid() {
        let blobs = Arc::new(MemoryBlobStore::new());
        // frames 1, 3, 5, 7, 9
        let grid = GridModel::from_triples([(0, 4, 8), (1, 1, 4), (1, 2, 5), (10, 1, 1)]).unwrap();
        let mut store = FrameStore::create(
            blobs,
            DatasetLocation::new("bucket", "survey/offset"),
            DatasetMetadata::new(grid, TraceFormat::Float),
            false,
            OpenOptions::default(),
        )
        .await
        .unwrap();
        store
            .put_frame_traces(10, 5, 1, Array2::<f32>::ones((1, 8)).view())
            .await
            .unwrap();

        let summary = store
            .scan_frames(LogicalRange::UNRESTRICTED, LogicalRange::new(2, 9, 2))
            .await
            .unwrap();
        let frames: Vec<i64> = summary.reports.iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![3, 5, 7, 9]);
        assert_eq!(summary.failed_count(), 0);
        assert_eq!(summary.missing_count(), 3);
        assert_eq!(summary.reports[1].status, FrameStatus::Ok);
    }

    #[test]
    fn test_io_rate() {
        let summary = ScanSummary {
            reports: Vec::new(),
            total_bytes: 2048,
            elapsed_secs: 2.0,
        };
        assert_eq!(summary.io_rate(), 1024.0);
        assert_eq!(ScanSummary::default().io_rate(), 0.0);
    }
}
