//! Example: create a dataset, write a few frames and scan them back
//!
//! Run with: cargo run --example frame_roundtrip

use framestore::{
    create_blob_store, scan_frames_parallel, DatasetLocation, DatasetMetadata, FrameStore,
    GridModel, HeaderLayout, LogicalRange, MetadataSource, OpenOptions, TraceFormat,
};
use ndarray::Array2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("framestore example: frame roundtrip");
    println!("===================================\n");

    // 1500 samples at 2 ms, up to 240 channels per shot, shots 1000..=1190
    // step 10, two sail lines
    let grid = GridModel::from_triples([(0, 2, 1500), (1, 1, 240), (1000, 10, 20), (1, 1, 2)])?;
    let metadata =
        DatasetMetadata::new(grid, TraceFormat::Float).with_headers(HeaderLayout::new(240));

    let temp_dir = tempfile::tempdir()?;
    let url = format!("file://{}", temp_dir.path().display());
    let blobs = create_blob_store(&url).await?;
    let location = DatasetLocation::new("survey", "NorthSea/Line1/shots");

    let mut store = FrameStore::create(
        blobs.clone(),
        location.clone(),
        metadata,
        false,
        OpenOptions::default(),
    )
    .await?;

    let layout = *store.layout()?;
    println!("Record layout:");
    println!("  trace record:  {} bytes", layout.trace_record_length);
    println!("  header record: {} bytes", layout.header_record_length);
    println!(
        "  frame buffers: {} + {} bytes\n",
        layout.trace_buffer_capacity(),
        layout.header_buffer_capacity()
    );

    let mut samples = store.allocate_trace_array()?;
    let mut headers = store.allocate_header_array()?;
    for shot in (1000..1100).step_by(10) {
        let live = 200 + (shot as usize / 10) % 40;
        samples.indexed_iter_mut().for_each(|((t, s), v)| {
            *v = ((s as f32) * 0.01 + t as f32).sin() * shot as f32
        });
        headers.indexed_iter_mut().for_each(|((t, w), v)| {
            *v = if w == 0 { shot as i32 } else { t as i32 + 1 }
        });
        store
            .put_frame(1, shot, live, samples.view(), Some(headers.view()))
            .await?;
    }

    let frame = store.get_frame(1, 1050).await?;
    println!("Shot 1050: {} live channels", frame.trace_count);
    let first: Array2<f32> = frame.samples.slice(ndarray::s![..1, ..4]).to_owned();
    println!("  first samples: {:?}\n", first.as_slice());
    store.close()?;

    let summary = scan_frames_parallel(
        blobs,
        location,
        MetadataSource::Remote,
        OpenOptions::default(),
        LogicalRange::UNRESTRICTED,
        LogicalRange::UNRESTRICTED,
        4,
    )
    .await?;
    println!("Scan: {}", summary.summary());

    Ok(())
}
