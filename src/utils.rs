//! Utility functions

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Round `value` up to the next multiple of `alignment`
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);
    match value % alignment {
        0 => value,
        rem => value + alignment - rem,
    }
}

/// Copy `count` fixed-width records between buffers of different stride
///
/// Each record is copied individually; bytes past the source width are
/// zero-filled and source bytes past the destination width are dropped.
pub fn restride_records(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    count: usize,
) {
    let width = src_stride.min(dst_stride);
    for j in 0..count {
        let from = &src[j * src_stride..j * src_stride + width];
        let to = &mut dst[j * dst_stride..(j + 1) * dst_stride];
        to[..width].copy_from_slice(from);
        to[width..].fill(0);
    }
}
