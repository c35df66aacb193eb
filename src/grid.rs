//! Four-axis logical grid - maps logical coordinates to zero-based indices
//! and validates requested ranges against the declared extent

use crate::error::{FrameStoreError, Result};
use crate::types::{Axis, LogicalRange};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// One regularly sampled axis of the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisDefinition {
    /// Logical value of index 0
    pub origin: i64,
    /// Logical distance between consecutive indices (non-zero)
    pub increment: i64,
    /// Number of indices along the axis
    pub length: usize,
    /// Axis label (e.g. "TIME", "CHANNEL", "SHOT")
    #[serde(default)]
    pub label: String,
    /// Physical units of the label
    #[serde(default)]
    pub units: String,
}

impl AxisDefinition {
    /// Create a new axis definition
    pub fn new(origin: i64, increment: i64, length: usize) -> Result<Self> {
        let axis = Self {
            origin,
            increment,
            length,
            label: String::new(),
            units: String::new(),
        };
        axis.validate()?;
        Ok(axis)
    }

    /// Attach a label and units
    pub fn with_label(mut self, label: impl Into<String>, units: impl Into<String>) -> Self {
        self.label = label.into();
        self.units = units.into();
        self
    }

    /// Check increment, length and that the last logical value is representable
    pub fn validate(&self) -> Result<()> {
        if self.increment == 0 {
            return Err(FrameStoreError::InvalidGrid(
                "Axis increment must be non-zero".to_string(),
            ));
        }
        if self.increment == i64::MIN {
            return Err(FrameStoreError::InvalidGrid(format!(
                "Axis increment {} has no positive magnitude",
                self.increment
            )));
        }
        if self.length == 0 {
            return Err(FrameStoreError::InvalidGrid(
                "Axis length must be at least 1".to_string(),
            ));
        }
        self.checked_logical(self.length - 1).ok_or_else(|| {
            FrameStoreError::InvalidGrid(format!(
                "Axis origin {} increment {} length {} overflows logical range",
                self.origin, self.increment, self.length
            ))
        })?;
        Ok(())
    }

    fn checked_logical(&self, index: usize) -> Option<i64> {
        let index = index.to_i64()?;
        self.increment
            .checked_mul(index)
            .and_then(|offset| self.origin.checked_add(offset))
    }

    /// Logical value of the last index
    pub fn last(&self) -> i64 {
        self.origin + self.increment * (self.length as i64 - 1)
    }

    /// Declared `(origin, last, increment)` triple
    pub fn range(&self) -> LogicalRange {
        LogicalRange::new(self.origin, self.last(), self.increment)
    }

    /// Convert a zero-based index to its logical value
    pub fn index_to_logical(&self, index: usize) -> Result<i64> {
        if index >= self.length {
            return Err(FrameStoreError::InvalidRange(format!(
                "Index {} outside axis of length {}",
                index, self.length
            )));
        }
        self.checked_logical(index).ok_or_else(|| {
            FrameStoreError::InvalidRange(format!("Index {} overflows logical range", index))
        })
    }

    /// Convert a logical value to its zero-based index
    ///
    /// Fails when the value does not fall on the axis' sampling grid or lies
    /// outside the declared extent.
    pub fn logical_to_index(&self, value: i64) -> Result<usize> {
        let offset = value.checked_sub(self.origin).ok_or_else(|| {
            FrameStoreError::InvalidRange(format!("Logical value {} overflows", value))
        })?;
        if offset.checked_rem(self.increment) != Some(0) {
            return Err(FrameStoreError::InvalidRange(format!(
                "Logical value {} is not on the grid {} + n*{}",
                value, self.origin, self.increment
            )));
        }
        match offset.checked_div(self.increment).and_then(|i| i.to_usize()) {
            Some(i) if i < self.length => Ok(i),
            _ => Err(FrameStoreError::InvalidRange(format!(
                "Logical value {} outside declared range {}",
                value,
                self.range()
            ))),
        }
    }

    /// Check if a logical value is one of the axis' sample positions
    pub fn contains(&self, value: i64) -> bool {
        self.logical_to_index(value).is_ok()
    }

    /// Validate and clip a requested logical range against this axis
    ///
    /// The all-zero sentinel selects the full declared range. Any other
    /// request is accepted whole or rejected whole. The returned range
    /// starts on a sample position, so every value it walks is on the axis.
    pub fn restrict(&self, requested: LogicalRange) -> Result<LogicalRange> {
        if requested.is_unrestricted() {
            return Ok(self.range());
        }

        self.validate()?;
        let increment = self.increment.abs();
        let (low, high) = if self.increment > 0 {
            (self.origin, self.last())
        } else {
            (self.last(), self.origin)
        };

        let reject = |reason: &str| {
            Err(FrameStoreError::InvalidRange(format!(
                "Requested {} rejected against declared {}: {}",
                requested,
                self.range(),
                reason
            )))
        };

        if requested.start % increment != 0 {
            return reject("start is not a multiple of the axis increment");
        }
        if requested.start > high {
            return reject("start is beyond the declared end");
        }
        if requested.end < requested.start {
            return reject("end precedes start");
        }
        if requested.end < low {
            return reject("end precedes the declared start");
        }
        if requested.step < increment || requested.step % increment != 0 {
            return reject("step is not a positive multiple of the axis increment");
        }

        // the first sample position at or after the requested start
        let start = low.max(requested.start);
        let start = match (start - low) % increment {
            0 => Some(start),
            rem => start.checked_add(increment - rem),
        };
        let end = high.min(requested.end);
        let start = match start {
            Some(start) if start <= end => start,
            _ => return reject("no sample position between start and end"),
        };
        let end = start + ((end - start) / requested.step) * requested.step;
        Ok(LogicalRange::new(start, end, requested.step))
    }
}

/// Immutable description of the dataset's 4-axis grid
///
/// Axis 0 holds the samples of a trace, axis 1 the traces of a frame, axis 2
/// the frames of a volume and axis 3 the volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridModel {
    axes: [AxisDefinition; 4],
}

impl GridModel {
    /// Create a grid from its four axes, samples first
    pub fn new(axes: [AxisDefinition; 4]) -> Result<Self> {
        let grid = Self { axes };
        grid.validate()?;
        Ok(grid)
    }

    /// Build a grid from `(origin, increment, length)` triples, samples first
    pub fn from_triples(triples: [(i64, i64, usize); 4]) -> Result<Self> {
        let [s, t, f, v] = triples;
        Self::new([
            AxisDefinition::new(s.0, s.1, s.2)?,
            AxisDefinition::new(t.0, t.1, t.2)?,
            AxisDefinition::new(f.0, f.1, f.2)?,
            AxisDefinition::new(v.0, v.1, v.2)?,
        ])
    }

    /// Validate every axis
    pub fn validate(&self) -> Result<()> {
        for (axis, def) in Axis::ALL.iter().zip(self.axes.iter()) {
            def.validate().map_err(|e| {
                FrameStoreError::InvalidGrid(format!("{} axis: {}", axis, e))
            })?;
        }
        Ok(())
    }

    pub fn axis(&self, axis: Axis) -> &AxisDefinition {
        &self.axes[axis.to_index()]
    }

    pub fn axes(&self) -> &[AxisDefinition; 4] {
        &self.axes
    }

    /// Axis lengths, samples first
    pub fn shape(&self) -> [usize; 4] {
        [
            self.axes[0].length,
            self.axes[1].length,
            self.axes[2].length,
            self.axes[3].length,
        ]
    }

    pub fn samples_per_trace(&self) -> usize {
        self.axes[0].length
    }

    pub fn max_traces_per_frame(&self) -> usize {
        self.axes[1].length
    }

    /// Total number of (volume, frame) pairs
    pub fn frame_count(&self) -> usize {
        self.axes[2].length * self.axes[3].length
    }

    pub fn frame_range(&self) -> LogicalRange {
        self.axes[2].range()
    }

    pub fn volume_range(&self) -> LogicalRange {
        self.axes[3].range()
    }

    pub fn index_to_logical(&self, axis: Axis, index: usize) -> Result<i64> {
        self.axis(axis).index_to_logical(index)
    }

    pub fn logical_to_index(&self, axis: Axis, value: i64) -> Result<usize> {
        self.axis(axis).logical_to_index(value)
    }

    pub fn contains(&self, axis: Axis, value: i64) -> bool {
        self.axis(axis).contains(value)
    }

    pub fn restrict_range(&self, axis: Axis, requested: LogicalRange) -> Result<LogicalRange> {
        self.axis(axis).restrict(requested)
    }

    /// Convert per-axis indices to logical values
    pub fn indices_to_logical(&self, indices: [usize; 4]) -> Result<[i64; 4]> {
        let mut values = [0i64; 4];
        for (i, value) in values.iter_mut().enumerate() {
            *value = self.axes[i].index_to_logical(indices[i])?;
        }
        Ok(values)
    }

    /// Check that a (volume, frame) logical pair lies on the grid
    pub fn check_frame(&self, volume: i64, frame: i64) -> Result<()> {
        self.axis(Axis::Volume).logical_to_index(volume)?;
        self.axis(Axis::Frame).logical_to_index(frame)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_grid() -> GridModel {
        GridModel::from_triples([(0, 4, 250), (1, 1, 4), (100, 2, 3), (10, 1, 3)]).unwrap()
    }

    #[test]
    fn test_axis_validation() {
        assert!(AxisDefinition::new(0, 0, 10).is_err());
        assert!(AxisDefinition::new(0, 1, 0).is_err());
        assert!(AxisDefinition::new(i64::MAX, 1, 2).is_err());
        assert!(AxisDefinition::new(-5, -5, 10).is_ok());
    }

    #[test]
    fn test_grid_shape() {
        let grid = test_grid();
        assert_eq!(grid.shape(), [250, 4, 3, 3]);
        assert_eq!(grid.samples_per_trace(), 250);
        assert_eq!(grid.max_traces_per_frame(), 4);
        assert_eq!(grid.frame_count(), 9);
        assert_eq!(grid.frame_range(), LogicalRange::new(100, 104, 2));
        assert_eq!(grid.volume_range(), LogicalRange::new(10, 12, 1));
        assert!(grid.contains(Axis::Frame, 102));
        assert!(!grid.contains(Axis::Frame, 103));
        assert!(!grid.contains(Axis::Volume, 13));
    }

    #[test]
    fn test_index_round_trip() {
        let grid = test_grid();
        for axis in Axis::ALL {
            let def = grid.axis(axis);
            for i in 0..def.length {
                let value = grid.index_to_logical(axis, i).unwrap();
                assert_eq!(grid.logical_to_index(axis, value).unwrap(), i);
            }
        }
    }

    #[test]
    fn test_negative_increment_round_trip() {
        let axis = AxisDefinition::new(50, -5, 11).unwrap();
        assert_eq!(axis.last(), 0);
        assert_eq!(axis.logical_to_index(35).unwrap(), 3);
        assert_eq!(axis.index_to_logical(3).unwrap(), 35);

        let descending = AxisDefinition::new(0, -1, 4).unwrap();
        assert!(descending.logical_to_index(i64::MIN).is_err());
        assert_eq!(descending.logical_to_index(-3).unwrap(), 3);
    }

    #[test]
    fn test_logical_to_index_off_grid() {
        let grid = test_grid();
        assert!(matches!(
            grid.logical_to_index(Axis::Frame, 101),
            Err(FrameStoreError::InvalidRange(_))
        ));
        assert!(grid.logical_to_index(Axis::Frame, 106).is_err());
        assert!(grid.logical_to_index(Axis::Frame, 98).is_err());
        assert!(grid.index_to_logical(Axis::Volume, 3).is_err());
    }

    #[test]
    fn test_indices_to_logical() {
        let grid = test_grid();
        assert_eq!(grid.indices_to_logical([2, 3, 1, 2]).unwrap(), [8, 4, 102, 12]);
    }

    #[test]
    fn test_check_frame() {
        let grid = test_grid();
        assert!(grid.check_frame(11, 102).is_ok());
        assert!(grid.check_frame(13, 102).is_err());
        assert!(grid.check_frame(11, 103).is_err());
    }

    fn five_axis() -> AxisDefinition {
        AxisDefinition::new(0, 5, 11).unwrap()
    }

    #[test]
    fn test_restrict_sentinel_returns_declared() {
        let axis = five_axis();
        assert_eq!(
            axis.restrict(LogicalRange::UNRESTRICTED).unwrap(),
            LogicalRange::new(0, 50, 5)
        );
    }

    #[test]
    fn test_restrict_rejects_unaligned_start() {
        let axis = five_axis();
        assert!(axis.restrict(LogicalRange::new(3, 50, 5)).is_err());
    }

    #[test]
    fn test_restrict_boundaries() {
        let axis = five_axis();
        // start exactly at the declared end
        assert_eq!(
            axis.restrict(LogicalRange::new(50, 50, 5)).unwrap(),
            LogicalRange::new(50, 50, 5)
        );
        // one increment past the declared end
        assert!(axis.restrict(LogicalRange::new(55, 60, 5)).is_err());
        // end exactly at the declared start
        assert_eq!(
            axis.restrict(LogicalRange::new(-10, 0, 5)).unwrap(),
            LogicalRange::new(0, 0, 5)
        );
        // end just below the declared start
        assert!(axis.restrict(LogicalRange::new(-10, -5, 5)).is_err());
        // end precedes start
        assert!(axis.restrict(LogicalRange::new(10, 5, 5)).is_err());
    }

    #[test]
    fn test_restrict_step_rules() {
        let axis = five_axis();
        assert!(axis.restrict(LogicalRange::new(0, 50, 3)).is_err());
        assert!(axis.restrict(LogicalRange::new(0, 50, -5)).is_err());
        assert!(axis.restrict(LogicalRange::new(0, 50, 1)).is_err());
        assert_eq!(
            axis.restrict(LogicalRange::new(0, 47, 10)).unwrap(),
            LogicalRange::new(0, 40, 10)
        );
    }

    #[test]
    fn test_restrict_clips_to_declared() {
        let axis = five_axis();
        assert_eq!(
            axis.restrict(LogicalRange::new(-10, 80, 5)).unwrap(),
            LogicalRange::new(0, 50, 5)
        );

        let frames = AxisDefinition::new(100, 2, 3).unwrap();
        assert_eq!(
            frames.restrict(LogicalRange::new(0, 100, 2)).unwrap(),
            LogicalRange::new(100, 100, 2)
        );
        assert!(frames.restrict(LogicalRange::new(0, 98, 2)).is_err());
    }

    #[test]
    fn test_restrict_snaps_start_onto_offset_grid() {
        // sample positions 1, 3, 5, 7, 9
        let axis = AxisDefinition::new(1, 2, 5).unwrap();
        let range = axis.restrict(LogicalRange::new(2, 9, 2)).unwrap();
        assert_eq!(range, LogicalRange::new(3, 9, 2));
        assert!(range.values().all(|v| axis.contains(v)));

        let range = axis.restrict(LogicalRange::new(-4, 6, 4)).unwrap();
        assert_eq!(range, LogicalRange::new(1, 5, 4));
        assert!(range.values().all(|v| axis.contains(v)));

        // aligned start whose only candidate lies past the requested end
        assert!(axis.restrict(LogicalRange::new(4, 4, 2)).is_err());
        assert!(axis.restrict(LogicalRange::new(10, 20, 2)).is_err());
    }

    #[test]
    fn test_restrict_negative_increment() {
        // sample positions 50, 45, ..., 0
        let axis = AxisDefinition::new(50, -5, 11).unwrap();
        assert_eq!(
            axis.restrict(LogicalRange::new(0, 50, 5)).unwrap(),
            LogicalRange::new(0, 50, 5)
        );
        assert_eq!(
            axis.restrict(LogicalRange::new(10, 42, 10)).unwrap(),
            LogicalRange::new(10, 40, 10)
        );
        assert_eq!(
            axis.restrict(LogicalRange::new(-20, 100, 5)).unwrap(),
            LogicalRange::new(0, 50, 5)
        );
        assert!(axis.restrict(LogicalRange::new(55, 60, 5)).is_err());
        assert!(axis.restrict(LogicalRange::new(0, 50, -5)).is_err());

        let offset = AxisDefinition::new(49, -2, 5).unwrap();
        let range = offset.restrict(LogicalRange::new(40, 50, 2)).unwrap();
        assert_eq!(range, LogicalRange::new(41, 49, 2));
        assert!(range.values().all(|v| offset.contains(v)));
    }

    #[test]
    fn test_extreme_increment_rejected() {
        assert!(AxisDefinition::new(0, i64::MIN, 1).is_err());
        assert!(AxisDefinition::new(0, i64::MIN + 1, 1).is_ok());

        let axis = AxisDefinition {
            origin: 0,
            increment: i64::MIN,
            length: 1,
            label: String::new(),
            units: String::new(),
        };
        assert!(matches!(
            axis.restrict(LogicalRange::new(0, 0, 1)),
            Err(FrameStoreError::InvalidGrid(_))
        ));
    }

    #[test]
    fn test_grid_serde() {
        let grid = test_grid();
        let json = serde_json::to_string(&grid).unwrap();
        let back: GridModel = serde_json::from_str(&json).unwrap();
        assert_eq!(grid, back);
    }
}
