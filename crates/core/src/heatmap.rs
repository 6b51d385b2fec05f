//! Spatial binning for click heatmaps and scroll depth.
//!
//! Click coordinates are normalized to viewport-percentage cells because raw
//! pixel coordinates are not comparable across devices.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceClass;

/// Cells per axis: 0-100% of the viewport in 2% steps.
pub const GRID: u32 = 50;

/// Scroll depth deciles 0..=10, where decile `d` means `d * 10` percent.
pub const DEPTH_DECILES: u8 = 11;

/// Identity of one heatmap surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeatmapKey {
    pub site_id: Uuid,
    pub page_path: String,
    pub device_class: DeviceClass,
}

/// A populated heatmap cell on the fixed-resolution grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub cell_x: u32,
    pub cell_y: u32,
    pub count: u64,
}

/// Bins a click position into grid cells: `floor(coord / extent * GRID)`,
/// clamped to `[0, GRID-1]`. `None` when the viewport dimensions are unusable
/// (those events should already be degraded upstream).
pub fn click_cell(x: f64, y: f64, viewport_w: f64, viewport_h: f64) -> Option<(u32, u32)> {
    if !viewport_w.is_finite() || !viewport_h.is_finite() || viewport_w <= 0.0 || viewport_h <= 0.0
    {
        return None;
    }
    let bin = |coord: f64, extent: f64| -> u32 {
        let raw = (coord / extent * GRID as f64).floor();
        raw.clamp(0.0, (GRID - 1) as f64) as u32
    };
    Some((bin(x, viewport_w), bin(y, viewport_h)))
}

/// Buckets a scroll depth percentage into its decile (0..=10).
pub fn depth_decile(depth_pct: f64) -> u8 {
    (depth_pct.clamp(0.0, 100.0) / 10.0).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_bins_by_viewport_percentage() {
        // 50/400*50 = 6.25 -> 6; 100/800*50 = 6.25 -> 6
        assert_eq!(click_cell(50.0, 100.0, 400.0, 800.0), Some((6, 6)));
        assert_eq!(click_cell(0.0, 0.0, 400.0, 800.0), Some((0, 0)));
    }

    #[test]
    fn click_clamps_to_grid() {
        // Click past the reported viewport edge clamps to the last cell
        assert_eq!(click_cell(500.0, 900.0, 400.0, 800.0), Some((49, 49)));
        assert_eq!(click_cell(-10.0, -10.0, 400.0, 800.0), Some((0, 0)));
    }

    #[test]
    fn click_rejects_unusable_viewport() {
        assert_eq!(click_cell(10.0, 10.0, 0.0, 800.0), None);
        assert_eq!(click_cell(10.0, 10.0, 400.0, -1.0), None);
        assert_eq!(click_cell(10.0, 10.0, f64::NAN, 800.0), None);
    }

    #[test]
    fn depth_deciles() {
        assert_eq!(depth_decile(0.0), 0);
        assert_eq!(depth_decile(9.9), 0);
        assert_eq!(depth_decile(80.0), 8);
        assert_eq!(depth_decile(100.0), 10);
        assert_eq!(depth_decile(250.0), 10);
    }
}
