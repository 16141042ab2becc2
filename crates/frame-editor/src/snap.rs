//! Snapping engine.
//!
//! Snaps a moving rectangle against the grid, sibling edges and centers, the
//! parent box, and equal-gap distribution among siblings. Each axis is
//! resolved independently: the nearest candidate within the threshold wins,
//! and a later candidate only replaces the current winner when strictly
//! nearer.

use frame_core::geometry::{Axis, Point, Rect};
use serde::{Deserialize, Serialize};

/// Two candidate deltas closer than this are treated as the same snap.
const SAME_SNAP_EPSILON: f32 = 0.01;
/// Gap equality tolerance for distribution snapping, in world units.
const GAP_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapConfig {
    pub enabled: bool,
    /// Threshold in screen pixels; divided by `zoom` for world units.
    pub threshold_px: f32,
    pub grid_size: f32,
    pub grid: bool,
    pub edges: bool,
    pub centers: bool,
    pub parent: bool,
    pub distribution: bool,
    /// Round the final position to whole units.
    pub pixel_snap: bool,
    pub zoom: f32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_px: 6.0,
            grid_size: 8.0,
            grid: false,
            edges: true,
            centers: true,
            parent: true,
            distribution: true,
            pixel_snap: false,
            zoom: 1.0,
        }
    }
}

impl SnapConfig {
    pub fn threshold(&self) -> f32 {
        self.threshold_px / self.zoom.max(f32::EPSILON)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideKind {
    Grid,
    Edge,
    Center,
    Parent,
    Distribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideOrientation {
    /// A vertical line at `x = position` (from snapping on the x axis).
    Vertical,
    /// A horizontal line at `y = position`.
    Horizontal,
}

impl GuideOrientation {
    fn for_axis(axis: Axis) -> Self {
        match axis {
            Axis::Horizontal => GuideOrientation::Vertical,
            Axis::Vertical => GuideOrientation::Horizontal,
        }
    }
}

/// A guide line to draw after a snap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapGuide {
    pub kind: GuideKind,
    pub orientation: GuideOrientation,
    pub position: f32,
    /// Extent of the line along its own direction.
    pub start: f32,
    pub end: f32,
    /// Distance label for distribution guides.
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapResult {
    pub x: f32,
    pub y: f32,
    pub snapped_x: bool,
    pub snapped_y: bool,
    pub guides: Vec<SnapGuide>,
}

#[derive(Debug, Clone)]
struct Candidate {
    delta: f32,
    guide: SnapGuide,
}

#[derive(Debug, Clone, Default)]
pub struct SnapEngine {
    pub config: SnapConfig,
}

impl SnapEngine {
    pub fn new(config: SnapConfig) -> Self {
        Self { config }
    }

    /// Snap `moving` (its proposed world rect) against `siblings` and
    /// `parent`. Returns the snapped top-left.
    pub fn snap(&self, moving: Rect, siblings: &[Rect], parent: Option<Rect>) -> SnapResult {
        if !self.config.enabled {
            return self.finish(moving.x, moving.y, false, false, Vec::new());
        }
        let (dx, gx) = self.snap_axis(Axis::Horizontal, &moving, siblings, parent);
        let (dy, gy) = self.snap_axis(Axis::Vertical, &moving, siblings, parent);
        let mut guides = gx;
        guides.extend(gy);
        log::trace!(
            "snap ({}, {}) → dx={dx:?} dy={dy:?}, {} guides",
            moving.x,
            moving.y,
            guides.len()
        );
        self.finish(
            moving.x + dx.unwrap_or(0.0),
            moving.y + dy.unwrap_or(0.0),
            dx.is_some(),
            dy.is_some(),
            guides,
        )
    }

    /// Snap a single point (resize handle, pen input).
    pub fn snap_point(&self, point: Point, siblings: &[Rect], parent: Option<Rect>) -> SnapResult {
        self.snap(Rect::new(point.x, point.y, 0.0, 0.0), siblings, parent)
    }

    fn finish(&self, x: f32, y: f32, sx: bool, sy: bool, guides: Vec<SnapGuide>) -> SnapResult {
        let (x, y) = if self.config.pixel_snap {
            (x.round(), y.round())
        } else {
            (x, y)
        };
        SnapResult {
            x,
            y,
            snapped_x: sx,
            snapped_y: sy,
            guides,
        }
    }

    fn snap_axis(
        &self,
        axis: Axis,
        moving: &Rect,
        siblings: &[Rect],
        parent: Option<Rect>,
    ) -> (Option<f32>, Vec<SnapGuide>) {
        let candidates = self.candidates(axis, moving, siblings, parent);
        let threshold = self.config.threshold();

        let mut best: Option<f32> = None;
        for c in &candidates {
            if c.delta.abs() > threshold {
                continue;
            }
            match best {
                Some(b) if c.delta.abs() >= b.abs() => {}
                _ => best = Some(c.delta),
            }
        }
        let Some(best) = best else {
            return (None, Vec::new());
        };

        let mut guides: Vec<SnapGuide> = Vec::new();
        for c in candidates {
            if (c.delta - best).abs() > SAME_SNAP_EPSILON {
                continue;
            }
            let duplicate = guides.iter().any(|g| {
                g.orientation == c.guide.orientation
                    && (g.position - c.guide.position).abs() < SAME_SNAP_EPSILON
            });
            if !duplicate {
                guides.push(c.guide);
            }
        }
        (Some(best), guides)
    }

    fn candidates(
        &self,
        axis: Axis,
        moving: &Rect,
        siblings: &[Rect],
        parent: Option<Rect>,
    ) -> Vec<Candidate> {
        let cfg = &self.config;
        let cross = axis.cross();
        let orientation = GuideOrientation::for_axis(axis);
        let mut out = Vec::new();
        let guide = |kind: GuideKind, position: f32, other: Option<&Rect>, label: Option<String>| {
            let (start, end) = match other {
                Some(o) => (
                    moving.start(cross).min(o.start(cross)),
                    moving.end(cross).max(o.end(cross)),
                ),
                None => (moving.start(cross), moving.end(cross)),
            };
            SnapGuide {
                kind,
                orientation,
                position,
                start,
                end,
                label,
            }
        };

        if cfg.grid && cfg.grid_size > 0.0 {
            let target = (moving.start(axis) / cfg.grid_size).round() * cfg.grid_size;
            out.push(Candidate {
                delta: target - moving.start(axis),
                guide: guide(GuideKind::Grid, target, None, None),
            });
        }

        let moving_edges = [moving.start(axis), moving.end(axis)];
        for s in siblings {
            if cfg.edges {
                for target in [s.start(axis), s.end(axis)] {
                    for from in moving_edges {
                        out.push(Candidate {
                            delta: target - from,
                            guide: guide(GuideKind::Edge, target, Some(s), None),
                        });
                    }
                }
            }
            if cfg.centers {
                out.push(Candidate {
                    delta: s.mid(axis) - moving.mid(axis),
                    guide: guide(GuideKind::Center, s.mid(axis), Some(s), None),
                });
            }
        }

        if let Some(p) = parent.filter(|_| cfg.parent) {
            for (target, from) in [
                (p.start(axis), moving.start(axis)),
                (p.end(axis), moving.end(axis)),
                (p.mid(axis), moving.mid(axis)),
            ] {
                out.push(Candidate {
                    delta: target - from,
                    guide: guide(GuideKind::Parent, target, Some(&p), None),
                });
            }
        }

        if cfg.distribution {
            out.extend(distribution_candidates(axis, moving, siblings, orientation));
        }
        out
    }
}

/// Equal-gap candidates: continue an evenly spaced row of siblings past
/// either end, or center the moving rect between two neighbors.
fn distribution_candidates(
    axis: Axis,
    moving: &Rect,
    siblings: &[Rect],
    orientation: GuideOrientation,
) -> Vec<Candidate> {
    let cross = axis.cross();
    let overlaps_cross = |r: &Rect| {
        r.start(cross) <= moving.end(cross) && r.end(cross) >= moving.start(cross)
    };
    let mut row: Vec<Rect> = siblings.iter().copied().filter(|r| overlaps_cross(r)).collect();
    row.sort_by(|a, b| a.start(axis).total_cmp(&b.start(axis)));

    let span_start = row
        .iter()
        .map(|r| r.start(cross))
        .fold(moving.start(cross), f32::min);
    let span_end = row
        .iter()
        .map(|r| r.end(cross))
        .fold(moving.end(cross), f32::max);
    let make = |delta: f32, position: f32, gap: f32| Candidate {
        delta,
        guide: SnapGuide {
            kind: GuideKind::Distribution,
            orientation,
            position,
            start: span_start,
            end: span_end,
            label: Some(format!("{}", gap.round())),
        },
    };

    let mut out = Vec::new();

    if row.len() >= 2 {
        let gaps: Vec<f32> = row
            .windows(2)
            .map(|w| w[1].start(axis) - w[0].end(axis))
            .collect();
        let gap = gaps[0];
        let even = gap >= 0.0 && gaps.iter().all(|g| (g - gap).abs() <= GAP_TOLERANCE);
        if even {
            if let Some(last) = row.last() {
                let target = last.end(axis) + gap;
                out.push(make(target - moving.start(axis), target, gap));
            }
            if let Some(first) = row.first() {
                let target = first.start(axis) - gap;
                out.push(make(target - moving.end(axis), target, gap));
            }
        }
    }

    // Centered between two adjacent neighbors.
    for w in row.windows(2) {
        let (a, b) = (w[0], w[1]);
        let free = b.start(axis) - a.end(axis) - moving.extent(axis);
        if free >= 0.0 {
            let target = a.end(axis) + free / 2.0;
            out.push(make(target - moving.start(axis), target, free / 2.0));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SnapEngine {
        SnapEngine::new(SnapConfig {
            distribution: false,
            ..SnapConfig::default()
        })
    }

    #[test]
    fn snaps_left_edge_to_sibling_right_edge() {
        let sib = Rect::new(0.0, 0.0, 100.0, 50.0);
        let r = engine().snap(Rect::new(103.0, 200.0, 40.0, 40.0), &[sib], None);
        assert!(r.snapped_x);
        assert_eq!(r.x, 100.0);
        assert!(!r.snapped_y);
        assert_eq!(r.y, 200.0);
        assert_eq!(r.guides[0].kind, GuideKind::Edge);
        assert_eq!(r.guides[0].orientation, GuideOrientation::Vertical);
    }

    #[test]
    fn nearest_candidate_wins() {
        // Left edge 2 away from one sibling, right edge 1 away from another.
        let a = Rect::new(0.0, 0.0, 48.0, 10.0);
        let b = Rect::new(91.0, 0.0, 10.0, 10.0);
        let r = engine().snap(Rect::new(50.0, 100.0, 40.0, 10.0), &[a, b], None);
        assert_eq!(r.x, 51.0);
    }

    #[test]
    fn equal_distance_keeps_first() {
        let a = Rect::new(0.0, 0.0, 48.0, 10.0);
        let b = Rect::new(92.0, 0.0, 10.0, 10.0);
        let r = engine().snap(Rect::new(50.0, 100.0, 40.0, 10.0), &[a, b], None);
        assert_eq!(r.x, 48.0);
        // Both equally distant snaps are not drawn; only ones matching the winner.
        assert!(r.guides.iter().all(|g| g.position == 48.0));
    }

    #[test]
    fn threshold_scales_with_zoom() {
        let sib = Rect::new(0.0, 0.0, 100.0, 50.0);
        let mut e = engine();
        e.config.zoom = 4.0; // 1.5 world units
        let r = e.snap(Rect::new(103.0, 200.0, 40.0, 40.0), &[sib], None);
        assert!(!r.snapped_x);
        e.config.zoom = 0.5; // 12 world units
        let r = e.snap(Rect::new(110.0, 200.0, 40.0, 40.0), &[sib], None);
        assert_eq!(r.x, 100.0);
    }

    #[test]
    fn grid_and_pixel_snap() {
        let e = SnapEngine::new(SnapConfig {
            grid: true,
            edges: false,
            centers: false,
            parent: false,
            distribution: false,
            ..SnapConfig::default()
        });
        let r = e.snap(Rect::new(13.0, 30.5, 10.0, 10.0), &[], None);
        assert_eq!((r.x, r.y), (16.0, 32.0));

        let e = SnapEngine::new(SnapConfig {
            enabled: true,
            edges: false,
            centers: false,
            parent: false,
            distribution: false,
            pixel_snap: true,
            ..SnapConfig::default()
        });
        let r = e.snap(Rect::new(13.4, 30.6, 10.0, 10.0), &[], None);
        assert_eq!((r.x, r.y), (13.0, 31.0));
        assert!(!r.snapped_x);
    }

    #[test]
    fn grid_and_edge_compete_by_distance() {
        let e = SnapEngine::new(SnapConfig {
            grid: true,
            centers: false,
            parent: false,
            distribution: false,
            ..SnapConfig::default()
        });
        let vertical = |r: &SnapResult| -> Vec<(GuideKind, f32)> {
            r.guides
                .iter()
                .filter(|g| g.orientation == GuideOrientation::Vertical)
                .map(|g| (g.kind, g.position))
                .collect()
        };

        // Sibling edge 1 away, nearest grid line (104) 2 away.
        let sib = Rect::new(0.0, 0.0, 101.0, 10.0);
        let r = e.snap(Rect::new(102.0, 304.0, 10.0, 10.0), &[sib], None);
        assert_eq!(r.x, 101.0);
        assert_eq!(vertical(&r), vec![(GuideKind::Edge, 101.0)]);

        // Grid line 1 away, sibling edge 4 away.
        let sib = Rect::new(0.0, 0.0, 99.0, 10.0);
        let r = e.snap(Rect::new(103.0, 304.0, 10.0, 10.0), &[sib], None);
        assert_eq!(r.x, 104.0);
        assert_eq!(vertical(&r), vec![(GuideKind::Grid, 104.0)]);
    }

    #[test]
    fn distribution_continues_even_row() {
        let e = SnapEngine::new(SnapConfig {
            edges: false,
            centers: false,
            parent: false,
            ..SnapConfig::default()
        });
        let row = [
            Rect::new(0.0, 0.0, 50.0, 50.0),
            Rect::new(70.0, 0.0, 50.0, 50.0),
        ];
        let r = e.snap(Rect::new(143.0, 0.0, 50.0, 50.0), &row, None);
        assert_eq!(r.x, 140.0);
        let g = r
            .guides
            .iter()
            .find(|g| g.kind == GuideKind::Distribution)
            .unwrap();
        assert_eq!(g.label.as_deref(), Some("20"));
    }

    #[test]
    fn guides_deduplicated() {
        // Two siblings sharing the same left edge produce one guide.
        let a = Rect::new(100.0, 0.0, 50.0, 20.0);
        let b = Rect::new(100.0, 50.0, 80.0, 20.0);
        let r = engine().snap(Rect::new(102.0, 300.0, 10.0, 10.0), &[a, b], None);
        let vertical: Vec<_> = r
            .guides
            .iter()
            .filter(|g| g.orientation == GuideOrientation::Vertical)
            .collect();
        assert_eq!(vertical.len(), 1);
        assert_eq!(vertical[0].position, 100.0);
    }

    #[test]
    fn disabled_passes_through() {
        let e = SnapEngine::new(SnapConfig {
            enabled: false,
            ..SnapConfig::default()
        });
        let r = e.snap(Rect::new(103.0, 0.0, 10.0, 10.0), &[Rect::new(0.0, 0.0, 100.0, 10.0)], None);
        assert_eq!(r.x, 103.0);
        assert!(r.guides.is_empty());
    }
}
