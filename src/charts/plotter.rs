//! Chart Plotter Module
//! Builds per-user chart plans (series, colors, markers, reference lines) from the aggregate table.

use crate::config::Variant;
use crate::data::{AggregateTable, FlatRow};
use plotters::style::RGBColor;
use std::collections::HashSet;
use tracing::warn;

/// Ten-color categorical palette (tab10)
pub const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),  // Blue
    RGBColor(255, 127, 14),  // Orange
    RGBColor(44, 160, 44),   // Green
    RGBColor(214, 39, 40),   // Red
    RGBColor(148, 103, 189), // Purple
    RGBColor(140, 86, 75),   // Brown
    RGBColor(227, 119, 194), // Pink
    RGBColor(127, 127, 127), // Grey
    RGBColor(188, 189, 34),  // Olive
    RGBColor(23, 190, 207),  // Cyan
];

pub const TARGET_VALENCE_COLOR: RGBColor = RGBColor(0, 0, 255);
pub const TARGET_AROUSAL_COLOR: RGBColor = RGBColor(255, 165, 0);

/// Point marker drawn on every sample of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerShape {
    Circle,
    Square,
    Diamond,
    TriangleUp,
    TriangleDown,
    TriangleLeft,
    TriangleRight,
    Cross,
    Star,
    Plus,
}

/// Marker order: o s D ^ v < > x * +
pub const MARKERS: [MarkerShape; 10] = [
    MarkerShape::Circle,
    MarkerShape::Square,
    MarkerShape::Diamond,
    MarkerShape::TriangleUp,
    MarkerShape::TriangleDown,
    MarkerShape::TriangleLeft,
    MarkerShape::TriangleRight,
    MarkerShape::Cross,
    MarkerShape::Star,
    MarkerShape::Plus,
];

/// Endless cycle over [`MARKERS`]. One instance is created per chart, so
/// marker assignment depends only on that user's rounds.
#[derive(Debug, Clone, Default)]
pub struct MarkerCycle {
    next: usize,
}

impl MarkerCycle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Iterator for MarkerCycle {
    type Item = MarkerShape;

    fn next(&mut self) -> Option<MarkerShape> {
        let marker = MARKERS[self.next % MARKERS.len()];
        self.next += 1;
        Some(marker)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Solid,
    Dashed,
}

/// One plotted line. `None` values break the line.
#[derive(Debug, Clone)]
pub struct SeriesPlan {
    pub label: String,
    pub points: Vec<(f64, Option<f64>)>,
    pub color: RGBColor,
    pub marker: MarkerShape,
    pub line: LineStyle,
}

impl SeriesPlan {
    /// Smallest and largest x value, if any.
    pub fn x_extent(&self) -> Option<(f64, f64)> {
        let mut xs = self.points.iter().map(|&(x, _)| x);
        let first = xs.next()?;
        Some(xs.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x))))
    }

    /// Runs of consecutive present values.
    pub fn segments(&self) -> Vec<Vec<(f64, f64)>> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        for &(x, y) in &self.points {
            match y {
                Some(y) if y.is_finite() => current.push((x, y)),
                _ => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }
                }
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }
}

/// Horizontal dashed line at a target value.
#[derive(Debug, Clone)]
pub struct ReferenceLine {
    pub label: String,
    pub value: f64,
    pub x_span: (f64, f64),
    pub color: RGBColor,
}

/// Everything needed to draw one user's chart.
#[derive(Debug, Clone)]
pub struct ChartPlan {
    pub user: String,
    pub title: String,
    pub file_name: String,
    pub x_label: String,
    pub y_label: String,
    pub size: (u32, u32),
    pub series: Vec<SeriesPlan>,
    pub reference_lines: Vec<ReferenceLine>,
}

impl ChartPlan {
    /// X axis range covering all series and reference lines.
    pub fn x_range(&self) -> (f64, f64) {
        let extents = self
            .series
            .iter()
            .filter_map(SeriesPlan::x_extent)
            .chain(self.reference_lines.iter().map(|r| r.x_span));
        let (lo, hi) = extents.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (a, b)| {
            (lo.min(a), hi.max(b))
        });
        if !lo.is_finite() || !hi.is_finite() {
            return (0.0, 1.0);
        }
        let lo = lo.min(0.0);
        if hi - lo < 1.0 {
            (lo, lo + 1.0)
        } else {
            (lo, hi)
        }
    }

    /// Y axis range covering every present value, padded by 5%.
    pub fn y_range(&self) -> (f64, f64) {
        let values = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().filter_map(|&(_, y)| y))
            .chain(self.reference_lines.iter().map(|r| r.value))
            .filter(|v| v.is_finite());
        let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !lo.is_finite() {
            return (0.0, 100.0);
        }
        let pad = ((hi - lo) * 0.05).max(1.0);
        (lo - pad, hi + pad)
    }
}

/// Creates chart plans for every user in a table.
pub struct ChartPlotter;

impl ChartPlotter {
    /// Color for the n-th round of a chart.
    pub fn round_color(round_index: usize) -> RGBColor {
        PALETTE[round_index % PALETTE.len()]
    }

    /// Image file name for a user, with unsafe characters replaced.
    pub fn chart_file_name(user: &str, variant: Variant) -> String {
        format!("{}_{}.png", Self::safe_user(user), variant.chart_suffix())
    }

    fn safe_user(user: &str) -> String {
        let safe: String = user
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        if safe.is_empty() || safe == "." || safe == ".." {
            format!("user{}", safe.replace('.', "_"))
        } else {
            safe
        }
    }

    /// File name for `user` not yet in `taken`, numbered from 2 on a clash.
    /// Names are compared ignoring case.
    fn unique_file_name(user: &str, variant: Variant, taken: &mut HashSet<String>) -> String {
        let mut name = Self::chart_file_name(user, variant);
        let mut n = 2;
        while !taken.insert(name.to_lowercase()) {
            name = format!("{}_{}_{}.png", Self::safe_user(user), n, variant.chart_suffix());
            n += 1;
        }
        if n > 2 {
            warn!("Chart name for user {} clashes with another user, using {}", user, name);
        }
        name
    }

    /// One plan per user, in order of first appearance. File names are unique within the run.
    pub fn plan_all(table: &AggregateTable, variant: Variant) -> Vec<ChartPlan> {
        let mut taken = HashSet::new();
        table
            .users()
            .into_iter()
            .map(|user| {
                let rows: Vec<&FlatRow> = table.rows_for_user(user).collect();
                let mut plan = match variant {
                    Variant::Simple => Self::plan_simple(user, &rows),
                    Variant::Rich => Self::plan_rich(user, &rows, &mut MarkerCycle::new()),
                };
                plan.file_name = Self::unique_file_name(user, variant, &mut taken);
                plan
            })
            .collect()
    }

    /// Two slider series against row position plus target reference lines.
    pub fn plan_simple(user: &str, rows: &[&FlatRow]) -> ChartPlan {
        let valence: Vec<(f64, Option<f64>)> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i as f64, r.valence))
            .collect();
        let arousal: Vec<(f64, Option<f64>)> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i as f64, r.arousal))
            .collect();

        let x_max = rows.len().saturating_sub(1) as f64;
        let mut reference_lines = Vec::new();
        if let Some(v) = rows.iter().find_map(|r| r.target_valence) {
            reference_lines.push(ReferenceLine {
                label: "Target Valence".to_string(),
                value: v,
                x_span: (0.0, x_max),
                color: TARGET_VALENCE_COLOR,
            });
        }
        if let Some(a) = rows.iter().find_map(|r| r.target_arousal) {
            reference_lines.push(ReferenceLine {
                label: "Target Arousal".to_string(),
                value: a,
                x_span: (0.0, x_max),
                color: TARGET_AROUSAL_COLOR,
            });
        }

        ChartPlan {
            user: user.to_string(),
            title: format!("Slider evolution - User {}", user),
            file_name: Self::chart_file_name(user, Variant::Simple),
            x_label: "Iteration / Round".to_string(),
            y_label: "Slider value".to_string(),
            size: Variant::Simple.chart_size(),
            series: vec![
                SeriesPlan {
                    label: "Dissatisfied-Satisfied".to_string(),
                    points: valence,
                    color: PALETTE[0],
                    marker: MarkerShape::Circle,
                    line: LineStyle::Solid,
                },
                SeriesPlan {
                    label: "Bored-Excited".to_string(),
                    points: arousal,
                    color: PALETTE[1],
                    marker: MarkerShape::Circle,
                    line: LineStyle::Solid,
                },
            ],
            reference_lines,
        }
    }

    /// Solid valence and dashed arousal series for each round, x = iteration.
    pub fn plan_rich(user: &str, rows: &[&FlatRow], markers: &mut MarkerCycle) -> ChartPlan {
        let mut rounds: Vec<u32> = rows.iter().map(|r| r.round).collect();
        rounds.sort_unstable();
        rounds.dedup();

        let mut series = Vec::with_capacity(rounds.len() * 2);
        for (i, round) in rounds.iter().enumerate() {
            let in_round: Vec<&&FlatRow> = rows.iter().filter(|r| r.round == *round).collect();
            let color = Self::round_color(i);
            let marker = markers.next().unwrap_or(MarkerShape::Circle);

            series.push(SeriesPlan {
                label: format!("R{} - Valence", round),
                points: in_round
                    .iter()
                    .map(|r| (r.iteration as f64, r.valence))
                    .collect(),
                color,
                marker,
                line: LineStyle::Solid,
            });
            series.push(SeriesPlan {
                label: format!("R{} - Arousal", round),
                points: in_round
                    .iter()
                    .map(|r| (r.iteration as f64, r.arousal))
                    .collect(),
                color,
                marker,
                line: LineStyle::Dashed,
            });
        }

        ChartPlan {
            user: user.to_string(),
            title: format!("Emotional evolution - User {}", user),
            file_name: Self::chart_file_name(user, Variant::Rich),
            x_label: "Iteration".to_string(),
            y_label: "Slider value".to_string(),
            size: Variant::Rich.chart_size(),
            series,
            reference_lines: Vec::new(),
        }
    }
}
