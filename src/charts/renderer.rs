//! Static Chart Renderer
//! Draws a chart plan with plotters into an RGB buffer and saves it as PNG.
//!
//! Layout:
//! 1. Title centered on top
//! 2. Grid with axis descriptions
//! 3. One line per series (solid or dashed) with point markers
//! 4. Dashed horizontal reference lines
//! 5. Legend in the upper right corner

use crate::charts::plotter::{ChartPlan, LineStyle, MarkerShape, SeriesPlan};
use image::RgbImage;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use std::f64::consts::{FRAC_PI_2, PI};
use std::path::Path;
use thiserror::Error;

const MARKER_SIZE: i32 = 4;
const DASH_SIZE: u32 = 6;
const DASH_GAP: u32 = 4;

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("Failed to draw chart for {user}: {message}")]
    Draw { user: String, message: String },
    #[error("Rendered buffer does not match a {width}x{height} image")]
    Buffer { width: u32, height: u32 },
    #[error("Failed to save chart {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to create chart directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

type Chart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
type DrawResult<T> = Result<T, Box<dyn std::error::Error>>;

pub struct StaticChartRenderer;

impl StaticChartRenderer {
    /// Render `plan` and write it to `dir/plan.file_name`. Returns the written path.
    pub fn render_to_dir(plan: &ChartPlan, dir: &Path) -> Result<std::path::PathBuf, ChartError> {
        std::fs::create_dir_all(dir).map_err(|source| ChartError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let path = dir.join(&plan.file_name);
        let img = Self::render_image(plan)?;
        img.save(&path).map_err(|source| ChartError::Image {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }

    /// Render `plan` into an in-memory RGB image.
    pub fn render_image(plan: &ChartPlan) -> Result<RgbImage, ChartError> {
        let (width, height) = plan.size;
        let mut buffer = vec![0u8; (width as usize) * (height as usize) * 3];

        {
            let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
            Self::draw(&root, plan).map_err(|e| ChartError::Draw {
                user: plan.user.clone(),
                message: e.to_string(),
            })?;
        }

        RgbImage::from_raw(width, height, buffer).ok_or(ChartError::Buffer { width, height })
    }

    fn draw(root: &DrawingArea<BitMapBackend<'_>, Shift>, plan: &ChartPlan) -> DrawResult<()> {
        root.fill(&WHITE)?;

        let (x_min, x_max) = plan.x_range();
        let (y_min, y_max) = plan.y_range();

        let mut chart = ChartBuilder::on(root)
            .caption(&plan.title, ("sans-serif", 20).into_font())
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

        // Grid
        chart
            .configure_mesh()
            .x_desc(plan.x_label.as_str())
            .y_desc(plan.y_label.as_str())
            .light_line_style(RGBColor(235, 235, 235).stroke_width(1))
            .draw()?;

        for series in &plan.series {
            Self::draw_series(&mut chart, series)?;
        }

        for line in &plan.reference_lines {
            let style = line.color.stroke_width(2);
            let points = vec![(line.x_span.0, line.value), (line.x_span.1, line.value)];
            chart
                .draw_series(DashedLineSeries::new(points, DASH_SIZE, DASH_GAP, style))?
                .label(line.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
        }

        // Legend
        if !plan.series.is_empty() || !plan.reference_lines.is_empty() {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(&WHITE.mix(0.85))
                .border_style(&BLACK)
                .draw()?;
        }

        root.present()?;
        Ok(())
    }

    fn draw_series(chart: &mut Chart<'_, '_>, series: &SeriesPlan) -> DrawResult<()> {
        let style = series.color.stroke_width(2);
        let segments = series.segments();

        // Lines; only the first segment carries the legend entry.
        for (i, segment) in segments.iter().enumerate() {
            let anno = match series.line {
                LineStyle::Solid => chart.draw_series(LineSeries::new(segment.clone(), style))?,
                LineStyle::Dashed => chart.draw_series(DashedLineSeries::new(
                    segment.clone(),
                    DASH_SIZE,
                    DASH_GAP,
                    style,
                ))?,
            };
            if i == 0 {
                let dashed = series.line == LineStyle::Dashed;
                anno.label(series.label.as_str()).legend(move |(x, y)| {
                    if dashed {
                        PathElement::new(vec![(x, y), (x + 8, y)], style)
                    } else {
                        PathElement::new(vec![(x, y), (x + 20, y)], style)
                    }
                });
            }
        }

        // Markers
        let points: Vec<(f64, f64)> = segments.into_iter().flatten().collect();
        Self::draw_markers(chart, &points, series.marker, series.color)
    }

    fn draw_markers(
        chart: &mut Chart<'_, '_>,
        points: &[(f64, f64)],
        marker: MarkerShape,
        color: RGBColor,
    ) -> DrawResult<()> {
        let fill = color.filled();
        let stroke = color.stroke_width(2);
        let s = MARKER_SIZE;

        match marker {
            MarkerShape::Circle => {
                chart.draw_series(points.iter().map(|&p| Circle::new(p, s, fill)))?;
            }
            MarkerShape::Cross => {
                chart.draw_series(points.iter().map(|&p| Cross::new(p, s, stroke)))?;
            }
            MarkerShape::Plus => {
                let outline = vec![(-s, 0), (s, 0), (0, 0), (0, -s), (0, s)];
                chart.draw_series(
                    points
                        .iter()
                        .map(|&p| EmptyElement::at(p) + PathElement::new(outline.clone(), stroke)),
                )?;
            }
            shape => {
                let outline = Self::marker_outline(shape);
                chart.draw_series(
                    points
                        .iter()
                        .map(|&p| EmptyElement::at(p) + Polygon::new(outline.clone(), fill)),
                )?;
            }
        }
        Ok(())
    }

    /// Pixel offsets of filled marker outlines around the data point.
    fn marker_outline(shape: MarkerShape) -> Vec<(i32, i32)> {
        let s = MARKER_SIZE;
        match shape {
            MarkerShape::Square => vec![(-s, -s), (s, -s), (s, s), (-s, s)],
            MarkerShape::Diamond => vec![(0, -s - 1), (s, 0), (0, s + 1), (-s, 0)],
            MarkerShape::TriangleUp => vec![(0, -s - 1), (s, s), (-s, s)],
            MarkerShape::TriangleDown => vec![(0, s + 1), (s, -s), (-s, -s)],
            MarkerShape::TriangleLeft => vec![(-s - 1, 0), (s, -s), (s, s)],
            MarkerShape::TriangleRight => vec![(s + 1, 0), (-s, -s), (-s, s)],
            MarkerShape::Star => (0..10)
                .map(|k| {
                    let radius = if k % 2 == 0 { (s + 2) as f64 } else { (s - 1) as f64 };
                    let angle = PI * (k as f64) / 5.0 - FRAC_PI_2;
                    (
                        (radius * angle.cos()).round() as i32,
                        (radius * angle.sin()).round() as i32,
                    )
                })
                .collect(),
            MarkerShape::Circle | MarkerShape::Cross | MarkerShape::Plus => {
                vec![(-s, -s), (s, -s), (s, s), (-s, s)]
            }
        }
    }
}
