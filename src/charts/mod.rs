//! Charts module - Chart planning and rendering

mod plotter;
mod renderer;

pub use plotter::ChartPlotter;
pub use renderer::{ChartError, StaticChartRenderer};
