pub mod mapper;
pub mod render;
pub mod stroke;

pub use mapper::{CoordinateMapper, FitPolicy, remap_point};
pub use render::{draw_cursor, render_drawing};
pub use stroke::StrokeAccumulator;
