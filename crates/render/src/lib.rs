pub mod canvas;
pub mod engine;
pub mod font;
pub mod request;
pub mod ticks;

pub use engine::{RenderError, render};
pub use request::{GraphError, Rendered, render_request};
