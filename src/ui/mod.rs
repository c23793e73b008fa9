//! Terminal-facing output.

pub mod render;

pub use render::{NullSink, RenderSink, Renderer};
