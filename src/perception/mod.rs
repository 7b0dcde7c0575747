pub mod annotator;
pub mod grid;
