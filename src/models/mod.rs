pub mod common;
pub mod image;
pub mod output;
pub mod upstream;

pub use common::*;
pub use image::*;
pub use output::*;
pub use upstream::*;
