// ABOUTME: Validated domain types shared across deployment phases.
// ABOUTME: Project names and untagged image names.

mod image_name;
mod project_name;

pub use image_name::{ImageName, ImageNameError};
pub use project_name::{ProjectName, ProjectNameError};
