pub mod app;
pub mod assets;
pub mod bloom;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod geodesic;
pub mod grid;
pub mod gui;
pub mod image;
pub mod input;
pub mod physics;
pub mod render;
pub mod scene;
pub mod state;
pub mod targets;
pub mod tracer;
pub mod types;

pub use error::{Error, Result};
