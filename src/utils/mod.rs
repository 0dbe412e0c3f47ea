//! # Utility Modules
//!
//! Supporting utilities for geometry and logging.
//!
//! ## Components
//! - **Geometry**: 2D vectors, Euclidean distances, medians for the
//!   mobility scoring functions
//! - **Logging**: structured logging configuration (feature `logging`)

pub mod geometry;
#[cfg(feature = "logging")]
pub mod logging;

pub use geometry::{median, Vec2};
