//! Solar panel soiling analysis.
//!
//! Merges a light/temperature sensor feed with inverter generation data,
//! computes the Performance Ratio per half-hour, and turns the PR trend into a
//! soiling loss estimate and a cleaning interval.

pub mod analysis;
pub mod config;
pub mod degradation;
pub mod error;
pub mod irradiance;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod performance;
pub mod recovery;
pub mod report;
pub mod temperature;

pub use analysis::{analyze, AnalysisResponse};
pub use config::AnalysisConfig;
pub use error::{Error, ErrorKind, Result};
