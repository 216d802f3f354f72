//! Demand forecasting and skill recommendations.

mod forecaster;
mod insight;
pub mod smoothing;

pub use forecaster::Forecaster;
pub use insight::InsightEngine;

pub const CRATE_NAME: &str = "skillcast-forecast";
