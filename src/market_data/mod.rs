pub mod bucketing;
pub mod candle_builder;
pub mod reshape;

pub use candle_builder::{BuilderStep, PartialCandleBuilder};
pub use reshape::{reshape, ChartRecord};
