//! Handlers 模块

pub mod bridge;
pub mod metrics;
pub mod power;

pub use bridge::*;
pub use metrics::*;
pub use power::*;
