//! The control loop driving sample, evaluate, dispatch on a fixed interval

mod engine;

pub use engine::MonitorEngine;
