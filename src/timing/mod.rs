pub mod monitoring;

pub use monitoring::{MonitoringDataFrame, PollDataFrame};
