pub mod timeseries;
pub mod rate_limiter;
pub mod epoch;
pub mod cache;
pub mod orchestrator;
