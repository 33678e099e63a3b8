mod app;
mod config;
mod logging;
mod signal;
mod telemetry;

pub use app::run_from_args;
