pub mod alert;
pub mod capture;
pub mod cli;
pub mod db;
pub mod monitor;
pub mod motion;
pub mod pipeline;
pub mod retention;
pub mod settings;
mod utils;

use std::process::ExitCode;

use clap::Parser;
use log::error;

pub use db::{CaptureEvent, Database, NewPostureEvent, PostureEvent, PruneLimits};
pub use monitor::{FrameSource, Monitor, StreamEnd};
pub use motion::MotionGate;
pub use pipeline::{FrameDecision, FramePipeline};
pub use retention::RetentionWorker;
pub use settings::Settings;

pub fn run() -> ExitCode {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = cli::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
