pub mod api;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod http;
pub mod logger;
pub mod models;
pub mod notify;
pub mod poller;
pub mod router;
pub mod session;
pub mod storage;
pub mod tasks;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use crate::cli::Cli;
use crate::config::ConsoleConfig;
use crate::console::Console;
use crate::notify::StdoutNotifier;
use crate::storage::FileStore;

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ConsoleConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(url) = &cli.base_url {
        config.apply_base_url(url);
    }

    let data_dir = match config.data_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    // File logging (<data dir>/logs/gsm-console.log)
    if let Err(e) = logger::init(&data_dir, cli.verbose) {
        eprintln!("failed to initialize logging: {e}");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("failed to start runtime: {e}");
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let storage = Arc::new(FileStore::in_dir(&data_dir));
    let result = runtime.block_on(async move {
        let mut console = Console::new(config, storage, Arc::new(StdoutNotifier))?;
        console.start().await;
        let res = cli::dispatch(&mut console, cli.command).await;
        console.shutdown();
        res
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
