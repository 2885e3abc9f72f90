use std::path::{Path, PathBuf};

use log::LevelFilter;
use log4rs::{
    append::rolling_file::{
        policy::compound::{
            roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
        },
        RollingFileAppender,
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

const LOG_NAME: &str = "gsm-console";

type AnyError = Box<dyn std::error::Error>;

fn err(msg: impl Into<String>) -> AnyError {
    Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg.into()))
}

pub fn log_paths(data_dir: &Path) -> (PathBuf, PathBuf) {
    let logs_dir = data_dir.join("logs");
    let log_file = logs_dir.join(format!("{LOG_NAME}.log"));
    (logs_dir, log_file)
}

/// Route `log` records into `<data_dir>/logs/gsm-console.log`.
///
/// A second call is a no-op.
pub fn init(data_dir: &Path, verbose: bool) -> Result<(), AnyError> {
    let (logs_dir, log_file) = log_paths(data_dir);
    std::fs::create_dir_all(&logs_dir).map_err(|e| err(e.to_string()))?;

    // 10MB per file, keep 5 rolled files.
    let roller = FixedWindowRoller::builder()
        .build(
            &logs_dir
                .join(format!("{LOG_NAME}.{{}}.log"))
                .to_string_lossy(),
            5,
        )
        .map_err(|e| err(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));

    let file_appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} {M} - {m}{n}",
        )))
        .build(&log_file, Box::new(policy))
        .map_err(|e| err(e.to_string()))?;

    let cfg_builder =
        Config::builder().appender(Appender::builder().build("file", Box::new(file_appender)));
    let root_builder = Root::builder().appender("file");

    // Dev builds also echo to stderr; stdout belongs to command output.
    #[cfg(debug_assertions)]
    let (cfg_builder, root_builder) = {
        use log4rs::append::console::{ConsoleAppender, Target};
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new("[{l}] {m}{n}")))
            .build();
        (
            cfg_builder.appender(Appender::builder().build("stderr", Box::new(stderr))),
            root_builder.appender("stderr"),
        )
    };

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let cfg = cfg_builder
        .build(root_builder.build(level))
        .map_err(|e| err(e.to_string()))?;

    // Ignore error if already initialized.
    if log4rs::init_config(cfg).is_err() {
        return Ok(());
    }

    std::panic::set_hook(Box::new(|info| {
        log::error!("panic: {info}");
    }));

    log::info!("logger initialized");
    log::info!("log file: {}", log_file.to_string_lossy());
    Ok(())
}
