// src/utils/mod.rs
use log::{info, LevelFilter};

pub mod timing;

pub use timing::Timer;

/// Installs the global logger: `[LEVEL][target] message` on stdout.
pub fn setup_logging(level: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // reqwest/hyper are chatty at debug
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized at {}.", level);
    Ok(())
}
