use crate::config::LoggingSettings;
use simplelog::*;
use std::fs::{self, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// `$HOME/.local/share/musicbox/logs/musicbox.log`
pub fn default_log_file() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("musicbox")
        .join("logs")
        .join("musicbox.log"))
}

/// Installs the process-wide logger; later calls are no-ops
pub fn init_logger(settings: &LoggingSettings) -> Result<(), Error> {
    let level: LevelFilter = settings.level.parse().map_err(|_| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("unknown log level '{}'", settings.level),
        )
    })?;

    let path = match &settings.file {
        Some(path) => path.clone(),
        None => default_log_file()?,
    };
    if let Some(log_dir) = path.parent() {
        fs::create_dir_all(log_dir)?;
    }

    let log_file = OpenOptions::new().create(true).append(true).open(&path)?;

    INIT.call_once(|| {
        let mut loggers: Vec<Box<dyn SharedLogger>> =
            vec![WriteLogger::new(level, Config::default(), log_file)];
        if settings.stderr {
            loggers.push(TermLogger::new(
                level,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ));
        }
        if CombinedLogger::init(loggers).is_ok() {
            LOGGER_INITIALIZED.store(true, Ordering::SeqCst);
        }
    });

    if LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Other, "Logger initialization failed"))
    }
}
