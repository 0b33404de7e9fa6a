//! Runtime settings
//!
//! Layered with the `config` crate, later layers win:
//! - built-in defaults
//! - an optional TOML file
//! - `MUSICBOX__SECTION__KEY` environment variables

use crate::clock::{ClockSettings, DriverSettings, Envelope};
use crate::player::PlayerSettings;
use crate::timeline::{CompilePolicy, RetriggerPolicy};
use crate::transpose::{PitchBand, TransposeError};
use ::config::{Config, ConfigError, Environment, File};
use log::debug;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "MUSICBOX";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompilerSettings {
    pub fallback_duration_ms: u64,
    /// Drop notes without NoteOff instead of closing them after the fallback
    pub drop_unterminated: bool,
    pub retrigger: RetriggerPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransposeSettings {
    pub recommended_low: i32,
    pub recommended_high: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    pub lookahead_ms: u64,
    pub trail_ms: u64,
    pub tick_interval_ms: u64,
    pub visual_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvelopeSettings {
    pub attack_ms: u64,
    pub release_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub level: String,
    /// Log file, defaults to `$HOME/.local/share/musicbox/logs/musicbox.log`
    pub file: Option<PathBuf>,
    /// Also log to stderr
    pub stderr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub compiler: CompilerSettings,
    pub transpose: TransposeSettings,
    pub clock: ClockConfig,
    pub envelope: EnvelopeSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug)]
pub enum SettingsError {
    Config(ConfigError),
    Transpose(TransposeError),
    Invalid(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Config(e) => write!(f, "Configuration error: {}", e),
            SettingsError::Transpose(e) => write!(f, "Configuration error: {}", e),
            SettingsError::Invalid(msg) => write!(f, "Invalid setting: {}", msg),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SettingsError::Config(e) => Some(e),
            SettingsError::Transpose(e) => Some(e),
            SettingsError::Invalid(_) => None,
        }
    }
}

impl From<ConfigError> for SettingsError {
    fn from(e: ConfigError) -> Self {
        SettingsError::Config(e)
    }
}

impl From<TransposeError> for SettingsError {
    fn from(e: TransposeError) -> Self {
        SettingsError::Transpose(e)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compiler: CompilerSettings {
                fallback_duration_ms: 200,
                drop_unterminated: false,
                retrigger: RetriggerPolicy::Restart,
            },
            transpose: TransposeSettings {
                recommended_low: 60,
                recommended_high: 60,
            },
            clock: ClockConfig {
                lookahead_ms: 3000,
                trail_ms: 0,
                tick_interval_ms: 16,
                visual_interval_ms: 30,
            },
            envelope: EnvelopeSettings {
                attack_ms: 20,
                release_ms: 60,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file: None,
                stderr: false,
            },
        }
    }
}

impl Settings {
    /// Defaults, then `file` if given, then `MUSICBOX__*` variables
    pub fn load(file: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with_env_prefix(file, ENV_PREFIX)
    }

    pub fn load_with_env_prefix(file: Option<&Path>, prefix: &str) -> Result<Self, SettingsError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("compiler.fallback_duration_ms", defaults.compiler.fallback_duration_ms)?
            .set_default("compiler.drop_unterminated", defaults.compiler.drop_unterminated)?
            .set_default("compiler.retrigger", "restart")?
            .set_default("transpose.recommended_low", defaults.transpose.recommended_low)?
            .set_default("transpose.recommended_high", defaults.transpose.recommended_high)?
            .set_default("clock.lookahead_ms", defaults.clock.lookahead_ms)?
            .set_default("clock.trail_ms", defaults.clock.trail_ms)?
            .set_default("clock.tick_interval_ms", defaults.clock.tick_interval_ms)?
            .set_default("clock.visual_interval_ms", defaults.clock.visual_interval_ms)?
            .set_default("envelope.attack_ms", defaults.envelope.attack_ms)?
            .set_default("envelope.release_ms", defaults.envelope.release_ms)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.stderr", defaults.logging.stderr)?;

        if let Some(path) = file {
            debug!("Loading settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.pitch_band()?;
        if self.clock.tick_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "clock.tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(SettingsError::Invalid(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    pub fn pitch_band(&self) -> Result<PitchBand, TransposeError> {
        PitchBand::new(
            self.transpose.recommended_low,
            self.transpose.recommended_high,
        )
    }

    pub fn compile_policy(&self) -> CompilePolicy {
        CompilePolicy {
            retrigger: self.compiler.retrigger,
            fallback_duration_ms: (!self.compiler.drop_unterminated)
                .then_some(self.compiler.fallback_duration_ms),
        }
    }

    pub fn envelope(&self) -> Envelope {
        Envelope {
            attack_ms: self.envelope.attack_ms,
            release_ms: self.envelope.release_ms,
        }
    }

    pub fn player_settings(&self) -> Result<PlayerSettings, SettingsError> {
        Ok(PlayerSettings {
            compile: self.compile_policy(),
            band: self.pitch_band()?,
            clock: ClockSettings {
                lookahead_ms: self.clock.lookahead_ms,
                trail_ms: self.clock.trail_ms,
            },
            driver: DriverSettings {
                tick_interval: Duration::from_millis(self.clock.tick_interval_ms),
                visual_interval: Duration::from_millis(self.clock.visual_interval_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.pitch_band().unwrap().center(), 60);
        assert_eq!(settings.compile_policy(), CompilePolicy::default());
    }

    #[test]
    fn drop_unterminated_disables_fallback() {
        let mut settings = Settings::default();
        settings.compiler.drop_unterminated = true;
        assert_eq!(settings.compile_policy().fallback_duration_ms, None);
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let mut settings = Settings::default();
        settings.clock.tick_interval_ms = 0;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));
    }
}
