use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::domain::{Instrument, VolumeTable};
use crate::error::{CloseRtsError, Result};
use crate::strategy::{GateSchedule, Thresholds};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    /// Exchange code, e.g. "RIZ5"
    pub code: String,
    /// Contracts per entry order
    pub volume: Decimal,
    /// Minimum price increment
    pub price_step: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Strategy name, used in order comments and the active-trade store
    #[serde(default = "default_strategy_name")]
    pub name: String,
    pub instruments: Vec<InstrumentConfig>,
    /// Stop-loss distance in percent of the entry price
    pub stop_loss_pct: Decimal,
    /// Take-profit distance in percent of the entry price
    pub take_profit_pct: Decimal,
    /// Threshold on |evening - prior close| in points
    pub day_rate: Decimal,
    /// Threshold on |last - evening| in points
    pub evening_rate: Decimal,
    /// Seed the ledger from the active-trade store at startup
    #[serde(default)]
    pub load_active_trades: bool,
}

fn default_strategy_name() -> String {
    "CloseRts".to_string()
}

impl StrategyConfig {
    pub fn instruments(&self) -> Vec<Instrument> {
        self.instruments
            .iter()
            .map(|i| Instrument::new(i.code.clone(), i.price_step))
            .collect()
    }

    pub fn volume_table(&self) -> Result<VolumeTable> {
        VolumeTable::from_pairs(self.instruments.iter().map(|i| (i.code.clone(), i.volume)))
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            day_rate: self.day_rate,
            evening_rate: self.evening_rate,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Forced exit gate, "HH:MM" market time
    #[serde(default = "default_exit_at")]
    pub exit_at: String,
    /// Entry gate, "HH:MM" market time
    #[serde(default = "default_entry_at")]
    pub entry_at: String,
    /// Seconds added to event time before matching the gate minute
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: i64,
}

fn default_exit_at() -> String {
    "10:05".to_string()
}

fn default_entry_at() -> String {
    "23:45".to_string()
}

fn default_jitter_secs() -> i64 {
    5
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            exit_at: default_exit_at(),
            entry_at: default_entry_at(),
            jitter_secs: default_jitter_secs(),
        }
    }
}

impl ScheduleConfig {
    pub fn gate_schedule(&self) -> Result<GateSchedule> {
        Ok(GateSchedule::new(
            parse_gate_time(&self.exit_at)?,
            parse_gate_time(&self.entry_at)?,
            self.jitter_secs,
        ))
    }
}

fn parse_gate_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| CloseRtsError::Validation(format!("invalid gate time '{}': {}", raw, e)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding one active-trade file per strategy
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaperConfig {
    /// Fill every order as soon as it is registered
    #[serde(default)]
    pub immediate_fill: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("schedule.exit_at", default_exit_at())?
            .set_default("schedule.entry_at", default_entry_at())?
            .set_default("schedule.jitter_secs", default_jitter_secs())?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CLOSERTS_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CLOSERTS_STRATEGY__DAY_RATE, etc.)
            .add_source(
                Environment::with_prefix("CLOSERTS")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let strategy = &self.strategy;

        if strategy.instruments.is_empty() {
            errors.push("at least one instrument must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for inst in &strategy.instruments {
            if !seen.insert(inst.code.as_str()) {
                errors.push(format!("duplicate instrument code {}", inst.code));
            }
            if inst.volume <= Decimal::ZERO {
                errors.push(format!("volume for {} must be positive", inst.code));
            }
            if inst.price_step <= Decimal::ZERO {
                errors.push(format!("price_step for {} must be positive", inst.code));
            }
        }

        if strategy.day_rate < Decimal::ZERO {
            errors.push("day_rate must not be negative".to_string());
        }
        if strategy.evening_rate < Decimal::ZERO {
            errors.push("evening_rate must not be negative".to_string());
        }
        if strategy.stop_loss_pct < Decimal::ZERO || strategy.take_profit_pct < Decimal::ZERO {
            errors.push("stop_loss_pct and take_profit_pct must not be negative".to_string());
        }

        match (
            parse_gate_time(&self.schedule.exit_at),
            parse_gate_time(&self.schedule.entry_at),
        ) {
            (Ok(exit), Ok(entry)) if exit == entry => {
                errors.push("exit_at and entry_at must differ".to_string());
            }
            (Ok(_), Ok(_)) => {}
            (exit, entry) => {
                for err in [exit.err(), entry.err()].into_iter().flatten() {
                    errors.push(err.to_string());
                }
            }
        }

        if self.schedule.jitter_secs < 0 || self.schedule.jitter_secs >= 60 {
            errors.push("jitter_secs must be within 0..60".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> AppConfig {
        AppConfig {
            strategy: StrategyConfig {
                name: default_strategy_name(),
                instruments: vec![InstrumentConfig {
                    code: "RIZ5".to_string(),
                    volume: dec!(1),
                    price_step: dec!(10),
                }],
                stop_loss_pct: dec!(1.5),
                take_profit_pct: dec!(3),
                day_rate: dec!(1500),
                evening_rate: dec!(500),
                load_active_trades: false,
            },
            schedule: ScheduleConfig::default(),
            persistence: PersistenceConfig::default(),
            paper: PaperConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_sample_config_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut cfg = sample();
        cfg.strategy.instruments.push(InstrumentConfig {
            code: "RIZ5".to_string(),
            volume: Decimal::ZERO,
            price_step: dec!(10),
        });
        cfg.strategy.day_rate = dec!(-1);
        cfg.schedule.entry_at = "10:05".to_string();

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn test_bad_gate_time_is_reported() {
        let mut cfg = sample();
        cfg.schedule.exit_at = "25:99".to_string();
        let errors = cfg.validate().unwrap_err();
        assert!(errors[0].contains("invalid gate time"));
    }

    #[test]
    fn test_gate_schedule_from_defaults() {
        let schedule = ScheduleConfig::default().gate_schedule().unwrap();
        assert_eq!(schedule, GateSchedule::default());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[strategy]
instruments = [{ code = "RIZ5", volume = 2, price_step = 10 }]
stop_loss_pct = 1.5
take_profit_pct = 3
day_rate = 1500
evening_rate = 500
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(cfg.strategy.name, "CloseRts");
        assert_eq!(cfg.strategy.instruments[0].volume, dec!(2));
        assert_eq!(cfg.schedule.entry_at, "23:45");
        assert!(!cfg.strategy.load_active_trades);
        assert!(cfg.validate().is_ok());
    }
}
