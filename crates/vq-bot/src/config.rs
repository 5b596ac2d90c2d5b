//! Application configuration.
//!
//! Loaded from a TOML file through the `config` crate, with `VQ__`-prefixed
//! environment overrides (`VQ__GLOBAL__EXECUTION__MAKER_TTL_MS=900`).
//!
//! ```toml
//! [global.execution]
//! maker_ttl_ms = 800
//!
//! [symbols."BTC/USDT:USDT".execution]
//! max_mult = 20
//! ```
//!
//! A `[symbols."<SYMBOL>"]` table only names the fields it changes; the rest
//! comes from `[global]`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use vq_core::{InstrumentLimits, Symbol};
use vq_executor::{SupervisorConfig, SymbolSettings};
use vq_risk::RateLimitConfig;

/// Environment override prefix.
pub const ENV_PREFIX: &str = "VQ";

/// Paper exchange setup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Lot/tick constraints per instrument.
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentLimits>,
}

impl PaperConfig {
    pub fn limits(&self) -> impl Iterator<Item = (Symbol, InstrumentLimits)> + '_ {
        self.instruments
            .iter()
            .map(|(sym, limits)| (normalize_symbol(sym), *limits))
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Settings applied to every instrument.
    #[serde(default)]
    pub global: SymbolSettings,
    /// Partial per-instrument overrides of `global`.
    #[serde(default)]
    pub symbols: BTreeMap<String, serde_json::Value>,
    /// Shared budget of the single trading credential.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    /// Timer pass interval for every controller.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Position poll interval.
    #[serde(default = "default_position_refresh_ms")]
    pub position_refresh_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_position_refresh_ms() -> u64 {
    1_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            global: SymbolSettings::default(),
            symbols: BTreeMap::new(),
            rate_limit: RateLimitConfig::default(),
            supervisor: SupervisorConfig::default(),
            paper: PaperConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
            position_refresh_ms: default_position_refresh_ms(),
        }
    }
}

impl AppConfig {
    /// Load from a file plus environment overrides, then validate.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let loaded: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Load from TOML text (no environment overrides).
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let loaded: Self = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Instruments with an override table.
    pub fn configured_symbols(&self) -> Vec<Symbol> {
        self.symbols.keys().map(|s| normalize_symbol(s)).collect()
    }

    fn override_for(&self, symbol: &Symbol) -> Option<&serde_json::Value> {
        self.symbols
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(symbol.as_str()))
            .map(|(_, v)| v)
    }

    /// Fully merged settings for `symbol`: `global` with the instrument's
    /// override table laid over it.
    pub fn merged(&self, symbol: &Symbol) -> AppResult<SymbolSettings> {
        let Some(overrides) = self.override_for(symbol) else {
            return Ok(self.global.clone());
        };
        let mut base = serde_json::to_value(&self.global)
            .map_err(|e| AppError::Config(format!("{symbol}: {e}")))?;
        merge_value(&mut base, overrides);
        serde_json::from_value(base).map_err(|e| AppError::Config(format!("{symbol}: {e}")))
    }

    /// Merged settings for every configured instrument.
    pub fn merged_all(&self) -> AppResult<Vec<(Symbol, Arc<SymbolSettings>)>> {
        self.configured_symbols()
            .into_iter()
            .map(|sym| {
                let merged = self.merged(&sym)?;
                Ok((sym, Arc::new(merged)))
            })
            .collect()
    }

    pub fn validate(&self) -> AppResult<()> {
        self.global
            .validate()
            .map_err(|e| AppError::Config(format!("global: {e}")))?;
        for symbol in self.configured_symbols() {
            self.merged(&symbol)?
                .validate()
                .map_err(|e| AppError::Config(format!("{symbol}: {e}")))?;
        }

        let rate = &self.rate_limit;
        if rate.max_orders_per_sec == 0 || rate.max_cancels_per_sec == 0 || rate.window_ms == 0 {
            return Err(AppError::Config(
                "rate_limit budgets and window must be positive".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(AppError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.position_refresh_ms == 0 {
            return Err(AppError::Config(
                "position_refresh_ms must be positive".to_string(),
            ));
        }
        if self.supervisor.queue_capacity == 0 {
            return Err(AppError::Config(
                "supervisor.queue_capacity must be positive".to_string(),
            ));
        }
        for (symbol, limits) in &self.paper.instruments {
            limits
                .validate()
                .map_err(|e| AppError::Config(format!("paper.instruments.{symbol}: {e}")))?;
        }
        Ok(())
    }
}

/// Instrument keys are matched case-insensitively; config sources may fold
/// key case, so table keys are normalized to upper case.
fn normalize_symbol(key: &str) -> Symbol {
    Symbol::new(key.to_ascii_uppercase())
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Recursive table merge; scalars and arrays in `overlay` replace `base`.
fn merge_value(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
