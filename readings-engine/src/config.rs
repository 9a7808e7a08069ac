use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
}

/// Tunables for the aggregation engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Relative tolerance when checking that two conversion paths agree.
    pub consistency_tolerance: f64,
    /// Line requests covering at most this many readings return raw points.
    pub max_raw_points: usize,
    /// Otherwise hourly points are used while the span is at most this many hours.
    pub max_hour_points: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            consistency_tolerance: 1e-9,
            max_raw_points: 1440,
            max_hour_points: 1440,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("READINGS_ENGINE_CONFIG")
            .unwrap_or_else(|_| "readings-engine.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        let tolerance = cfg.engine.consistency_tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            anyhow::bail!("engine.consistency_tolerance must be non-negative");
        }
        Ok(cfg)
    }
}
