use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: String,
    /// Delay applied before each response is written, to mimic a remote
    /// backend for UI development. Responses keep their request order.
    pub latency_ms: u64,
    pub default_max_score: f64,
    pub seed_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            latency_ms: 0,
            default_max_score: 10.0,
            seed_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("GRADEBOOKD_LOG") {
            if !v.trim().is_empty() {
                cfg.log_level = v;
            }
        }
        if let Some(v) = lookup("GRADEBOOKD_LATENCY_MS") {
            if let Ok(n) = v.trim().parse() {
                cfg.latency_ms = n;
            }
        }
        if let Some(v) = lookup("GRADEBOOKD_DEFAULT_MAX_SCORE") {
            if let Ok(n) = v.trim().parse::<f64>() {
                if n.is_finite() && n > 0.0 {
                    cfg.default_max_score = n;
                }
            }
        }
        if let Some(v) = lookup("GRADEBOOKD_SEED") {
            if !v.trim().is_empty() {
                cfg.seed_path = Some(PathBuf::from(v.trim()));
            }
        }
        cfg
    }

    pub fn latency(&self) -> Option<Duration> {
        (self.latency_ms > 0).then(|| Duration::from_millis(self.latency_ms))
    }
}
