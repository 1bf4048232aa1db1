use crate::error::ImportError;
use std::env;
use std::time::Duration;

/// The storage write API accepts at most this many puts per request.
pub const MAX_BATCH_SIZE: usize = 25;

const DEFAULT_PARALLELISM: usize = 10;
const DEFAULT_THROTTLE_STEP_MS: u64 = 100;
const DEFAULT_PROGRESS_EVERY: usize = 10;

/// Lookup over a key/value source, normally the process environment.
trait Source {
    fn get(&self, key: &str) -> Option<String>;

    fn usize_or(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(default)
    }

    fn u32_opt(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|value| value.trim().parse::<u32>().ok())
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(default)
    }

    fn duration_millis_or(&self, key: &str, default_millis: u64) -> Duration {
        self.get(key)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(default_millis))
    }
}

struct ProcessEnv;

impl Source for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl<F> Source for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Exponential backoff tuning for batch retries.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial_interval: Duration,
    pub multiplier: f64,
    /// Fraction of each interval used as random jitter, in `0.0..=1.0`.
    pub randomization_factor: f64,
    pub max_interval: Duration,
    /// Total time after which a batch stops retrying.
    pub max_elapsed_time: Duration,
    /// `None` retries until `max_elapsed_time` runs out.
    pub max_retries: Option<u32>,
}

impl BackoffConfig {
    fn from_source(source: &impl Source) -> Self {
        let defaults = Self::default();
        let multiplier = source.f64_or("IMPORT_BACKOFF_MULTIPLIER", defaults.multiplier);
        Self {
            initial_interval: source.duration_millis_or("IMPORT_BACKOFF_INITIAL_MS", 500),
            multiplier: if multiplier < 1.0 { 1.0 } else { multiplier },
            randomization_factor: source
                .f64_or(
                    "IMPORT_BACKOFF_RANDOMIZATION",
                    defaults.randomization_factor,
                )
                .clamp(0.0, 1.0),
            max_interval: source.duration_millis_or("IMPORT_BACKOFF_MAX_INTERVAL_MS", 60_000),
            max_elapsed_time: source.duration_millis_or("IMPORT_BACKOFF_MAX_ELAPSED_MS", 900_000),
            max_retries: source.u32_opt("IMPORT_BACKOFF_MAX_RETRIES"),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(15 * 60),
            max_retries: None,
        }
    }
}

/// Runtime configuration for one import run.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub table_name: String,
    /// Ceiling on in-flight batches, also the throttle period.
    pub parallelism: usize,
    /// Per-slot pacing delay; a throttled batch sleeps `parallelism * throttle_step`.
    pub throttle_step: Duration,
    /// Log a progress line every this many finished batches when no bar is drawn.
    pub progress_every: usize,
    /// Draw a progress bar on stderr when it is a terminal.
    pub show_progress: bool,
    pub backoff: BackoffConfig,
}

impl ImportConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            parallelism: DEFAULT_PARALLELISM,
            throttle_step: Duration::from_millis(DEFAULT_THROTTLE_STEP_MS),
            progress_every: DEFAULT_PROGRESS_EVERY,
            show_progress: true,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn from_env(table_name: impl Into<String>) -> Self {
        Self::from_source(table_name.into(), &ProcessEnv)
    }

    /// Build from an arbitrary lookup instead of the process environment.
    pub fn from_lookup(
        table_name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        Self::from_source(table_name.into(), &lookup)
    }

    fn from_source(table_name: String, source: &impl Source) -> Self {
        Self {
            table_name,
            parallelism: source.usize_or("IMPORT_PARALLELISM", DEFAULT_PARALLELISM),
            throttle_step: source
                .duration_millis_or("IMPORT_THROTTLE_STEP_MS", DEFAULT_THROTTLE_STEP_MS),
            progress_every: source
                .usize_or("IMPORT_PROGRESS_EVERY", DEFAULT_PROGRESS_EVERY)
                .max(1),
            show_progress: source.get("IMPORT_PROGRESS_BAR").is_none_or(|v| v.trim() != "0"),
            backoff: BackoffConfig::from_source(source),
        }
    }

    /// Delay applied before the first write of a throttled batch.
    pub fn throttle_delay(&self) -> Duration {
        self.throttle_step
            .saturating_mul(u32::try_from(self.parallelism).unwrap_or(u32::MAX))
    }

    /// Batches whose dispatch index is a multiple of `parallelism` are paced.
    pub fn is_throttled(&self, batch_index: usize) -> bool {
        self.parallelism > 0 && batch_index % self.parallelism == 0
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.table_name.trim().is_empty() {
            return Err(ImportError::invalid_config("table name must not be empty"));
        }
        if self.parallelism == 0 {
            return Err(ImportError::invalid_config("parallelism must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ImportConfig::from_lookup("records", lookup(&[]));
        assert_eq!(config.parallelism, 10);
        assert_eq!(config.throttle_step, Duration::from_millis(100));
        assert_eq!(config.throttle_delay(), Duration::from_secs(1));
        assert_eq!(config.progress_every, 10);
        assert!(config.show_progress);
        assert_eq!(config.backoff, BackoffConfig::default());
        assert_eq!(config.backoff.max_retries, None);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        let config = ImportConfig::from_lookup(
            "records",
            lookup(&[
                ("IMPORT_PARALLELISM", "4"),
                ("IMPORT_THROTTLE_STEP_MS", "20"),
                ("IMPORT_BACKOFF_INITIAL_MS", "50"),
                ("IMPORT_BACKOFF_MULTIPLIER", "2.0"),
                ("IMPORT_BACKOFF_MAX_RETRIES", "3"),
                ("IMPORT_PROGRESS_BAR", "0"),
            ]),
        );
        assert!(!config.show_progress);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.throttle_delay(), Duration::from_millis(80));
        assert_eq!(config.backoff.initial_interval, Duration::from_millis(50));
        assert_eq!(config.backoff.multiplier, 2.0);
        assert_eq!(config.backoff.max_retries, Some(3));
    }

    #[test]
    fn test_invalid_values_fall_back_or_clamp() {
        let config = ImportConfig::from_lookup(
            "records",
            lookup(&[
                ("IMPORT_PARALLELISM", "lots"),
                ("IMPORT_BACKOFF_RANDOMIZATION", "7"),
                ("IMPORT_BACKOFF_MULTIPLIER", "0.2"),
                ("IMPORT_PROGRESS_EVERY", "0"),
            ]),
        );
        assert_eq!(config.parallelism, 10);
        assert_eq!(config.backoff.randomization_factor, 1.0);
        assert_eq!(config.backoff.multiplier, 1.0);
        assert_eq!(config.progress_every, 1);
    }

    #[test]
    fn test_validate_rejects_zero_parallelism_and_blank_table() {
        let mut config = ImportConfig::new("records");
        assert!(config.validate().is_ok());

        config.parallelism = 0;
        assert!(matches!(
            config.validate(),
            Err(ImportError::InvalidConfig(_))
        ));

        let blank = ImportConfig::new("  ");
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_throttle_applies_on_multiples_of_parallelism() {
        let mut config = ImportConfig::new("records");
        config.parallelism = 3;
        let throttled: Vec<usize> = (0..10).filter(|i| config.is_throttled(*i)).collect();
        assert_eq!(throttled, vec![0, 3, 6, 9]);
    }
}
