//! Contains configuration options for connecting a client to Elasticsearch

use anyhow::{Context, Result};
use backoff::backoff::Backoff as _;
use backoff::ExponentialBackoff;
use serde::Deserialize;
use sloggers::terminal::TerminalLoggerConfig;
use std::time::Duration;

/// Configuration object, usually loaded once when the embedding application starts
#[derive(Debug, Deserialize, Clone)]
pub struct Configuration {
    /// Connection parameters of the Elasticsearch cluster
    pub elasticsearch: Elasticsearch,
    /// Timeout applied to requests that don't set their own
    #[serde(default, with = "humantime_serde")]
    pub default_request_timeout: Option<Duration>,
    /// Parameters for the backoff used while waiting for Elasticsearch to come up
    pub initialization_backoff: Backoff,
    /// Logging configuration for the client's diagnostic logs
    pub logging: TerminalLoggerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Elasticsearch {
    /// Base URL of the cluster, such as `http://localhost:9200`
    pub url: String,
    #[serde(default)]
    pub auth_username: Option<String>,
    #[serde(default)]
    pub auth_password: Option<String>,
}

impl Configuration {
    /// Attempts to load the config from the file
    pub fn try_load(path: impl AsRef<str>) -> Result<Self> {
        let path = path.as_ref();
        let mut settings = config::Config::default();
        settings
            .merge(config::File::with_name(path))
            .context(format!("Could not read in config file from {}", path))?
            // Eg.. `SEARCH_CLIENT__ELASTICSEARCH__URL=http://es:9200`
            // would set the `elasticsearch.url` key
            .merge(config::Environment::with_prefix("SEARCH_CLIENT").separator("__"))
            .context("could not merge in values from the environment")?;
        let config = settings
            .try_into()
            .context("loading the Configuration struct from the merged config failed")?;
        Ok(config)
    }
}

/// Controls an exponential backoff that can be loaded from a config file
#[derive(Default, Debug, Deserialize, Clone)]
pub struct Backoff {
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub multiplier: f64,
}

impl Backoff {
    pub fn build(&self) -> ExponentialBackoff {
        self.into()
    }
}

impl From<&Backoff> for ExponentialBackoff {
    fn from(backoff: &Backoff) -> Self {
        let mut eb = Self {
            current_interval: backoff.initial_interval,
            initial_interval: backoff.initial_interval,
            multiplier: backoff.multiplier,
            max_interval: backoff.max_interval,
            max_elapsed_time: Some(backoff.duration),
            ..Self::default()
        };
        eb.reset();
        eb
    }
}

#[cfg(test)]
mod tests {
    use super::{Backoff, Configuration};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_backoff_conversion() {
        let backoff = serde_json::from_value::<Backoff>(json!({
            "initial_interval": "500ms",
            "max_interval": "10s",
            "duration": "2m",
            "multiplier": 2.0,
        }))
        .unwrap();

        let eb = backoff.build();
        assert_eq!(eb.initial_interval, Duration::from_millis(500));
        assert_eq!(eb.current_interval, Duration::from_millis(500));
        assert_eq!(eb.max_interval, Duration::from_secs(10));
        assert_eq!(eb.max_elapsed_time, Some(Duration::from_secs(120)));
        assert!((eb.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_configuration_optional_fields() {
        let config = serde_json::from_value::<Configuration>(json!({
            "elasticsearch": {"url": "http://localhost:9200"},
            "initialization_backoff": {
                "initial_interval": "1s",
                "max_interval": "5s",
                "duration": "30s",
                "multiplier": 1.5,
            },
            "logging": {},
        }))
        .unwrap();

        assert_eq!(config.elasticsearch.url, "http://localhost:9200");
        assert!(config.elasticsearch.auth_username.is_none());
        assert!(config.default_request_timeout.is_none());

        let with_timeout = serde_json::from_value::<Configuration>(json!({
            "elasticsearch": {
                "url": "http://localhost:9200",
                "auth_username": "elastic",
                "auth_password": "changeme",
            },
            "default_request_timeout": "15s",
            "initialization_backoff": {
                "initial_interval": "1s",
                "max_interval": "5s",
                "duration": "30s",
                "multiplier": 1.5,
            },
            "logging": {},
        }))
        .unwrap();
        assert_eq!(with_timeout.default_request_timeout, Some(Duration::from_secs(15)));
        assert_eq!(with_timeout.elasticsearch.auth_username.as_deref(), Some("elastic"));
    }
}
