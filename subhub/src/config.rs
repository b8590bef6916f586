use aggregator::config::{Config as AggregatorConfig, InvalidConfig};
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub aggregator: Option<AggregatorConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data: Config = serde_yaml::from_reader(file)?;

        if let Some(aggregator) = &data.aggregator {
            aggregator.validate()?;
        }

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] InvalidConfig),
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggregator::config::StoreConfig;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn aggregator_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            aggregator:
                listener:
                    host: 0.0.0.0
                    port: 8080
                store:
                    type: filesystem
                    path: /var/lib/subhub/
                fetch:
                    concurrency: 8
                refresh:
                    interval_secs: 3600
                auth:
                    admin_token: secret
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(
            config.common.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125,
            })
        );
        assert_eq!(config.common.logging, None);

        let aggregator = config.aggregator.expect("aggregator config");
        assert_eq!(aggregator.listener.port, 8080);
        assert_eq!(aggregator.admin_listener.port, 3001);
        assert_eq!(
            aggregator.store,
            StoreConfig::Filesystem {
                path: "/var/lib/subhub/".into()
            }
        );
        assert_eq!(aggregator.fetch.concurrency, 8);
        assert_eq!(aggregator.fetch.timeout_secs, 10);
        assert_eq!(aggregator.refresh.interval_secs, Some(3600));
        assert!(aggregator.refresh.on_startup);
        assert_eq!(aggregator.auth.admin_token.as_deref(), Some("secret"));
        assert_eq!(aggregator.cache_max_age_secs, 300);
    }

    #[test]
    fn invalid_aggregator_config() {
        let yaml = r#"
            aggregator:
                store:
                    type: memory
                fetch:
                    timeout_secs: 0
            "#;
        let tmp = write_tmp_file(yaml);
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(InvalidConfig::ZeroTimeout))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/subhub.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
