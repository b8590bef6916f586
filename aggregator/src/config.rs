use crate::fetcher::FetchOptions;
use crate::refresh::RefreshOptions;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::time::Duration;

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Filesystem { path: String },
    Memory,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: 10,
            retry_backoff_ms: 300,
            concurrency: 5,
        }
    }
}

impl FetchConfig {
    pub fn options(&self) -> Result<FetchOptions, InvalidConfig> {
        if self.timeout_secs == 0 {
            return Err(InvalidConfig::ZeroTimeout);
        }

        Ok(FetchOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            concurrency: NonZeroUsize::new(self.concurrency).ok_or(InvalidConfig::ZeroConcurrency)?,
        })
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    pub on_startup: bool,
    pub interval_secs: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            on_startup: true,
            interval_secs: None,
        }
    }
}

impl RefreshConfig {
    pub fn options(&self) -> Result<RefreshOptions, InvalidConfig> {
        let interval = match self.interval_secs {
            Some(0) => return Err(InvalidConfig::ZeroRefreshInterval),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(RefreshOptions {
            on_startup: self.on_startup,
            interval,
        })
    }
}

/// Without an `admin_token` every admin endpoint answers 401.
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_token: Option<String>,
    pub subscription_token: Option<String>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub refresh_max: u32,
    pub refresh_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            refresh_max: 10,
            refresh_window_secs: 600,
        }
    }
}

fn default_cache_max_age_secs() -> u64 {
    300
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    pub store: StoreConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum InvalidConfig {
    #[error("{0} port must not be 0")]
    ZeroPort(&'static str),

    #[error("fetch.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("fetch.timeout_secs must be at least 1")]
    ZeroTimeout,

    #[error("refresh.interval_secs must be at least 1")]
    ZeroRefreshInterval,

    #[error("rate_limit.refresh_window_secs must be at least 1")]
    ZeroRateLimitWindow,

    #[error("cache_max_age_secs must be at least 1")]
    ZeroCacheMaxAge,
}

impl Config {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.listener.port == 0 {
            return Err(InvalidConfig::ZeroPort("listener"));
        }
        if self.admin_listener.port == 0 {
            return Err(InvalidConfig::ZeroPort("admin_listener"));
        }
        if self.rate_limit.refresh_window_secs == 0 {
            return Err(InvalidConfig::ZeroRateLimitWindow);
        }
        if self.cache_max_age_secs == 0 {
            return Err(InvalidConfig::ZeroCacheMaxAge);
        }
        self.fetch.options()?;
        self.refresh.options()?;
        Ok(())
    }
}
