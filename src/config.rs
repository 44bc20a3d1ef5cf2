//! Agent configuration loaded from the environment.
//!
//! A `.env` file in the working directory is honored. Every setting has a
//! default, so an empty environment yields a working agent that talks to a
//! local intake service and has no geolocation capability.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dotenvy::dotenv;

use crate::capture::{CapturePolicy, DeliveryFailurePolicy, LocationPolicy};
use crate::geolocation::PositionOptions;
use crate::intake::DEFAULT_INTAKE_URL;
use crate::model::Location;
use crate::notify::DEFAULT_FEED_CAPACITY;
use crate::service::ServiceConfig;
use crate::sync::SyncConfig;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_PATH: &str = "sqlite:reliefline.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub intake_url: String,
    pub geolocation_timeout: Duration,
    pub poll_interval: Duration,
    pub probe_interval: Duration,
    pub auto_sync_on_poll: bool,
    pub sync_max_attempts: u32,
    pub sync_backoff: Duration,
    pub location_policy: LocationPolicy,
    pub delivery_failure_policy: DeliveryFailurePolicy,
    /// Installed position of the device; `None` means no geolocation.
    pub fixed_position: Option<Location>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "RELIEFLINE_PORT", DEFAULT_PORT)?;
        let database_url =
            lookup("RELIEFLINE_DATABASE_URL").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let intake_url =
            lookup("RELIEFLINE_INTAKE_URL").unwrap_or_else(|| DEFAULT_INTAKE_URL.to_string());

        let geolocation_timeout =
            Duration::from_secs(parse_or(&lookup, "RELIEFLINE_GEOLOCATION_TIMEOUT_SECS", 10)?);
        let poll_interval =
            Duration::from_secs(parse_or(&lookup, "RELIEFLINE_POLL_INTERVAL_SECS", 30)?);
        let probe_interval =
            Duration::from_secs(parse_or(&lookup, "RELIEFLINE_PROBE_INTERVAL_SECS", 15)?);
        let auto_sync_on_poll = parse_or(&lookup, "RELIEFLINE_AUTO_SYNC_ON_POLL", false)?;
        let sync_max_attempts = parse_or(&lookup, "RELIEFLINE_SYNC_MAX_ATTEMPTS", 1u32)?;
        let sync_backoff =
            Duration::from_secs(parse_or(&lookup, "RELIEFLINE_SYNC_BACKOFF_SECS", 2)?);

        if poll_interval.is_zero() || probe_interval.is_zero() {
            bail!("poll and probe intervals must be greater than zero");
        }
        if sync_max_attempts == 0 {
            bail!("RELIEFLINE_SYNC_MAX_ATTEMPTS must be at least 1");
        }

        let location_policy = match lookup("RELIEFLINE_LOCATION_POLICY").as_deref() {
            None | Some("require") => LocationPolicy::Require,
            Some("best_effort") => LocationPolicy::BestEffort,
            Some(other) => bail!("unknown RELIEFLINE_LOCATION_POLICY: {other}"),
        };

        let delivery_failure_policy =
            match lookup("RELIEFLINE_DELIVERY_FAILURE_POLICY").as_deref() {
                None | Some("enqueue") => DeliveryFailurePolicy::Enqueue,
                Some("drop") => DeliveryFailurePolicy::Drop,
                Some(other) => bail!("unknown RELIEFLINE_DELIVERY_FAILURE_POLICY: {other}"),
            };

        let fixed_position = match (
            lookup("RELIEFLINE_LATITUDE"),
            lookup("RELIEFLINE_LONGITUDE"),
        ) {
            (Some(lat), Some(lon)) => {
                let latitude: f64 = lat.parse().context("invalid RELIEFLINE_LATITUDE")?;
                let longitude: f64 = lon.parse().context("invalid RELIEFLINE_LONGITUDE")?;
                let accuracy = parse_or(&lookup, "RELIEFLINE_ACCURACY", 50.0)?;
                let location = Location::new(latitude, longitude, accuracy);
                if !location.is_valid() {
                    bail!("fixed position {latitude},{longitude} is out of range");
                }
                Some(location)
            }
            (None, None) => None,
            _ => bail!("RELIEFLINE_LATITUDE and RELIEFLINE_LONGITUDE must be set together"),
        };

        Ok(Self {
            port,
            database_url,
            intake_url,
            geolocation_timeout,
            poll_interval,
            probe_interval,
            auto_sync_on_poll,
            sync_max_attempts,
            sync_backoff,
            location_policy,
            delivery_failure_policy,
            fixed_position,
        })
    }

    /// Settings for the offline sync service.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            capture: CapturePolicy {
                location: self.location_policy,
                delivery_failure: self.delivery_failure_policy,
                position: PositionOptions {
                    timeout: self.geolocation_timeout,
                    ..PositionOptions::default()
                },
            },
            sync: SyncConfig {
                poll_interval: self.poll_interval,
                auto_sync_on_poll: self.auto_sync_on_poll,
                max_attempts: self.sync_max_attempts,
                retry_backoff: self.sync_backoff,
            },
            notification_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.database_url, DEFAULT_DB_PATH);
        assert_eq!(config.intake_url, DEFAULT_INTAKE_URL);
        assert_eq!(config.geolocation_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert!(!config.auto_sync_on_poll);
        assert_eq!(config.sync_max_attempts, 1);
        assert_eq!(config.location_policy, LocationPolicy::Require);
        assert_eq!(config.delivery_failure_policy, DeliveryFailurePolicy::Enqueue);
        assert!(config.fixed_position.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("RELIEFLINE_PORT", "8088"),
            ("RELIEFLINE_AUTO_SYNC_ON_POLL", "true"),
            ("RELIEFLINE_SYNC_MAX_ATTEMPTS", "4"),
            ("RELIEFLINE_LOCATION_POLICY", "best_effort"),
            ("RELIEFLINE_DELIVERY_FAILURE_POLICY", "drop"),
            ("RELIEFLINE_LATITUDE", "14.5995"),
            ("RELIEFLINE_LONGITUDE", "120.9842"),
        ])
        .unwrap();

        assert_eq!(config.port, 8088);
        assert!(config.auto_sync_on_poll);
        assert_eq!(config.sync_max_attempts, 4);
        assert_eq!(config.location_policy, LocationPolicy::BestEffort);
        assert_eq!(config.delivery_failure_policy, DeliveryFailurePolicy::Drop);

        let position = config.fixed_position.unwrap();
        assert_eq!(position.latitude, 14.5995);
        assert_eq!(position.accuracy, 50.0);

        let service = config.service_config();
        assert_eq!(service.sync.max_attempts, 4);
        assert_eq!(service.capture.position.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("RELIEFLINE_PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("RELIEFLINE_LOCATION_POLICY", "sometimes")]).is_err());
        assert!(config_from(&[("RELIEFLINE_SYNC_MAX_ATTEMPTS", "0")]).is_err());
        assert!(config_from(&[("RELIEFLINE_LATITUDE", "10.0")]).is_err());
        assert!(
            config_from(&[
                ("RELIEFLINE_LATITUDE", "95.0"),
                ("RELIEFLINE_LONGITUDE", "10.0")
            ])
            .is_err()
        );
    }
}
