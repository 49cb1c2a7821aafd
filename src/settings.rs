use crate::model::Credentials;
use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const API_URL: &str = "https://eu1-developer.deyecloud.com/v1.0";
const ENV_PREFIX: &str = "DEYE";

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub email: String,
    pub password: String,
    pub device_sn: Option<String>,
    /// Seconds between realtime telemetry polls.
    pub realtime_interval: u64,
    /// Seconds between TOU schedule polls.
    pub tou_interval: u64,
    /// Seconds a token is trusted when the server gives no shorter lease.
    pub token_lease: u64,
}

impl Settings {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            base_url: self.base_url.clone(),
            app_id: self.app_id.clone(),
            app_secret: self.app_secret.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }

    /// Configured serial number, ignoring a blank value.
    pub fn device_sn(&self) -> Option<&str> {
        self.device_sn
            .as_deref()
            .map(str::trim)
            .filter(|sn| !sn.is_empty())
    }

    pub fn realtime_interval(&self) -> Duration {
        Duration::from_secs(self.realtime_interval)
    }

    pub fn tou_interval(&self) -> Duration {
        Duration::from_secs(self.tou_interval)
    }

    pub fn token_lease(&self) -> Duration {
        Duration::from_secs(self.token_lease)
    }
}

fn load(environment: Environment) -> Result<Settings, ConfigError> {
    Config::builder()
        .set_default("base_url", API_URL)?
        .set_default("realtime_interval", 60)?
        .set_default("tou_interval", 60)?
        .set_default("token_lease", 3600)?
        .add_source(environment)
        .build()?
        .try_deserialize()
}

/// Read settings from `DEYE_*` environment variables.
pub fn read_settings() -> Result<Settings, ConfigError> {
    load(Environment::with_prefix(ENV_PREFIX))
}

/// Read settings from an explicit variable map instead of the process environment.
pub fn read_settings_from(vars: HashMap<String, String>) -> Result<Settings, ConfigError> {
    load(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DEYE_APP_ID", "app-1"),
        ("DEYE_APP_SECRET", "secret"),
        ("DEYE_EMAIL", "me@example.test"),
        ("DEYE_PASSWORD", "hunter2"),
    ];

    #[test]
    fn defaults() {
        let settings = read_settings_from(vars(&REQUIRED)).unwrap();

        assert_eq!(API_URL, settings.base_url);
        assert_eq!(None, settings.device_sn());
        assert_eq!(Duration::from_secs(60), settings.realtime_interval());
        assert_eq!(Duration::from_secs(60), settings.tou_interval());
        assert_eq!(Duration::from_secs(3600), settings.token_lease());
        assert_eq!("hunter2", settings.credentials().password);
    }

    #[test]
    fn overrides() {
        let mut all = REQUIRED.to_vec();
        all.extend([
            ("DEYE_BASE_URL", "https://us1-developer.deyecloud.com/v1.0"),
            ("DEYE_DEVICE_SN", "2306198765"),
            ("DEYE_TOU_INTERVAL", "300"),
        ]);
        let settings = read_settings_from(vars(&all)).unwrap();

        assert_eq!("https://us1-developer.deyecloud.com/v1.0", settings.base_url);
        assert_eq!(Some("2306198765"), settings.device_sn());
        assert_eq!(Duration::from_secs(300), settings.tou_interval());
    }

    #[test]
    fn blank_device_sn_is_unset() {
        let mut all = REQUIRED.to_vec();
        all.push(("DEYE_DEVICE_SN", "  "));
        let settings = read_settings_from(vars(&all)).unwrap();
        assert_eq!(None, settings.device_sn());
    }

    #[test]
    fn missing_credentials() {
        assert!(read_settings_from(vars(&REQUIRED[..3])).is_err());
    }
}
