use std::{env, time::Duration};

use map_session::stream::{StreamConfig, DEFAULT_RECONNECT_DELAY, DEFAULT_TOPIC};
use reqwest::Url;

use crate::ApiError;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_STREAM_URL: &str = "http://localhost:8080/stream";

/// Where and how to reach the tracking server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiConfig {
    pub api_url: Url,
    pub stream_url: Url,
    pub stream_topic: String,
    pub auth_token: Option<String>,
    pub reconnect_delay: Duration,
    pub proxy: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("valid default url"),
            stream_url: Url::parse(DEFAULT_STREAM_URL).expect("valid default url"),
            stream_topic: DEFAULT_TOPIC.to_owned(),
            auth_token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            proxy: None,
        }
    }
}

impl ApiConfig {
    /// Reads the `TRACKER_*` environment variables, falling back to the
    /// local development server.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let url = |key: &str, default: &str| {
            let value = var(key).unwrap_or_else(|| default.to_owned());
            Url::parse(&value).map_err(|e| ApiError::InvalidConfig(format!("{key}={value}: {e}")))
        };

        let reconnect_delay = match var("TRACKER_RECONNECT_DELAY_MS") {
            Some(millis) => millis
                .trim()
                .parse()
                .map(Duration::from_millis)
                .map_err(|e| {
                    ApiError::InvalidConfig(format!("TRACKER_RECONNECT_DELAY_MS={millis}: {e}"))
                })?,
            None => DEFAULT_RECONNECT_DELAY,
        };

        Ok(Self {
            api_url: url("TRACKER_API_URL", DEFAULT_API_URL)?,
            stream_url: url("TRACKER_STREAM_URL", DEFAULT_STREAM_URL)?,
            stream_topic: var("TRACKER_STREAM_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_owned()),
            auth_token: var("TRACKER_AUTH_TOKEN"),
            reconnect_delay,
            proxy: var("TRACKER_PROXY"),
        })
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            topic: self.stream_topic.clone(),
            auth_token: self.auth_token.clone(),
            reconnect_delay: self.reconnect_delay,
        }
    }

    /// Builds a client, routed through the configured proxy if there is one.
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ApiError> {
        let client = if let Some(proxy_url) = &self.proxy {
            log::info!("Using proxy '{proxy_url}'.");
            reqwest::Client::builder()
                .proxy(reqwest::Proxy::all(proxy_url)?)
                .build()?
        } else {
            reqwest::Client::new()
        };
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_point_to_local_server() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ApiConfig::default());
        assert_eq!(config.stream_config(), StreamConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("TRACKER_API_URL", "https://tracker.example.org/api"),
            ("TRACKER_STREAM_TOPIC", "/topic/buses"),
            ("TRACKER_AUTH_TOKEN", "secret"),
            ("TRACKER_RECONNECT_DELAY_MS", "250"),
            ("TRACKER_PROXY", " "),
        ]))
        .unwrap();
        assert_eq!(config.api_url.as_str(), "https://tracker.example.org/api");
        assert_eq!(config.proxy, None);

        let stream = config.stream_config();
        assert_eq!(stream.topic, "/topic/buses");
        assert_eq!(stream.auth_token.as_deref(), Some("secret"));
        assert_eq!(stream.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn invalid_values_are_reported() {
        let error = ApiConfig::from_lookup(lookup(&[("TRACKER_RECONNECT_DELAY_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(error, ApiError::InvalidConfig(_)));

        let error = ApiConfig::from_lookup(lookup(&[("TRACKER_API_URL", "not a url")])).unwrap_err();
        assert!(matches!(error, ApiError::InvalidConfig(_)));
    }
}
