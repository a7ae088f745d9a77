// src/state.rs
use std::time::Duration;

use reqwest::Url;

use crate::errors::{InboxError, InboxResult};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct InboxConfig {
    pub api_base_url: String,
    pub push_url: Option<String>,
    pub auth_token: Option<String>,
    pub page_size: u32,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub admin_path: String, // Route where support clicks are handled in place
    pub namespace: String,  // Socket.IO namespace carrying admin notifications
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            api_base_url: std::env::var("NOTIFICATIONS_API_URL")
                .unwrap_or_else(|_| "http://localhost:5000/api/notifications".to_string()),
            push_url: std::env::var("NOTIFICATIONS_PUSH_URL").ok(),
            auth_token: std::env::var("NOTIFICATIONS_TOKEN").ok().filter(|t| !t.is_empty()),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(10),
            admin_path: "/admin".to_string(),
            namespace: "/admin".to_string(),
        }
    }
}

impl InboxConfig {
    /// Defaults plus the numeric overrides, validated.
    pub fn from_env() -> InboxResult<Self> {
        let mut config = Self::default();

        if let Some(size) = env_number("NOTIFICATIONS_PAGE_SIZE")? {
            config.page_size = page_size_from(size)?;
        }
        if let Some(secs) = env_number("NOTIFICATIONS_POLL_SECS")? {
            config.poll_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> InboxResult<()> {
        if self.page_size == 0 {
            return Err(InboxError::invalid_config("page_size must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(InboxError::invalid_config("poll_interval must be greater than zero"));
        }
        self.api_url()?;
        if let Some(push) = &self.push_url {
            let url = Url::parse(push).map_err(|e| InboxError::InvalidUrl(format!("{}: {}", push, e)))?;
            if url.scheme() != "ws" && url.scheme() != "wss" {
                return Err(InboxError::invalid_config(format!(
                    "push_url must use ws:// or wss://, got {}",
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    pub fn api_url(&self) -> InboxResult<Url> {
        Url::parse(&self.api_base_url)
            .map_err(|e| InboxError::InvalidUrl(format!("{}: {}", self.api_base_url, e)))
    }
}

fn page_size_from(size: u64) -> InboxResult<u32> {
    u32::try_from(size)
        .map_err(|_| InboxError::invalid_config(format!("NOTIFICATIONS_PAGE_SIZE out of range: {}", size)))
}

fn env_number(var: &str) -> InboxResult<Option<u64>> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
            InboxError::invalid_config(format!("{} must be a positive integer, got '{}'", var, raw))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> InboxConfig {
        InboxConfig {
            api_base_url: "http://localhost:5000/api/notifications".to_string(),
            push_url: None,
            auth_token: None,
            ..InboxConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = base();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.admin_path, "/admin");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let config = InboxConfig { page_size: 0, ..base() };
        assert!(matches!(config.validate(), Err(InboxError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_page_size_out_of_range() {
        assert!(matches!(page_size_from(25), Ok(25)));
        assert!(matches!(
            page_size_from(u64::from(u32::MAX) + 2),
            Err(InboxError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_urls() {
        let config = InboxConfig {
            api_base_url: "not a url".to_string(),
            ..base()
        };
        assert!(matches!(config.validate(), Err(InboxError::InvalidUrl(_))));

        let config = InboxConfig {
            push_url: Some("http://localhost:5000/socket.io/".to_string()),
            ..base()
        };
        assert!(matches!(config.validate(), Err(InboxError::InvalidConfiguration(_))));

        let config = InboxConfig {
            push_url: Some("ws://localhost:5000/socket.io/?EIO=4&transport=websocket".to_string()),
            ..base()
        };
        assert!(config.validate().is_ok());
    }
}
