use std::env;

/// Last.fm API configuration, read from `LASTFM_API_KEY`
#[derive(Debug, Clone, Default)]
pub struct ApiKeyConfig {
    pub api_key: Option<String>,
}

impl ApiKeyConfig {
    /// Load API configuration from the environment
    pub fn load() -> Self {
        Self {
            api_key: env::var("LASTFM_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        }
    }

    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    /// Check if API is properly configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_configured() {
        let config_none = ApiKeyConfig::default();
        assert!(!config_none.is_configured());
        assert_eq!(config_none.api_key(), None);

        let config_full = ApiKeyConfig::with_key("key");
        assert!(config_full.is_configured());
        assert_eq!(config_full.api_key(), Some("key"));
    }
}
