use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,
}

/// Process-wide client defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Comma/semicolon separated labels used to pick among competing
    /// handler implementations (e.g. "reqwest")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priorities: Option<String>,
    /// Default per-call transport timeout
    #[serde(default = "default_timeout")]
    pub timeout: HumanDuration,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Character set for text request bodies and text responses without one
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            priorities: None,
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            charset: default_charset(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_charset() -> String {
    "utf-8".to_string()
}

fn default_user_agent() -> String {
    format!("callbox/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    10
}

/// Named remote endpoint, referenced by `Endpoint::named`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub base_url: String,
    /// Headers sent with every call to this endpoint
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Overrides `client.timeout` for this endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<HumanDuration>,
}
