use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the label applied to answered messages.
    pub label_name: String,
    /// Body text of every auto-reply.
    pub reply_body: String,
    /// Lower bound of the random inter-tick delay, in whole seconds.
    pub poll_min_secs: u64,
    /// Upper bound of the random inter-tick delay, inclusive.
    pub poll_max_secs: u64,
    /// Path to the OAuth application secret.
    pub credentials_path: String,
    /// Port for the health listener.
    pub listen_port: u16,
    /// Requests allowed per rate-limit window on the health listener.
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label_name: "Vacation Responder".to_string(),
            reply_body: "Thank you for your message. I'm currently out of the office and will get back to you when I return.".to_string(),
            poll_min_secs: 45,
            poll_max_secs: 120,
            credentials_path: "credentials.json".to_string(),
            listen_port: 5000,
            rate_limit_max_requests: 10,
            rate_limit_window_secs: 60,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        use std::fs;
        if let Ok(content) = fs::read_to_string("responder.toml") {
            if let Ok(config) = toml::from_str(&content) {
                return config;
            }
        }
        Self::default()
    }
}
