use std::{path::Path, time::Duration};

use serde::Deserialize;
use twitch_api::twitch_oauth2::{ClientId, ClientSecret};

pub const DEFAULT_PROFILE_URL_BASE: &str = "https://twitch.tv/";

fn default_profile_url_base() -> String {
    DEFAULT_PROFILE_URL_BASE.to_string()
}

fn default_poll_interval_secs() -> u64 {
    5 * 60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_shutdown_grace_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    /// Where to persist rosters. Without it, everything is lost on restart.
    #[serde(default)]
    pub state_path: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_profile_url_base")]
    pub profile_url_base: String,
}

// tmp struct to parse the config from a file with other stuff in it
#[derive(Deserialize)]
struct TC {
    twitch: Config,
}

impl Config {
    pub fn new(client_id: ClientId, client_secret: ClientSecret) -> Self {
        Config {
            client_id,
            client_secret,
            state_path: None,
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            profile_url_base: default_profile_url_base(),
        }
    }

    /// read config from a file where it's under a key
    /// named "twitch"
    pub fn from_file_keyed<P>(p: P) -> Result<Self, serde_dhall::Error>
    where
        P: AsRef<Path>,
    {
        let tmp: TC = serde_dhall::from_file(p).parse()?;
        Ok(tmp.twitch)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
