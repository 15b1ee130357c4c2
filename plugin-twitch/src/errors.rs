use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot read or write the notification state: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid notification state: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TwitchError {
    /// The client credentials exchange failed
    #[error("Cannot get a twitch app access token: {0}")]
    Auth(String),

    /// Malformed response, or transport failure, when querying streams
    #[error("Unexpected response from twitch: {0}")]
    Upstream(String),

    #[error("Twitch answered get streams with status {0}")]
    UpstreamStatus(u16),

    #[error("Http error {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("The bot channel is closed")]
    BotChannelClosed,
}

impl std::convert::From<TwitchError> for plugin_core::Error {
    fn from(value: TwitchError) -> Self {
        plugin_core::Error::Wrapped {
            source: Box::new(value),
            ctx: "twitch".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TwitchError>;
