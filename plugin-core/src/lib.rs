#![allow(unused_variables)]
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub mod utils;

#[derive(Debug, thiserror::Error)]
#[allow(dead_code)]
pub enum Error {
    /// useful when constructing an error from scratch
    #[error("Generic plugin error {0}")]
    Synthetic(String),

    #[error("Plugin error ({ctx}) from {source}")]
    Wrapped {
        source: Box<dyn std::error::Error + Send + Sync>,
        ctx: String,
    },

    #[error("Generic error")]
    Generic(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies a community (a discord guild) the bot is part of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(pub u64);

/// Identifies a chat channel inside a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for CommunityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat message received by the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    /// None for direct messages
    pub community: Option<CommunityId>,
    pub channel: ChannelId,
    pub author: String,
    /// Set by the host when the author is allowed to run admin commands
    pub is_admin: bool,
    pub content: String,
}

/// A chat message the bot should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub channel: ChannelId,
    pub content: String,
}

impl Outgoing {
    pub fn new<S: Into<String>>(channel: ChannelId, content: S) -> Self {
        Outgoing {
            channel,
            content: content.into(),
        }
    }
}

/// Secret string which never shows up in logs.
#[derive(Deserialize)]
#[serde(transparent)]
pub struct Obfuscated(pub String);

impl std::fmt::Debug for Obfuscated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<Obfuscated string>")?;
        Ok(())
    }
}

impl std::clone::Clone for Obfuscated {
    fn clone(&self) -> Self {
        Obfuscated(self.0.clone())
    }
}

#[async_trait]
pub trait Plugin: Sync + Send {
    async fn init(config_path: &str) -> Result<Self>
    where
        Self: Sized;

    /// This method is polled (through .await) after initialisation once the bot is running.
    /// The given bot_chan can be used to send message to the chat out of band,
    /// that is, not as a response to an incoming event.
    /// This method can also be used to start an async process.
    async fn run(&self, bot_chan: mpsc::Sender<Outgoing>) -> Result<()> {
        Ok(())
    }

    /// The unique identifier of the plugin
    fn get_name(&self) -> &'static str;

    /// Method invoked whenever a message is received from the chat
    /// Returns Some(Outgoing) if a response message should be sent, None otherwise
    async fn in_message(&self, msg: &Incoming) -> Result<Option<Outgoing>> {
        Ok(None)
    }

    /// Method invoked whenever the bot sends a message.
    async fn out_message(&self, msg: &Outgoing) -> Result<()> {
        Ok(())
    }

    /// Called once when the bot stops. Background jobs started in `run`
    /// must be stopped before this returns.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub async fn new_boxed<T>(config_path: &str) -> Result<Box<dyn Plugin>>
where
    T: Plugin + 'static,
{
    Ok(Box::new(T::init(config_path).await?))
}
