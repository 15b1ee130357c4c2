use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use plugin_core::Outgoing;
use tokio::sync::mpsc;
use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_model::id::{marker::ChannelMarker, Id};

/// A chat message as seen on the gateway, before the golem
/// decides whether plugins should see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// None for direct messages
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
}

/// Where the golem delivers outgoing messages.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, msg: &Outgoing) -> Result<()>;
}

pub struct Discord {
    http: HttpClient,
}

impl Discord {
    pub fn new(token: String) -> Self {
        Discord {
            http: HttpClient::new(token),
        }
    }
}

#[async_trait]
impl ChatSink for Discord {
    async fn send(&self, msg: &Outgoing) -> Result<()> {
        let channel_id = Id::<ChannelMarker>::new_checked(msg.channel.0)
            .ok_or_else(|| anyhow!("Invalid channel id: {}", msg.channel))?;
        self.http
            .create_message(channel_id)
            .content(&msg.content)
            .await
            .with_context(|| format!("Cannot send message to channel {}", msg.channel))?;
        Ok(())
    }
}

/// A single shard is plenty for the number of guilds the bot is in.
pub fn connect(token: String) -> Shard {
    Shard::new(
        ShardId::ONE,
        token,
        Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT,
    )
}

/// Forward chat messages from the gateway until it closes.
pub async fn recv_messages(mut shard: Shard, tx: mpsc::Sender<ChatMessage>) -> Result<()> {
    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                log::warn!("Error receiving discord event: {err}");
                continue;
            }
        };

        match event {
            Event::Ready(ready) => {
                log::info!("Connected to discord as {}", ready.user.name);
            }
            Event::MessageCreate(msg) => {
                let msg = ChatMessage {
                    guild_id: msg.guild_id.map(|g| g.get()),
                    channel_id: msg.channel_id.get(),
                    author_id: msg.author.id.get(),
                    author_name: msg.author.name.clone(),
                    author_is_bot: msg.author.bot,
                    content: msg.content.clone(),
                };
                tx.send(msg)
                    .await
                    .context("Cannot forward discord message")?;
            }
            _ => (),
        }
    }

    Err(anyhow!("Discord gateway stream exited"))
}
