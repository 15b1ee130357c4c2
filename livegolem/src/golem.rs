use std::path::Path;

use anyhow::{anyhow, Context, Result};
use futures::prelude::*;
use plugin_core::{ChannelId, CommunityId, Incoming, Obfuscated, Outgoing, Plugin};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::discord::{self, ChatMessage, ChatSink, Discord};

#[derive(Debug, Deserialize)]
struct GolemConfig {
    discord_token: Obfuscated,
    /// discord user ids allowed to run admin commands
    admins: Vec<u64>,
    blacklisted_users: Vec<u64>,
    plugins: Vec<String>,
}

impl GolemConfig {
    pub fn from_path<P>(config_path: P) -> std::result::Result<GolemConfig, serde_dhall::Error>
    where
        P: AsRef<Path>,
    {
        serde_dhall::from_file(config_path).parse::<GolemConfig>()
    }
}

/// Who may talk to the plugins, and with which rights.
#[derive(Debug, Default)]
pub struct Access {
    pub admins: Vec<u64>,
    pub blacklisted_users: Vec<u64>,
}

impl Access {
    /// Turn a gateway message into what plugins see, or None if it
    /// should be discarded.
    pub fn incoming(&self, msg: ChatMessage) -> Option<Incoming> {
        if msg.author_is_bot {
            return None;
        }
        if self.blacklisted_users.contains(&msg.author_id) {
            log::debug!(
                "message from blacklisted user: {}, discarding",
                msg.author_name
            );
            return None;
        }

        Some(Incoming {
            community: msg.guild_id.map(CommunityId),
            channel: ChannelId(msg.channel_id),
            is_admin: self.admins.contains(&msg.author_id),
            author: msg.author_name,
            content: msg.content,
        })
    }
}

pub struct Golem {
    discord_token: Obfuscated,
    access: Access,
    sink: Box<dyn ChatSink>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Golem {
    pub async fn new_from_config(config_path: &str) -> Result<Self> {
        let conf = GolemConfig::from_path(config_path)
            .with_context(|| format!("Cannot read golem config from {config_path}"))?;
        let plugins = stream::iter(conf.plugins)
            .map(|name| async move { init_plugin(&name, config_path).await })
            .buffer_unordered(10)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let sink = Box::new(Discord::new(conf.discord_token.0.clone()));
        Ok(Golem::new(
            conf.discord_token,
            Access {
                admins: conf.admins,
                blacklisted_users: conf.blacklisted_users,
            },
            sink,
            plugins,
        ))
    }

    pub fn new(
        discord_token: Obfuscated,
        access: Access,
        sink: Box<dyn ChatSink>,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Self {
        Golem {
            discord_token,
            access,
            sink,
            plugins,
        }
    }

    /// Serve until ctrl-c, then shut the plugins down.
    pub async fn run(&self) -> Result<()> {
        let serve = self.serve();
        tokio::pin!(serve);

        let served = tokio::select! {
            res = &mut serve => Some(res),
            res = tokio::signal::ctrl_c() => {
                res.context("Cannot listen for ctrl-c")?;
                log::info!("Received ctrl-c, shutting down");
                None
            }
        };

        match served {
            // nothing left to deliver plugins' last messages
            Some(res) => {
                self.shutdown_plugins().await;
                res.and(Err(anyhow!("golem exited")))
            }
            // keep delivering messages while plugins wind down
            None => {
                let shutdown = self.shutdown_plugins();
                tokio::pin!(shutdown);
                tokio::select! {
                    _ = &mut shutdown => (),
                    res = &mut serve => {
                        if let Err(err) = res {
                            log::error!("golem stopped while shutting down: {err:?}");
                        }
                        shutdown.await;
                    }
                }
                Ok(())
            }
        }
    }

    async fn serve(&self) -> Result<()> {
        let shard = discord::connect(self.discord_token.0.clone());
        let (tx, rx) = mpsc::channel(100);
        tokio::try_join!(
            discord::recv_messages(shard, tx),
            self.process_messages(rx),
            self.run_plugins(),
        )?;
        Ok(())
    }

    async fn process_messages(&self, mut rx: mpsc::Receiver<ChatMessage>) -> Result<()> {
        while let Some(msg) = rx.recv().await {
            if let Some(msg) = self.access.incoming(msg) {
                self.process_message(&msg).await;
            }
        }
        Ok(())
    }

    pub async fn process_message(&self, msg: &Incoming) {
        for reply in self.plugins_in_messages(msg).await {
            self.outbound_message(&reply).await;
        }
    }

    async fn plugins_in_messages(&self, msg: &Incoming) -> Vec<Outgoing> {
        futures::stream::iter(self.plugins.iter())
            .map(|plugin| async move {
                match plugin.in_message(msg).await {
                    Ok(reply) => reply,
                    Err(err) => {
                        log::error!("in_message error from plugin {}: {err}", plugin.get_name());
                        None
                    }
                }
            })
            .buffered(5)
            .filter_map(future::ready)
            .collect()
            .await
    }

    async fn run_plugins(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(10);
        let runs = self
            .plugins
            .iter()
            .map(|p| {
                let tx = tx.clone();
                async move {
                    p.run(tx)
                        .await
                        .with_context(|| format!("Plugin {}.run() failed", p.get_name()))?;
                    Ok::<(), anyhow::Error>(())
                }
            })
            .collect::<Vec<_>>();
        // plugins hold on to their own sender if they need one
        drop(tx);

        let process = async move {
            while let Some(msg) = rx.recv().await {
                self.outbound_message(&msg).await;
            }
            Ok::<(), anyhow::Error>(())
        };
        futures::future::try_join(futures::future::try_join_all(runs), process).await?;
        Ok(())
    }

    async fn outbound_message(&self, message: &Outgoing) {
        futures::stream::iter(self.plugins.iter())
            .for_each_concurrent(5, |plugin| async move {
                if let Err(err) = plugin.out_message(message).await {
                    log::error!("out_message error from plugin {}: {err}", plugin.get_name());
                }
            })
            .await;

        if let Err(err) = self.sink.send(message).await {
            log::error!("{err:?}");
        }
    }

    async fn shutdown_plugins(&self) {
        futures::stream::iter(self.plugins.iter())
            .for_each_concurrent(5, |plugin| async move {
                match plugin.shutdown().await {
                    Ok(()) => log::info!("Plugin stopped: {}", plugin.get_name()),
                    Err(err) => log::error!("Cannot stop plugin {}: {err}", plugin.get_name()),
                }
            })
            .await;
    }
}

async fn init_plugin(name: &str, config_path: &str) -> Result<Box<dyn Plugin>> {
    let plugin = match name {
        "twitch" => plugin_core::new_boxed::<plugin_twitch::Twitch>(config_path).await,
        _ => return Err(anyhow!("Unknown plugin name: {}", name)),
    };
    let plugin = plugin.with_context(|| format!("Cannot initalize plugin {}", name))?;
    log::info!("Plugin initialized: {}", name);
    Ok(plugin)
}
