use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use plugin_core::{Incoming, Outgoing, Plugin, Result};
use tokio::sync::mpsc;

pub mod check;
pub mod client;
pub mod commands;
pub mod config;
pub mod errors;
pub mod scheduler;
pub mod store;

use crate::check::LiveNotifier;
use crate::client::HelixClient;
use crate::config::Config;
use crate::errors::TwitchError;
use crate::scheduler::Scheduler;
use crate::store::{JsonFileStore, StatusStore};

/// Announces in chat when tracked twitch streamers go live.
pub struct Twitch {
    config: Config,
    store: Arc<StatusStore>,
    notifier: Arc<LiveNotifier<HelixClient>>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl Twitch {
    pub fn new(config: Config, store: StatusStore) -> std::result::Result<Self, TwitchError> {
        let store = Arc::new(store);
        let client = HelixClient::new(&config)?;
        let notifier = Arc::new(LiveNotifier::new(
            client,
            store.clone(),
            config.profile_url_base.clone(),
        ));
        Ok(Twitch {
            config,
            store,
            notifier,
            scheduler: Mutex::new(None),
        })
    }

    async fn in_msg(&self, msg: &Incoming) -> Result<Option<Outgoing>> {
        let cmd = match commands::parse_command(&msg.content) {
            Some(cmd) => cmd,
            None => return Ok(None),
        };

        let community = match msg.community {
            Some(community) => community,
            None => {
                log::debug!("Ignoring twitch command from {} outside of a community", msg.author);
                return Ok(None);
            }
        };

        if !msg.is_admin {
            log::debug!("Ignoring twitch command from non admin {}", msg.author);
            return Ok(None);
        }

        let reply = match commands::handle_command(&self.store, community, cmd).await {
            Ok(reply) => reply,
            Err(err) => {
                log::error!("Cannot handle twitch command in community {community}: {err}");
                format!("Error while updating twitch notifications: {err}")
            }
        };
        Ok(Some(Outgoing::new(msg.channel, reply)))
    }
}

#[async_trait]
impl Plugin for Twitch {
    async fn init(config_path: &str) -> Result<Self> {
        let config = Config::from_file_keyed(config_path)
            .with_context(|| format!("Cannot read twitch config from {config_path}"))?;

        let store = match config.state_path {
            Some(ref path) => {
                let backend = JsonFileStore::open(path)
                    .await
                    .with_context(|| format!("Cannot open twitch state at {path}"))?;
                StatusStore::open(backend)
                    .await
                    .context("Cannot load twitch state")?
            }
            None => {
                log::warn!("No state_path for twitch, notifications state won't survive a restart");
                StatusStore::in_memory()
            }
        };

        Ok(Twitch::new(config, store)?)
    }

    async fn run(&self, bot_chan: mpsc::Sender<Outgoing>) -> Result<()> {
        let notifier = self.notifier.clone();
        let job = move || {
            let notifier = notifier.clone();
            let bot_chan = bot_chan.clone();
            async move {
                let report = notifier.tick(&bot_chan).await;
                log::info!("Twitch check done: {report:?}");
            }
        };

        let scheduler = Scheduler::start(
            self.config.poll_interval(),
            self.config.shutdown_grace(),
            job,
        );
        log::info!(
            "Checking twitch streams every {:?}",
            self.config.poll_interval()
        );

        let previous = self.scheduler.lock().replace(scheduler);
        if let Some(previous) = previous {
            log::warn!("Twitch plugin started twice, stopping the previous scheduler");
            previous.shutdown().await;
        }
        Ok(())
    }

    fn get_name(&self) -> &'static str {
        "twitch"
    }

    async fn in_message(&self, msg: &Incoming) -> Result<Option<Outgoing>> {
        self.in_msg(msg).await
    }

    async fn shutdown(&self) -> Result<()> {
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        Ok(())
    }
}
