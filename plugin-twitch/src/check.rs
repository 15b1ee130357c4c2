use std::sync::Arc;

use plugin_core::{ChannelId, CommunityId, Outgoing};
use tokio::sync::mpsc;

use crate::client::LivenessClient;
use crate::errors::{Result, TwitchError};
use crate::store::StatusStore;

/// What happened during one tick, mostly for logging.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub went_live: usize,
}

/// Polls liveness for every community and announces streams going live.
pub struct LiveNotifier<C> {
    client: C,
    store: Arc<StatusStore>,
    profile_url_base: String,
}

impl<C: LivenessClient> LiveNotifier<C> {
    pub fn new(client: C, store: Arc<StatusStore>, profile_url_base: String) -> Self {
        LiveNotifier {
            client,
            store,
            profile_url_base,
        }
    }

    /// Check all communities. A failure only affects the community it happened in.
    pub async fn tick(&self, bot_chan: &mpsc::Sender<Outgoing>) -> TickReport {
        let mut report = TickReport::default();

        for community in self.store.list_communities().await {
            match self.check_community(community, bot_chan).await {
                Ok(None) => report.skipped += 1,
                Ok(Some(went_live)) => {
                    report.checked += 1;
                    report.went_live += went_live;
                }
                Err(err) => {
                    log::error!("Cannot check streams for community {community}: {err}");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Returns None when there was nothing to check, otherwise
    /// how many streamers went live.
    pub async fn check_community(
        &self,
        community: CommunityId,
        bot_chan: &mpsc::Sender<Outgoing>,
    ) -> Result<Option<usize>> {
        let roster = self.store.get_roster(community).await;
        if roster.channel_ids.is_empty() || roster.streamers.is_empty() {
            return Ok(None);
        }

        let logins = roster.streamers.keys().cloned().collect::<Vec<_>>();
        let live = self.client.live_streamers(&logins).await?;

        // Apply the diff against the roster as it is now, not the snapshot:
        // commands may have changed it while we were waiting for twitch.
        // Streamers added in the meantime weren't queried and are left alone.
        let (went_live, channels) = self
            .store
            .update(community, |current| {
                let mut went_live = vec![];
                for login in &logins {
                    if let Some(is_live) = current.streamers.get_mut(login) {
                        let now_live = live.contains(login);
                        if now_live && !*is_live {
                            went_live.push(login.clone());
                        }
                        *is_live = now_live;
                    }
                }
                (went_live, current.channel_ids.clone())
            })
            .await?;

        for (idx, login) in went_live.iter().enumerate() {
            if let Err(err) = self.announce(login, &channels, bot_chan).await {
                // not announced, so the next tick must see them go live again
                self.revert_to_offline(community, &went_live[idx..]).await;
                return Err(err);
            }
            log::info!("Stream online in community {community}: {login}");
        }

        Ok(Some(went_live.len()))
    }

    async fn announce(
        &self,
        login: &str,
        channels: &[ChannelId],
        bot_chan: &mpsc::Sender<Outgoing>,
    ) -> Result<()> {
        let message = self.live_message(login);
        for channel in channels {
            bot_chan
                .send(Outgoing::new(*channel, message.clone()))
                .await
                .map_err(|_| TwitchError::BotChannelClosed)?;
        }
        Ok(())
    }

    async fn revert_to_offline(&self, community: CommunityId, logins: &[String]) {
        let res = self
            .store
            .update(community, |current| {
                for login in logins {
                    if let Some(is_live) = current.streamers.get_mut(login) {
                        *is_live = false;
                    }
                }
            })
            .await;
        if let Err(err) = res {
            log::error!("Cannot mark unannounced streams offline in community {community}: {err}");
        }
    }

    fn live_message(&self, login: &str) -> String {
        format!(
            "{login} is now live on Twitch! Check them out: {}{login}",
            self.profile_url_base
        )
    }
}
