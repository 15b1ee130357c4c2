use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use tokio::sync::RwLock;
use twitch_api::{
    helix::{
        streams::{GetStreamsRequest, Stream},
        ClientRequestError, HelixRequestGetError,
    },
    twitch_oauth2::{AppAccessToken, ClientId, ClientSecret, TwitchToken},
};

use crate::config::Config;
use crate::errors::{Result, TwitchError};

/// helix refuses more user_login than that in a single request
const MAX_LOGINS_PER_REQUEST: usize = 100;

/// Refresh a bit before the token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Tells which of the given identities are currently live.
#[async_trait]
pub trait LivenessClient: Send + Sync {
    /// Returns the (lowercase) logins which are live.
    /// Absence of a login indicates the stream is not live.
    async fn live_streamers(&self, logins: &[String]) -> Result<HashSet<String>>;
}

/// The bits of a helix stream we care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStream {
    pub user_login: String,
    pub user_name: String,
    pub game_name: String,
    pub title: String,
}

impl From<Stream> for LiveStream {
    fn from(stream: Stream) -> Self {
        LiveStream {
            user_login: stream.user_login.to_string(),
            user_name: stream.user_name.to_string(),
            game_name: stream.game_name,
            title: stream.title,
        }
    }
}

/// App access token through the client credentials flow,
/// and the get streams endpoint.
pub struct HelixClient {
    client_id: ClientId,
    client_secret: ClientSecret,
    http: reqwest::Client,
    helix: twitch_api::HelixClient<'static, reqwest::Client>,
    token: RwLock<Option<AppAccessToken>>,
}

impl HelixClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(HelixClient {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            helix: twitch_api::HelixClient::with_client(http.clone()),
            http,
            token: RwLock::new(None),
        })
    }

    /// Get a fresh app access token, retrying once if twitch is having a bad day.
    pub async fn acquire_credential(&self) -> Result<AppAccessToken> {
        match self.exchange_credential().await {
            Err(err) => {
                log::warn!("Cannot get twitch token, retrying once: {err}");
                self.exchange_credential().await
            }
            token => token,
        }
    }

    async fn exchange_credential(&self) -> Result<AppAccessToken> {
        let token = AppAccessToken::get_app_access_token(
            &self.http,
            self.client_id.clone(),
            self.client_secret.clone(),
            vec![], // scopes
        )
        .await
        .map_err(|err| TwitchError::Auth(err.to_string()))?;

        log::debug!("Got a twitch app token valid for {:?}", token.expires_in());
        Ok(token)
    }

    /// The cached token, or a new one if there is none or it is about to expire.
    pub async fn get_credential(&self) -> Result<AppAccessToken> {
        {
            let token = self.token.read().await;
            if let Some(token) = token.as_ref().filter(|t| is_fresh(*t)) {
                return Ok(token.clone());
            }
        }

        let mut token = self.token.write().await;
        // someone else may have refreshed it while we were waiting for the lock
        if let Some(token) = token.as_ref().filter(|t| is_fresh(*t)) {
            return Ok(token.clone());
        }
        let fresh = self.acquire_credential().await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    async fn invalidate_credential(&self) {
        *self.token.write().await = None;
    }

    /// Query which of the given logins are live, in as few requests as helix allows.
    pub async fn query_live(
        &self,
        logins: &[String],
        token: &AppAccessToken,
    ) -> Result<Vec<LiveStream>> {
        let batches = logins
            .chunks(MAX_LOGINS_PER_REQUEST)
            .map(|batch| self.query_batch(batch, token));
        let streams = futures::future::try_join_all(batches).await?;
        Ok(streams.into_iter().flatten().collect())
    }

    async fn query_batch(
        &self,
        logins: &[String],
        token: &AppAccessToken,
    ) -> Result<Vec<LiveStream>> {
        let req = GetStreamsRequest::user_logins(logins).first(MAX_LOGINS_PER_REQUEST);
        let resp = self
            .helix
            .req_get(req, token)
            .await
            .map_err(|err| match err {
                ClientRequestError::HelixRequestGetError(HelixRequestGetError::Error {
                    status,
                    ..
                }) => TwitchError::UpstreamStatus(status.as_u16()),
                err => TwitchError::Upstream(err.to_string()),
            })?;
        Ok(resp.data.into_iter().map(LiveStream::from).collect())
    }
}

fn is_fresh(token: &AppAccessToken) -> bool {
    token.expires_in() > EXPIRY_MARGIN
}

#[async_trait]
impl LivenessClient for HelixClient {
    async fn live_streamers(&self, logins: &[String]) -> Result<HashSet<String>> {
        if logins.is_empty() {
            return Ok(HashSet::new());
        }

        let token = self.get_credential().await?;
        let streams = match self.query_live(logins, &token).await {
            Err(TwitchError::UpstreamStatus(401)) => {
                log::warn!("Twitch rejected our app token, it will be renewed on next use");
                self.invalidate_credential().await;
                return Err(TwitchError::UpstreamStatus(401));
            }
            res => res?,
        };

        Ok(streams
            .into_iter()
            .map(|s| s.user_login.to_lowercase())
            .collect())
    }
}
