use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use plugin_core::{ChannelId, CommunityId};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::errors::StoreError;

/// What a community tracks: streamers with their last known liveness,
/// and where to announce them.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub streamers: BTreeMap<String, bool>,
    #[serde(default)]
    pub channel_ids: Vec<ChannelId>,
}

impl Roster {
    /// Logins are matched lowercase. A hand edited file may have
    /// them in any case, the same login twice counts as live if
    /// either entry is.
    fn normalized(self) -> Roster {
        let mut streamers = BTreeMap::new();
        for (login, is_live) in self.streamers {
            *streamers.entry(login.to_lowercase()).or_insert(false) |= is_live;
        }
        Roster {
            streamers,
            channel_ids: self.channel_ids,
        }
    }
}

/// Where rosters are persisted.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<HashMap<CommunityId, Roster>, StoreError>;

    async fn save(&self, community: CommunityId, roster: &Roster) -> Result<(), StoreError>;
}

/// Keeps nothing, state only lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore;

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<HashMap<CommunityId, Roster>, StoreError> {
        Ok(HashMap::new())
    }

    async fn save(&self, _community: CommunityId, _roster: &Roster) -> Result<(), StoreError> {
        Ok(())
    }
}

/// All rosters in a single json document, keyed by community id.
/// The file is rewritten as a whole on every save.
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<BTreeMap<CommunityId, Roster>>,
}

impl JsonFileStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No state found at {}, starting fresh", path.display());
                BTreeMap::new()
            }
            Err(err) => return Err(err.into()),
        };

        Ok(JsonFileStore {
            path,
            document: Mutex::new(document),
        })
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<HashMap<CommunityId, Roster>, StoreError> {
        let document = self.document.lock().await;
        Ok(document
            .iter()
            .map(|(community, roster)| (*community, roster.clone()))
            .collect())
    }

    async fn save(&self, community: CommunityId, roster: &Roster) -> Result<(), StoreError> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        next.insert(community, roster.clone());

        let bytes = serde_json::to_vec_pretty(&next)?;
        // write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        *document = next;
        Ok(())
    }
}

/// Per community rosters, with a single writer per community.
pub struct StatusStore {
    backend: Box<dyn ConfigStore>,
    rosters: RwLock<HashMap<CommunityId, Arc<Mutex<Roster>>>>,
}

impl StatusStore {
    pub async fn open<S>(backend: S) -> Result<Self, StoreError>
    where
        S: ConfigStore + 'static,
    {
        let rosters = backend
            .load()
            .await?
            .into_iter()
            .map(|(community, roster)| (community, Arc::new(Mutex::new(roster.normalized()))))
            .collect::<HashMap<_, _>>();
        log::debug!("Loaded rosters for {} communities", rosters.len());

        Ok(StatusStore {
            backend: Box::new(backend),
            rosters: RwLock::new(rosters),
        })
    }

    pub fn in_memory() -> Self {
        StatusStore {
            backend: Box::new(MemoryStore),
            rosters: Default::default(),
        }
    }

    /// Communities with a roster, in ascending id order.
    pub async fn list_communities(&self) -> Vec<CommunityId> {
        let mut communities = self.rosters.read().await.keys().copied().collect::<Vec<_>>();
        communities.sort();
        communities
    }

    /// A snapshot of the roster. Unknown communities get an empty one.
    pub async fn get_roster(&self, community: CommunityId) -> Roster {
        let entry = self.rosters.read().await.get(&community).cloned();
        match entry {
            Some(roster) => roster.lock().await.clone(),
            None => Roster::default(),
        }
    }

    pub async fn set_roster(&self, community: CommunityId, roster: Roster) -> Result<(), StoreError> {
        self.update(community, move |current| *current = roster).await
    }

    /// Read-modify-write a roster while holding its community lock.
    /// The change is persisted before it becomes visible; if persisting
    /// fails, the roster is left as it was. Unchanged rosters aren't written.
    pub async fn update<F, R>(&self, community: CommunityId, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Roster) -> R,
    {
        let entry = self.entry(community).await;
        let mut current = entry.lock().await;

        let mut next = current.clone();
        let result = f(&mut next);
        if next != *current {
            self.backend.save(community, &next).await?;
            *current = next;
        }
        Ok(result)
    }

    async fn entry(&self, community: CommunityId) -> Arc<Mutex<Roster>> {
        if let Some(entry) = self.rosters.read().await.get(&community) {
            return entry.clone();
        }
        self.rosters
            .write()
            .await
            .entry(community)
            .or_default()
            .clone()
    }
}
