//! Persistence collaborator: users, channels and message history.

use std::collections::HashMap;

use dashmap::DashMap;
use relaychat_protocol::{ChannelInfo, MessageInfo, UserInfo};

use crate::config::{ChannelEntry, UserEntry};
use crate::error::StoreError;

/// Storage operations the chat sessions depend on.
pub trait Store: Send + Sync {
    fn user_id(&self, username: &str) -> Result<u32, StoreError>;
    fn user_credential(&self, user_id: u32) -> Result<String, StoreError>;
    /// Channels in storage order.
    fn channels(&self) -> Result<Vec<ChannelInfo>, StoreError>;
    /// Users in storage order, all with `is_online == false`.
    fn users(&self) -> Result<Vec<UserInfo>, StoreError>;
    fn save_message(&self, channel_id: u32, message: &MessageInfo) -> Result<(), StoreError>;
    /// History of one channel, oldest first.
    fn messages(&self, channel_id: u32) -> Result<Vec<MessageInfo>, StoreError>;
}

struct StoredUser {
    id: u32,
    name: String,
    credential: String,
}

/// In-memory store seeded from the server config. History lives for the process lifetime.
pub struct MemoryStore {
    users: Vec<StoredUser>,
    ids_by_name: HashMap<String, u32>,
    channels: Vec<ChannelInfo>,
    history: DashMap<u32, Vec<MessageInfo>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(channels: &[ChannelEntry], users: &[UserEntry]) -> Self {
        let users: Vec<StoredUser> = users
            .iter()
            .map(|u| StoredUser {
                id: u.id,
                name: u.name.clone(),
                credential: u.credential.clone(),
            })
            .collect();
        let ids_by_name = users.iter().map(|u| (u.name.clone(), u.id)).collect();
        let channels = channels
            .iter()
            .map(|c| ChannelInfo::new(c.id, c.is_voice, c.name.clone()))
            .collect();

        Self {
            users,
            ids_by_name,
            channels,
            history: DashMap::new(),
        }
    }
}

impl Store for MemoryStore {
    fn user_id(&self, username: &str) -> Result<u32, StoreError> {
        self.ids_by_name
            .get(username)
            .copied()
            .ok_or_else(|| StoreError::UnknownUser(username.to_string()))
    }

    fn user_credential(&self, user_id: u32) -> Result<String, StoreError> {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.credential.clone())
            .ok_or(StoreError::MissingCredential(user_id))
    }

    fn channels(&self) -> Result<Vec<ChannelInfo>, StoreError> {
        Ok(self.channels.clone())
    }

    fn users(&self) -> Result<Vec<UserInfo>, StoreError> {
        Ok(self
            .users
            .iter()
            .map(|u| UserInfo::new(u.id, false, u.name.clone()))
            .collect())
    }

    fn save_message(&self, channel_id: u32, message: &MessageInfo) -> Result<(), StoreError> {
        if !self.channels.iter().any(|c| c.id == channel_id) {
            return Err(StoreError::UnknownChannel(channel_id));
        }
        self.history.entry(channel_id).or_default().push(message.clone());
        Ok(())
    }

    fn messages(&self, channel_id: u32) -> Result<Vec<MessageInfo>, StoreError> {
        Ok(self
            .history
            .get(&channel_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
