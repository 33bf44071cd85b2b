//! Channel membership.
//!
//! Channels are created on first reference and never removed, even when
//! they empty out. Members are kept in join order, which is also the order
//! broadcasts are queued in.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::net::ConnectionId;

use super::{Relay, RelayError};

#[derive(Debug, Default)]
pub struct Directory {
    channels: BTreeMap<String, Vec<ConnectionId>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel if it does not exist yet.
    pub fn ensure(&mut self, channel: &str) -> &mut Vec<ConnectionId> {
        self.channels.entry(channel.to_string()).or_default()
    }

    /// Returns `true` if `id` was not a member before.
    pub fn join(&mut self, id: ConnectionId, channel: &str) -> bool {
        let members = self.ensure(channel);
        if members.contains(&id) {
            return false;
        }
        members.push(id);
        true
    }

    /// `None` if the channel does not exist, otherwise whether `id` was a
    /// member and how many members remain.
    pub fn leave(&mut self, id: ConnectionId, channel: &str) -> Option<(bool, usize)> {
        let members = self.channels.get_mut(channel)?;
        let was_member = match members.iter().position(|m| *m == id) {
            Some(pos) => {
                members.remove(pos);
                true
            }
            None => false,
        };
        Some((was_member, members.len()))
    }

    /// Remove `id` everywhere; returns each channel it left and how many remain there.
    pub fn purge(&mut self, id: ConnectionId) -> Vec<(String, usize)> {
        let mut left = Vec::new();
        for (name, members) in self.channels.iter_mut() {
            if let Some(pos) = members.iter().position(|m| *m == id) {
                members.remove(pos);
                left.push((name.clone(), members.len()));
            }
        }
        left
    }

    /// Snapshot of a channel's members.
    pub fn members(&self, channel: &str) -> Vec<ConnectionId> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    pub fn contains(&self, id: ConnectionId, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|members| members.contains(&id))
    }

    pub fn channels_of(&self, id: ConnectionId) -> Vec<String> {
        self.channels
            .iter()
            .filter(|(_, members)| members.contains(&id))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.channels
            .iter()
            .map(|(name, members)| (name.clone(), members.len()))
            .collect()
    }
}

/// Who is online, globally or in one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Presence {
    Channel {
        channel: String,
        online: usize,
        users: Vec<String>,
    },
    All(BTreeMap<String, usize>),
}

impl Relay {
    /// Add `id` to `channel`, creating the channel if needed.
    ///
    /// A new membership is announced to the whole channel, the new member
    /// included. Joining a channel twice changes nothing.
    pub fn subscribe(&mut self, id: ConnectionId, channel: &str) -> Result<(), RelayError> {
        if !self.registry.contains(id) {
            return Err(RelayError::TargetNotFound(id));
        }
        if !self.directory.join(id, channel) {
            return Ok(());
        }

        let total = self.directory.members(channel).len();
        tracing::debug!(client_id = %id, channel, total_users = total, "Joined channel");
        self.broadcast(
            channel,
            "user_joined",
            serde_json::json!({ "client_id": id.to_string(), "total_users": total }),
        );
        Ok(())
    }

    /// Remove `id` from `channel`. Returns whether it was a member.
    ///
    /// Whenever the channel exists and still has members they are told with
    /// `user_left`, even if `id` was never in it.
    pub fn unsubscribe(&mut self, id: ConnectionId, channel: &str) -> bool {
        let Some((was_member, remaining)) = self.directory.leave(id, channel) else {
            return false;
        };

        tracing::debug!(
            client_id = %id,
            channel,
            was_member,
            total_users = remaining,
            "Left channel"
        );
        if remaining > 0 {
            self.broadcast(
                channel,
                "user_left",
                serde_json::json!({ "client_id": id.to_string(), "total_users": remaining }),
            );
        }
        was_member
    }

    pub fn presence(&self, channel: Option<&str>) -> Presence {
        match channel {
            Some(name) => {
                let users: Vec<String> = self
                    .directory
                    .members(name)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                Presence::Channel {
                    channel: name.to_string(),
                    online: users.len(),
                    users,
                }
            }
            None => Presence::All(self.directory.counts()),
        }
    }

    pub fn channels_of(&self, id: ConnectionId) -> Vec<String> {
        self.directory.channels_of(id)
    }
}
