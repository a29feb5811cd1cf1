use super::types::{ConnectionId, UserProfile};

/// Who is online, in the order their connections registered.
///
/// Plain data: it performs no I/O and holds no lock of its own. Callers
/// serialize access and broadcast the new snapshot after each mutation.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Vec<(ConnectionId, UserProfile)>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `profile` with the connection. A re-registration replaces
    /// the profile but keeps the connection's original position.
    pub fn register(&mut self, id: ConnectionId, profile: UserProfile) -> Option<UserProfile> {
        match self.entries.iter_mut().find(|(entry_id, _)| *entry_id == id) {
            Some((_, existing)) => Some(std::mem::replace(existing, profile)),
            None => {
                self.entries.push((id, profile));
                None
            }
        }
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<UserProfile> {
        let index = self.entries.iter().position(|(entry_id, _)| entry_id == id)?;
        Some(self.entries.remove(index).1)
    }

    pub fn profile(&self, id: &ConnectionId) -> Option<&UserProfile> {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, profile)| profile)
    }

    pub fn snapshot(&self) -> Vec<UserProfile> {
        self.entries.iter().map(|(_, profile)| profile.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
