//! A named, optionally secret-gated group of subscribed clients.

use std::collections::BTreeSet;

/// Client identity as issued in `HANDSHAKE`.
pub type ClientId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    secret: Option<String>,
    clients: BTreeSet<ClientId>,
}

impl Channel {
    /// Creates an empty channel.  The secret is fixed for the channel's lifetime.
    pub fn new(name: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            name: name.into(),
            secret,
            clients: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// A channel without a secret admits anyone; otherwise the secrets must match.
    pub fn authorize(&self, secret: Option<&str>) -> bool {
        match &self.secret {
            None => true,
            Some(expected) => secret == Some(expected.as_str()),
        }
    }

    pub fn contains(&self, client: &str) -> bool {
        self.clients.contains(client)
    }

    /// Returns `false` if the client was already a member.
    pub fn add(&mut self, client: impl Into<ClientId>) -> bool {
        self.clients.insert(client.into())
    }

    /// Returns `false` if the client was not a member.
    pub fn remove(&mut self, client: &str) -> bool {
        self.clients.remove(client)
    }

    /// Drops every member; the name and secret stay.
    pub fn clear(&mut self) {
        self.clients.clear();
    }

    /// Members in id order.
    pub fn members(&self) -> impl Iterator<Item = &ClientId> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_channel_admits_any_secret() {
        let channel = Channel::new("lobby", None);
        assert!(channel.authorize(None));
        assert!(channel.authorize(Some("anything")));
    }

    #[test]
    fn test_secret_channel_requires_exact_match() {
        let channel = Channel::new("vault", Some("s3cret".into()));
        assert!(channel.authorize(Some("s3cret")));
        assert!(!channel.authorize(Some("S3CRET")));
        assert!(!channel.authorize(None));
    }

    #[test]
    fn test_members_have_no_duplicates() {
        // Arrange
        let mut channel = Channel::new("lobby", None);

        // Act
        let first = channel.add("a");
        let again = channel.add("a");
        channel.add("b");

        // Assert
        assert!(first);
        assert!(!again);
        assert_eq!(channel.members().collect::<Vec<_>>(), ["a", "b"]);
        assert!(channel.remove("a"));
        assert!(!channel.remove("a"));
        assert_eq!(channel.len(), 1);
    }
}
