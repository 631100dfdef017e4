//! Ordered transport metadata attached to connectors, connections, and timers.

/// Ordered string→string map. Insertion order is part of the contract (callers may render it,
/// or rely on `connector_*` keys preceding `socket_*` keys when a connector's map is extended by
/// a connection at accept/connect time) so this is a `Vec`, not a `HashMap`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoMap {
    entries: Vec<(String, String)>,
}

impl InfoMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `key`. Overwriting preserves the original position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Looks up a key's value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True if every entry of `other` is present with an equal value (used by the
    /// (INFO-PROPAGATE) invariant: an accepted connection's map must be a superset of its
    /// connector's map).
    pub fn is_superset_of(&self, other: &InfoMap) -> bool {
        other.iter().all(|(k, v)| self.get(k) == Some(v))
    }

    /// Merges `other` into `self`, with `other`'s values winning on key collision. Used when a
    /// connection extends the `InfoMap` it inherited from its connector.
    pub fn extend(&mut self, other: &InfoMap) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_preserves_insertion_order() {
        let mut map = InfoMap::new();
        map.set("socket_type", "tcp");
        map.set("connector_host", "example.com");
        map.set("socket_type", "local"); // overwrite, should not move to the back
        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(vec!["socket_type", "connector_host"], keys);
        assert_eq!(Some("local"), map.get("socket_type"));
    }

    #[test]
    fn is_superset_of_checks_value_equality() {
        let mut connector = InfoMap::new();
        connector.set("connector_host", "example.com");
        connector.set("connector_port", "443");

        let mut connection = connector.clone();
        connection.set("socket_remote", "10.0.0.1:55000");

        assert!(connection.is_superset_of(&connector));

        connection.set("connector_port", "80");
        assert!(!connection.is_superset_of(&connector));
    }
}
