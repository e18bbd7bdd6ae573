//! Access control capability
//!
//! A log asks its controller before admitting any entry, whether locally
//! appended or arriving through a join. Controllers are plain values
//! satisfying one method, so policies range from the constants below to
//! arbitrary closures over the entry.

use std::collections::HashSet;

use crate::entry::Entry;

/// Decides whether an identity may append a given entry.
pub trait AccessController: Send + Sync {
    /// May this entry be appended to the log?
    fn can_append(&self, entry: &Entry) -> bool;
}

/// Grants every writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessController for AllowAll {
    fn can_append(&self, _entry: &Entry) -> bool {
        true
    }
}

/// Rejects every writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl AccessController for DenyAll {
    fn can_append(&self, _entry: &Entry) -> bool {
        false
    }
}

/// Permits only the listed identity ids.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Add an id to the list.
    pub fn allow(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }
}

impl AccessController for AllowList {
    fn can_append(&self, entry: &Entry) -> bool {
        self.ids.contains(&entry.identity.id)
    }
}

// Arbitrary predicates double as controllers.
impl<F> AccessController for F
where
    F: Fn(&Entry) -> bool + Send + Sync,
{
    fn can_append(&self, entry: &Entry) -> bool {
        self(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityProvider, KeystoreProvider};
    use braid_model::LamportClock;

    fn entry_by(id: &str) -> Entry {
        let provider = KeystoreProvider::in_memory();
        let identity = provider.create_identity(id).unwrap();
        Entry::create(
            "log-a",
            "payload",
            vec![],
            LamportClock::new(id, 1),
            &identity,
            &provider,
        )
        .unwrap()
    }

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.can_append(&entry_by("alice")));
    }

    #[test]
    fn test_deny_all() {
        assert!(!DenyAll.can_append(&entry_by("alice")));
    }

    #[test]
    fn test_allow_list() {
        let mut acl = AllowList::new(["alice"]);
        assert!(acl.can_append(&entry_by("alice")));
        assert!(!acl.can_append(&entry_by("bob")));

        acl.allow("bob");
        assert!(acl.can_append(&entry_by("bob")));
    }

    #[test]
    fn test_closure_predicate() {
        let only_alice = |entry: &Entry| entry.identity.id == "alice";
        assert!(only_alice.can_append(&entry_by("alice")));
        assert!(!only_alice.can_append(&entry_by("bob")));
    }
}
