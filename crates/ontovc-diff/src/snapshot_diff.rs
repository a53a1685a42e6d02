//! Snapshot-level diff: compare two schema snapshots.
//!
//! Resources are compared by [`ResourceKey`]. Keys present only in the new
//! snapshot are added, keys present only in the old one are deleted, and keys
//! present in both with different content are modified. A deleted and an
//! added resource of the same kind whose bodies match apart from the name are
//! reported as a rename instead, provided neither has another match.

use std::collections::BTreeMap;

use ontovc_types::{ResourceKey, SchemaResource, Snapshot};

/// A resource present on both sides with different content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    pub before: SchemaResource,
    pub after: SchemaResource,
}

/// A resource whose identity changed while its body did not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rename {
    pub to: ResourceKey,
    pub before: SchemaResource,
    pub after: SchemaResource,
}

/// A single change between two snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceChange {
    Added {
        key: ResourceKey,
        resource: SchemaResource,
    },
    Deleted {
        key: ResourceKey,
        resource: SchemaResource,
    },
    Modified {
        key: ResourceKey,
        before: SchemaResource,
        after: SchemaResource,
    },
    Renamed {
        from: ResourceKey,
        to: ResourceKey,
        resource: SchemaResource,
    },
}

impl ResourceChange {
    /// The key this change is ordered by (the old key for renames).
    pub fn key(&self) -> &ResourceKey {
        match self {
            Self::Added { key, .. } | Self::Deleted { key, .. } | Self::Modified { key, .. } => key,
            Self::Renamed { from, .. } => from,
        }
    }
}

/// The changes that turn one snapshot into another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeMap<ResourceKey, SchemaResource>,
    pub deleted: BTreeMap<ResourceKey, SchemaResource>,
    pub modified: BTreeMap<ResourceKey, Modification>,
    /// Keyed by the old identity.
    pub renamed: BTreeMap<ResourceKey, Rename>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of changes.
    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len() + self.renamed.len()
    }

    /// Keys that exist only on the new side, rename targets included.
    pub fn added_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .added
            .keys()
            .cloned()
            .chain(self.renamed.values().map(|r| r.to.clone()))
            .collect();
        keys.sort();
        keys
    }

    /// Keys that exist only on the old side, rename sources included.
    pub fn deleted_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self
            .deleted
            .keys()
            .chain(self.renamed.keys())
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn modified_keys(&self) -> Vec<ResourceKey> {
        self.modified.keys().cloned().collect()
    }

    /// `(old, new)` identity pairs, ordered by old identity.
    pub fn renamed_pairs(&self) -> Vec<(ResourceKey, ResourceKey)> {
        self.renamed
            .iter()
            .map(|(from, r)| (from.clone(), r.to.clone()))
            .collect()
    }

    /// Whether `key` was touched in any way, either as old or new identity.
    pub fn touches(&self, key: &ResourceKey) -> bool {
        self.added.contains_key(key)
            || self.deleted.contains_key(key)
            || self.modified.contains_key(key)
            || self.renamed.contains_key(key)
            || self.renamed.values().any(|r| &r.to == key)
    }

    /// Every change, ordered by key.
    pub fn changes(&self) -> Vec<ResourceChange> {
        let mut changes: Vec<ResourceChange> = Vec::with_capacity(self.len());
        changes.extend(self.added.iter().map(|(k, r)| ResourceChange::Added {
            key: k.clone(),
            resource: r.clone(),
        }));
        changes.extend(self.deleted.iter().map(|(k, r)| ResourceChange::Deleted {
            key: k.clone(),
            resource: r.clone(),
        }));
        changes.extend(self.modified.iter().map(|(k, m)| ResourceChange::Modified {
            key: k.clone(),
            before: m.before.clone(),
            after: m.after.clone(),
        }));
        changes.extend(self.renamed.iter().map(|(k, r)| ResourceChange::Renamed {
            from: k.clone(),
            to: r.to.clone(),
            resource: r.after.clone(),
        }));
        changes.sort_by(|a, b| a.key().cmp(b.key()));
        changes
    }
}

/// Compute the changes from `old` to `new`.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> ChangeSet {
    let mut set = ChangeSet::new();

    for (key, before) in old.iter() {
        match new.get(key) {
            Some(after) if after != before => {
                set.modified.insert(
                    key.clone(),
                    Modification {
                        before: before.clone(),
                        after: after.clone(),
                    },
                );
            }
            Some(_) => {}
            None => {
                set.deleted.insert(key.clone(), before.clone());
            }
        }
    }

    for (key, after) in new.iter() {
        if !old.contains(key) {
            set.added.insert(key.clone(), after.clone());
        }
    }

    detect_renames(&mut set);
    set
}

/// Pair up deleted and added resources whose bodies differ only by name.
///
/// A pair is a rename only when the match is unique on both sides. Plain
/// resources often share a body, and guessing between them would attach
/// one resource's history to an unrelated one.
fn detect_renames(set: &mut ChangeSet) {
    let bodies = |resources: &BTreeMap<ResourceKey, SchemaResource>| {
        resources
            .iter()
            .filter_map(|(key, r)| r.body_without_name().ok().map(|body| (key.clone(), body)))
            .collect::<Vec<_>>()
    };
    let deleted = bodies(&set.deleted);
    let added = bodies(&set.added);

    let mut pairs = Vec::new();
    for (old_key, old_body) in &deleted {
        let mut matches = added
            .iter()
            .filter(|(new_key, new_body)| new_key.kind == old_key.kind && new_body == old_body);
        let (Some((new_key, _)), None) = (matches.next(), matches.next()) else {
            continue;
        };
        let rivals = deleted
            .iter()
            .filter(|(key, body)| key.kind == old_key.kind && body == old_body)
            .count();
        if rivals == 1 {
            pairs.push((old_key.clone(), new_key.clone()));
        }
    }

    for (old_key, new_key) in pairs {
        let (Some(before), Some(after)) = (set.deleted.remove(&old_key), set.added.remove(&new_key))
        else {
            continue;
        };
        set.renamed.insert(
            old_key,
            Rename {
                to: new_key,
                before,
                after,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontovc_types::{ObjectTypeDef, PropertyDef};

    fn object(name: &str, description: &str) -> SchemaResource {
        SchemaResource::ObjectType(ObjectTypeDef::new(name).with_description(description))
    }

    fn property(name: &str, data_type: &str) -> SchemaResource {
        SchemaResource::Property(PropertyDef::new(name, data_type))
    }

    fn snapshot(resources: &[SchemaResource]) -> Snapshot {
        resources.iter().cloned().collect()
    }

    #[test]
    fn identical_snapshots_no_diff() {
        let s = snapshot(&[object("Product", "x"), property("sku", "string")]);
        assert!(diff_snapshots(&s, &s).is_empty());
    }

    #[test]
    fn mixed_changes() {
        let old = snapshot(&[
            object("Keep", "same"),
            object("Change", "old"),
            property("gone", "string"),
        ]);
        let new = snapshot(&[
            object("Keep", "same"),
            object("Change", "new"),
            property("fresh", "integer"),
        ]);

        let set = diff_snapshots(&old, &new);
        assert_eq!(set.len(), 3);
        assert_eq!(set.added_keys(), vec![ResourceKey::property("fresh")]);
        assert_eq!(set.deleted_keys(), vec![ResourceKey::property("gone")]);
        assert_eq!(set.modified_keys(), vec![ResourceKey::object_type("Change")]);
        assert!(set.renamed.is_empty());
    }

    #[test]
    fn rename_detected_by_identical_body() {
        let old = snapshot(&[object("Client", "a customer")]);
        let new = snapshot(&[object("Customer", "a customer")]);

        let set = diff_snapshots(&old, &new);
        assert!(set.added.is_empty());
        assert!(set.deleted.is_empty());
        assert_eq!(
            set.renamed_pairs(),
            vec![(
                ResourceKey::object_type("Client"),
                ResourceKey::object_type("Customer")
            )]
        );
        assert_eq!(set.added_keys(), vec![ResourceKey::object_type("Customer")]);
        assert_eq!(set.deleted_keys(), vec![ResourceKey::object_type("Client")]);
        assert!(set.touches(&ResourceKey::object_type("Customer")));
    }

    #[test]
    fn no_rename_across_kinds_or_bodies() {
        let old = snapshot(&[object("Client", "a customer"), property("p", "string")]);
        let new = snapshot(&[object("Customer", "someone else"), property("q", "integer")]);

        let set = diff_snapshots(&old, &new);
        assert!(set.renamed.is_empty());
        assert_eq!(set.added.len(), 2);
        assert_eq!(set.deleted.len(), 2);
    }

    #[test]
    fn ambiguous_body_matches_are_not_renames() {
        let old = snapshot(&[property("a", "string"), property("b", "string")]);
        let new = snapshot(&[property("c", "string")]);
        let set = diff_snapshots(&old, &new);
        assert!(set.renamed.is_empty());
        assert_eq!(set.deleted.len(), 2);
        assert_eq!(set.added.len(), 1);

        let old = snapshot(&[property("a", "string")]);
        let new = snapshot(&[property("b", "string"), property("c", "string")]);
        let set = diff_snapshots(&old, &new);
        assert!(set.renamed.is_empty());
        assert_eq!(set.added.len(), 2);
    }

    #[test]
    fn unique_match_among_other_changes_is_a_rename() {
        let old = snapshot(&[property("a", "string"), property("n", "integer")]);
        let new = snapshot(&[property("b", "string"), property("m", "decimal")]);
        let set = diff_snapshots(&old, &new);
        assert_eq!(
            set.renamed_pairs(),
            vec![(ResourceKey::property("a"), ResourceKey::property("b"))]
        );
        assert_eq!(set.deleted_keys(), vec![ResourceKey::property("a"), ResourceKey::property("n")]);
    }

    #[test]
    fn changes_are_sorted_by_key() {
        let old = snapshot(&[property("z", "string")]);
        let new = snapshot(&[property("a", "integer"), object("M", "m")]);
        let keys: Vec<ResourceKey> = diff_snapshots(&old, &new)
            .changes()
            .iter()
            .map(|c| c.key().clone())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
