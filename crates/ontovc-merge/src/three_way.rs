//! Three-way merge of schema snapshots.
//!
//! Resources are merged per key, and values recursively per field:
//!
//! - one side changed: take it
//! - both changed to the same value: take it
//! - both changed differently: JSON objects merge key by key, arrays of named
//!   objects merge element by element keyed by `name`, anything else is a
//!   conflict
//!
//! At a conflicting position the merged value keeps the target side.
//! Elements added to a named array are ordered after the base elements, by
//! name, so swapping source and target changes nothing but the values kept
//! at conflicting positions.

use std::collections::{BTreeSet, HashSet};

use serde_json::{Map, Value};

use ontovc_diff::diff_snapshots;
use ontovc_types::{Conflict, ConflictType, FieldPath, ResourceKey, SchemaResource, Snapshot};

/// How to treat positions that are absent from the base on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// A position added on both sides with different values is a conflict.
    Strict,
    /// Positions added on both sides are merged field by field as if the
    /// base were empty; only overlapping differences conflict.
    UnionAdditions,
}

/// A conflicting position inside one value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldConflict {
    pub path: FieldPath,
    pub base: Option<Value>,
    pub source: Option<Value>,
    pub target: Option<Value>,
}

impl FieldConflict {
    /// Classify by which sides hold a value at the position.
    pub fn conflict_type(&self) -> ConflictType {
        classify(self.base.as_ref(), self.source.as_ref(), self.target.as_ref())
    }

    pub fn into_conflict(self, resource: ResourceKey) -> Conflict {
        Conflict::new(
            self.conflict_type(),
            resource,
            self.path,
            self.base,
            self.source,
            self.target,
        )
    }
}

fn classify(base: Option<&Value>, source: Option<&Value>, target: Option<&Value>) -> ConflictType {
    match (base, source, target) {
        (None, _, _) => ConflictType::AddAdd,
        (Some(_), None, _) | (Some(_), _, None) => ConflictType::ModifyDelete,
        _ => ConflictType::ModifyModify,
    }
}

/// Merge three versions of a value. `None` means absent.
///
/// Conflicting positions are appended to `conflicts`; the returned value
/// holds the target's value at each of them.
pub fn merge_value(
    base: Option<&Value>,
    source: Option<&Value>,
    target: Option<&Value>,
    path: &FieldPath,
    mode: MergeMode,
    conflicts: &mut Vec<FieldConflict>,
) -> Option<Value> {
    if source == target {
        return source.cloned();
    }
    if source == base {
        return target.cloned();
    }
    if target == base {
        return source.cloned();
    }

    let recurse = base.is_some() || mode == MergeMode::UnionAdditions;
    if recurse {
        if let (Some(Value::Object(s)), Some(Value::Object(t))) = (source, target) {
            match base {
                None => return Some(merge_objects(None, s, t, path, mode, conflicts)),
                Some(Value::Object(b)) => {
                    return Some(merge_objects(Some(b), s, t, path, mode, conflicts))
                }
                Some(_) => {}
            }
        }
        if let (Some(s), Some(t)) = (source.and_then(named_elements), target.and_then(named_elements)) {
            match base.map(named_elements) {
                None => return Some(merge_named_arrays(None, &s, &t, path, mode, conflicts)),
                Some(Some(b)) => {
                    return Some(merge_named_arrays(Some(b.as_slice()), &s, &t, path, mode, conflicts))
                }
                Some(None) => {}
            }
        }
    }

    conflicts.push(FieldConflict {
        path: path.clone(),
        base: base.cloned(),
        source: source.cloned(),
        target: target.cloned(),
    });
    target.cloned()
}

fn merge_objects(
    base: Option<&Map<String, Value>>,
    source: &Map<String, Value>,
    target: &Map<String, Value>,
    path: &FieldPath,
    mode: MergeMode,
    conflicts: &mut Vec<FieldConflict>,
) -> Value {
    let mut keys: BTreeSet<&String> = source.keys().chain(target.keys()).collect();
    if let Some(b) = base {
        keys.extend(b.keys());
    }

    let mut merged = Map::new();
    for key in keys {
        let value = merge_value(
            base.and_then(|b| b.get(key)),
            source.get(key),
            target.get(key),
            &path.field(key.as_str()),
            mode,
            conflicts,
        );
        if let Some(value) = value {
            merged.insert(key.clone(), value);
        }
    }
    Value::Object(merged)
}

/// Elements of an array whose items are all objects with a unique string
/// `name`, in array order.
fn named_elements(value: &Value) -> Option<Vec<(&str, &Value)>> {
    let items = value.as_array()?;
    let mut seen = HashSet::new();
    let mut elements = Vec::with_capacity(items.len());
    for item in items {
        let name = item.as_object()?.get("name")?.as_str()?;
        if !seen.insert(name) {
            return None;
        }
        elements.push((name, item));
    }
    Some(elements)
}

fn lookup<'a>(elements: &[(&str, &'a Value)], name: &str) -> Option<&'a Value> {
    elements.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

fn merge_named_arrays(
    base: Option<&[(&str, &Value)]>,
    source: &[(&str, &Value)],
    target: &[(&str, &Value)],
    path: &FieldPath,
    mode: MergeMode,
    conflicts: &mut Vec<FieldConflict>,
) -> Value {
    let base_names: Vec<&str> = base.map(|b| b.iter().map(|(n, _)| *n).collect()).unwrap_or_default();
    let added: BTreeSet<&str> = source
        .iter()
        .chain(target.iter())
        .map(|(n, _)| *n)
        .filter(|n| !base_names.contains(n))
        .collect();

    let mut merged = Vec::new();
    for name in base_names.iter().copied().chain(added) {
        let value = merge_value(
            base.and_then(|b| lookup(b, name)),
            lookup(source, name),
            lookup(target, name),
            &path.element(name),
            mode,
            conflicts,
        );
        if let Some(value) = value {
            merged.push(value);
        }
    }
    Value::Array(merged)
}

/// The outcome of merging three snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMerge {
    pub merged: Snapshot,
    /// Sorted by signature.
    pub conflicts: Vec<Conflict>,
}

impl SnapshotMerge {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Every resource identity involved in a conflict, rename targets
    /// included.
    pub fn conflicted_keys(&self) -> BTreeSet<ResourceKey> {
        let mut keys = BTreeSet::new();
        for conflict in &self.conflicts {
            keys.insert(conflict.resource.clone());
            if conflict.conflict_type == ConflictType::RenameRename {
                for value in [&conflict.source_value, &conflict.target_value].into_iter().flatten() {
                    if let Ok(key) = serde_json::from_value::<ResourceKey>(value.clone()) {
                        keys.insert(key);
                    }
                }
            }
        }
        keys
    }
}

fn value_of(snapshot: &Snapshot, key: &ResourceKey) -> Option<Value> {
    snapshot.get(key).and_then(|r| r.to_value().ok())
}

fn take(merged: &mut Snapshot, from: &Snapshot, key: &ResourceKey) {
    if let Some(resource) = from.get(key) {
        merged.insert(resource.clone());
    }
}

fn key_value(key: &ResourceKey) -> Option<Value> {
    serde_json::to_value(key).ok()
}

/// Merge `source` and `target`, both descended from `base`.
pub fn merge_snapshots(base: &Snapshot, source: &Snapshot, target: &Snapshot) -> SnapshotMerge {
    let source_changes = diff_snapshots(base, source);
    let target_changes = diff_snapshots(base, target);

    let mut merged = Snapshot::new();
    let mut conflicts = Vec::new();
    let mut handled: BTreeSet<ResourceKey> = BTreeSet::new();

    // The same base resource renamed to two different identities. A rename on
    // one side only falls through to the per-key pass: the old identity is a
    // deletion there, so an edit on the other side surfaces as MODIFY_DELETE.
    for (from, source_rename) in &source_changes.renamed {
        let Some(target_rename) = target_changes.renamed.get(from) else {
            continue;
        };
        if target_rename.to == source_rename.to {
            continue;
        }
        conflicts.push(Conflict::new(
            ConflictType::RenameRename,
            from.clone(),
            FieldPath::root(),
            value_of(base, from),
            key_value(&source_rename.to),
            key_value(&target_rename.to),
        ));
        take(&mut merged, target, &target_rename.to);
        take(&mut merged, target, &source_rename.to);
        handled.insert(from.clone());
        handled.insert(source_rename.to.clone());
        handled.insert(target_rename.to.clone());
    }

    let keys: BTreeSet<&ResourceKey> = base.keys().chain(source.keys()).chain(target.keys()).collect();
    for key in keys {
        if handled.contains(key) {
            continue;
        }
        let b = value_of(base, key);
        let s = value_of(source, key);
        let t = value_of(target, key);

        if s == t || s == b {
            take(&mut merged, target, key);
            continue;
        }
        if t == b {
            take(&mut merged, source, key);
            continue;
        }

        match (b.is_some(), s.is_some(), t.is_some()) {
            (true, true, true) => {
                let mut field_conflicts = Vec::new();
                let value = merge_value(
                    b.as_ref(),
                    s.as_ref(),
                    t.as_ref(),
                    &FieldPath::root(),
                    MergeMode::Strict,
                    &mut field_conflicts,
                );
                match value.map(SchemaResource::from_value) {
                    Some(Ok(resource)) if &resource.key() == key => {
                        merged.insert(resource);
                        conflicts.extend(
                            field_conflicts
                                .into_iter()
                                .map(|c| c.into_conflict(key.clone())),
                        );
                    }
                    _ => {
                        conflicts.push(Conflict::new(
                            ConflictType::ModifyModify,
                            key.clone(),
                            FieldPath::root(),
                            b,
                            s,
                            t,
                        ));
                        take(&mut merged, target, key);
                    }
                }
            }
            _ => {
                conflicts.push(Conflict::new(
                    classify(b.as_ref(), s.as_ref(), t.as_ref()),
                    key.clone(),
                    FieldPath::root(),
                    b,
                    s,
                    t,
                ));
                take(&mut merged, target, key);
            }
        }
    }

    conflicts.sort_by(|a, b| a.signature().cmp(&b.signature()));
    SnapshotMerge { merged, conflicts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontovc_types::{ObjectTypeDef, PropertyDef};
    use proptest::prelude::*;
    use serde_json::json;

    fn product(properties: &[(&str, &str)]) -> SchemaResource {
        let mut def = ObjectTypeDef::new("Product");
        for (name, data_type) in properties {
            def = def.with_property(PropertyDef::new(*name, *data_type));
        }
        SchemaResource::ObjectType(def)
    }

    fn snapshot(resources: &[SchemaResource]) -> Snapshot {
        resources.iter().cloned().collect()
    }

    fn merge(b: &Value, s: &Value, t: &Value) -> (Option<Value>, Vec<FieldConflict>) {
        let mut conflicts = Vec::new();
        let merged = merge_value(
            Some(b),
            Some(s),
            Some(t),
            &FieldPath::root(),
            MergeMode::Strict,
            &mut conflicts,
        );
        (merged, conflicts)
    }

    #[test]
    fn one_sided_change_wins() {
        let (merged, conflicts) = merge(&json!({"a": 1}), &json!({"a": 2}), &json!({"a": 1}));
        assert_eq!(merged, Some(json!({"a": 2})));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn disjoint_field_edits_merge() {
        let (merged, conflicts) = merge(
            &json!({"a": 1, "b": 1}),
            &json!({"a": 2, "b": 1}),
            &json!({"a": 1, "b": 3}),
        );
        assert_eq!(merged, Some(json!({"a": 2, "b": 3})));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn overlapping_edit_conflicts_and_keeps_target() {
        let (merged, conflicts) = merge(&json!({"a": 1}), &json!({"a": 2}), &json!({"a": 3}));
        assert_eq!(merged, Some(json!({"a": 3})));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path.to_string(), "a");
        assert_eq!(conflicts[0].conflict_type(), ConflictType::ModifyModify);
    }

    #[test]
    fn named_array_insertions_merge_in_canonical_order() {
        let base = json!([{"name": "sku"}]);
        let source = json!([{"name": "sku"}, {"name": "weight"}]);
        let target = json!([{"name": "price"}, {"name": "sku"}]);
        let (merged, conflicts) = merge(&base, &source, &target);
        assert!(conflicts.is_empty());
        assert_eq!(
            merged,
            Some(json!([{"name": "sku"}, {"name": "price"}, {"name": "weight"}]))
        );
    }

    #[test]
    fn element_removed_on_one_side_and_edited_on_other() {
        let base = json!([{"name": "sku", "t": "string"}]);
        let source = json!([]);
        let target = json!([{"name": "sku", "t": "text"}]);
        let (_, conflicts) = merge(&base, &source, &target);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path.to_string(), "[sku]");
        assert_eq!(conflicts[0].conflict_type(), ConflictType::ModifyDelete);
    }

    #[test]
    fn union_mode_merges_independent_additions() {
        let mut conflicts = Vec::new();
        let merged = merge_value(
            None,
            Some(&json!({"name": "x", "a": 1})),
            Some(&json!({"name": "x", "b": 2})),
            &FieldPath::root(),
            MergeMode::UnionAdditions,
            &mut conflicts,
        );
        assert!(conflicts.is_empty());
        assert_eq!(merged, Some(json!({"name": "x", "a": 1, "b": 2})));
    }

    #[test]
    fn both_add_same_property_with_different_types() {
        let base = snapshot(&[product(&[("sku", "string")])]);
        let source = snapshot(&[product(&[("sku", "string"), ("price", "decimal")])]);
        let target = snapshot(&[product(&[("sku", "string"), ("price", "string")])]);

        let result = merge_snapshots(&base, &source, &target);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::AddAdd);
        assert_eq!(conflict.resource, ResourceKey::object_type("Product"));
        assert_eq!(conflict.path.to_string(), "properties[price]");
    }

    #[test]
    fn identical_changes_are_not_conflicts() {
        let base = snapshot(&[product(&[])]);
        let both = snapshot(&[product(&[("price", "decimal")])]);
        let result = merge_snapshots(&base, &both, &both);
        assert!(result.is_clean());
        assert_eq!(result.merged, both);
    }

    #[test]
    fn delete_against_modify_conflicts() {
        let base = snapshot(&[product(&[])]);
        let source = Snapshot::new();
        let target = snapshot(&[product(&[("price", "decimal")])]);
        let result = merge_snapshots(&base, &source, &target);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::ModifyDelete);
        assert!(result.merged.contains(&ResourceKey::object_type("Product")));
    }

    #[test]
    fn divergent_renames_conflict() {
        let prop = |name: &str| SchemaResource::Property(PropertyDef::new(name, "string"));
        let base = snapshot(&[prop("cost")]);
        let source = snapshot(&[prop("price")]);
        let target = snapshot(&[prop("amount")]);

        let result = merge_snapshots(&base, &source, &target);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::RenameRename);
        assert_eq!(conflict.resource, ResourceKey::property("cost"));
        assert!(result.merged.contains(&ResourceKey::property("amount")));
        assert!(!result.merged.contains(&ResourceKey::property("price")));
        assert_eq!(result.conflicted_keys().len(), 3);
    }

    #[test]
    fn rename_against_edit_is_modify_delete() {
        let mut kept = PropertyDef::new("legacy_code", "string");
        kept.description = Some("do not remove".into());
        let base = snapshot(&[SchemaResource::Property(PropertyDef::new("legacy_code", "string"))]);
        let source = snapshot(&[SchemaResource::Property(PropertyDef::new("nickname", "string"))]);
        let target = snapshot(&[SchemaResource::Property(kept.clone())]);

        let result = merge_snapshots(&base, &source, &target);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::ModifyDelete);
        assert_eq!(conflict.resource, ResourceKey::property("legacy_code"));
        assert!(conflict.path.is_root());
        assert_eq!(
            result.merged.get(&ResourceKey::property("legacy_code")),
            Some(&SchemaResource::Property(kept))
        );
        assert_eq!(
            result.merged.get(&ResourceKey::property("nickname")),
            Some(&SchemaResource::Property(PropertyDef::new("nickname", "string")))
        );

        let backward = merge_snapshots(&base, &target, &source);
        assert_eq!(backward.conflicts[0].signature(), conflict.signature());
    }

    #[test]
    fn one_sided_rename_is_taken() {
        let prop = |name: &str| SchemaResource::Property(PropertyDef::new(name, "string"));
        let base = snapshot(&[prop("cost")]);
        let source = snapshot(&[prop("price")]);
        let result = merge_snapshots(&base, &source, &base);
        assert!(result.is_clean());
        assert_eq!(result.merged, source);
    }

    fn property_snapshot() -> impl Strategy<Value = Snapshot> {
        prop::collection::btree_map(
            prop::sample::select(vec!["a", "b", "c", "d"]),
            (prop::sample::select(vec!["string", "integer"]), any::<bool>()),
            0..4,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(name, (data_type, required))| {
                    let mut def = PropertyDef::new(name, data_type);
                    def.required = required;
                    SchemaResource::Property(def)
                })
                .collect()
        })
    }

    fn property_list() -> impl Strategy<Value = Value> {
        prop::collection::btree_map(
            prop::sample::select(vec!["sku", "price", "weight", "color"]),
            prop::sample::select(vec!["string", "integer", "decimal"]),
            0..4,
        )
        .prop_map(|entries| {
            Value::Array(
                entries
                    .into_iter()
                    .map(|(name, t)| json!({"name": name, "data_type": t}))
                    .collect(),
            )
        })
    }

    proptest! {
        #[test]
        fn snapshot_merge_is_symmetric(
            base in property_snapshot(),
            source in property_snapshot(),
            target in property_snapshot(),
        ) {
            let forward = merge_snapshots(&base, &source, &target);
            let backward = merge_snapshots(&base, &target, &source);

            let sigs = |m: &SnapshotMerge| {
                m.conflicts.iter().map(|c| c.signature()).collect::<Vec<_>>()
            };
            prop_assert_eq!(sigs(&forward), sigs(&backward));

            let conflicted = forward.conflicted_keys();
            prop_assert_eq!(&conflicted, &backward.conflicted_keys());

            let keys: BTreeSet<&ResourceKey> =
                base.keys().chain(source.keys()).chain(target.keys()).collect();
            for key in keys {
                if !conflicted.contains(key) {
                    prop_assert_eq!(forward.merged.get(key), backward.merged.get(key));
                }
            }
        }

        #[test]
        fn named_array_merge_is_symmetric(
            base in property_list(),
            source in property_list(),
            target in property_list(),
        ) {
            let (forward, fc) = merge(&base, &source, &target);
            let (backward, bc) = merge(&base, &target, &source);

            let paths = |c: &[FieldConflict]| c.iter().map(|f| f.path.clone()).collect::<BTreeSet<_>>();
            prop_assert_eq!(paths(&fc), paths(&bc));
            if fc.is_empty() {
                prop_assert_eq!(forward, backward);
            }
        }
    }
}
