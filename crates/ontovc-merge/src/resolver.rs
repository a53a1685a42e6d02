//! Conflict detection and policy-driven resolution.
//!
//! [`detect_conflicts`] classifies the overlapping changes recorded in a
//! [`BranchDiff`]. [`resolve_conflicts`] applies a declared
//! [`ConflictPolicy`] and splits the conflicts into resolved and residual; a
//! non-empty residual blocks the merge. [`apply_resolutions`] writes the
//! chosen values into a merged snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use ontovc_diff::{BranchDiff, ChangeSet};
use ontovc_types::{
    Conflict, ConflictType, PathSegment, ResourceKey, ResourceKind, SchemaResource,
    Snapshot,
};

use crate::error::MergeError;
use crate::three_way::{merge_snapshots, merge_value, MergeMode};

/// A named strategy for clearing conflicts automatically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Take the source branch's value.
    PreferSource,
    /// Take the target branch's value.
    PreferTarget,
    /// Combine independent additions field by field; overlapping differences
    /// stay unresolved.
    FieldUnion,
    /// Resolve nothing.
    #[default]
    Manual,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PreferSource => "prefer_source",
            Self::PreferTarget => "prefer_target",
            Self::FieldUnion => "field_union",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "prefer_source" => Ok(Self::PreferSource),
            "prefer_target" => Ok(Self::PreferTarget),
            "field_union" => Ok(Self::FieldUnion),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown resolution strategy: {other}")),
        }
    }
}

/// Which resolution strategy applies to which resource kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    #[serde(default)]
    pub default: ResolutionStrategy,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<ResourceKind, ResolutionStrategy>,
}

impl ConflictPolicy {
    /// A policy applying `strategy` to every kind.
    pub fn uniform(strategy: ResolutionStrategy) -> Self {
        Self {
            default: strategy,
            overrides: BTreeMap::new(),
        }
    }

    /// Resolve nothing.
    pub fn manual() -> Self {
        Self::uniform(ResolutionStrategy::Manual)
    }

    pub fn with_override(mut self, kind: ResourceKind, strategy: ResolutionStrategy) -> Self {
        self.overrides.insert(kind, strategy);
        self
    }

    pub fn strategy_for(&self, kind: ResourceKind) -> ResolutionStrategy {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

/// A conflict cleared by a strategy, with the value chosen at its position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub conflict: Conflict,
    pub strategy: ResolutionStrategy,
    /// `None` means the position ends up absent.
    pub value: Option<Value>,
}

/// Conflicts split by whether the policy cleared them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub resolved: Vec<Resolution>,
    pub residual: Vec<Conflict>,
}

impl ResolutionOutcome {
    /// Returns `true` if nothing blocks the merge.
    pub fn is_complete(&self) -> bool {
        self.residual.is_empty()
    }
}

/// Rebuild the touched part of the base, source and target snapshots from
/// the diff's change sets.
fn partial_snapshots(diff: &BranchDiff) -> (Snapshot, Snapshot, Snapshot) {
    let mut base = Snapshot::new();
    for changes in [&diff.source_changes, &diff.target_changes] {
        for resource in changes.deleted.values() {
            base.insert(resource.clone());
        }
        for modification in changes.modified.values() {
            base.insert(modification.before.clone());
        }
        for rename in changes.renamed.values() {
            base.insert(rename.before.clone());
        }
    }

    let apply = |changes: &ChangeSet| {
        let mut side = base.clone();
        for key in changes.deleted.keys() {
            side.remove(key);
        }
        for resource in changes.added.values() {
            side.insert(resource.clone());
        }
        for modification in changes.modified.values() {
            side.insert(modification.after.clone());
        }
        for (from, rename) in &changes.renamed {
            side.remove(from);
            side.insert(rename.after.clone());
        }
        side
    };

    let source = apply(&diff.source_changes);
    let target = apply(&diff.target_changes);
    (base, source, target)
}

/// Classify the overlapping changes of a branch diff.
///
/// A resource changed on one side only is never a conflict, and neither is
/// the same change made on both sides.
pub fn detect_conflicts(diff: &BranchDiff) -> Vec<Conflict> {
    let (base, source, target) = partial_snapshots(diff);
    let conflicts = merge_snapshots(&base, &source, &target).conflicts;
    debug!(
        source = %diff.source_branch,
        target = %diff.target_branch,
        count = conflicts.len(),
        "detected conflicts"
    );
    conflicts
}

fn resolve_one(conflict: &Conflict, strategy: ResolutionStrategy) -> Option<Option<Value>> {
    match strategy {
        ResolutionStrategy::Manual => None,
        ResolutionStrategy::PreferSource => Some(conflict.source_value.clone()),
        ResolutionStrategy::PreferTarget => Some(conflict.target_value.clone()),
        ResolutionStrategy::FieldUnion => {
            if conflict.conflict_type != ConflictType::AddAdd {
                return None;
            }
            let mut nested = Vec::new();
            let merged = merge_value(
                None,
                conflict.source_value.as_ref(),
                conflict.target_value.as_ref(),
                &conflict.path,
                MergeMode::UnionAdditions,
                &mut nested,
            );
            nested.is_empty().then_some(merged)
        }
    }
}

/// Apply `policy` to `conflicts`.
pub fn resolve_conflicts(conflicts: Vec<Conflict>, policy: &ConflictPolicy) -> ResolutionOutcome {
    let mut outcome = ResolutionOutcome::default();
    for conflict in conflicts {
        let strategy = policy.strategy_for(conflict.resource.kind);
        match resolve_one(&conflict, strategy) {
            Some(value) => {
                debug!(%conflict, %strategy, "resolved conflict");
                outcome.resolved.push(Resolution {
                    conflict,
                    strategy,
                    value,
                });
            }
            None => outcome.residual.push(conflict),
        }
    }
    if !outcome.resolved.is_empty() {
        info!(
            resolved = outcome.resolved.len(),
            residual = outcome.residual.len(),
            "applied conflict policy"
        );
    }
    outcome
}

/// Write `value` at `segments` inside `root`. Returns `false` if the path
/// does not lead anywhere.
fn set_at_path(root: &mut Value, segments: &[PathSegment], value: Option<Value>) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };

    match (first, root) {
        (PathSegment::Field(name), Value::Object(map)) => {
            if rest.is_empty() {
                match value {
                    Some(v) => {
                        map.insert(name.clone(), v);
                    }
                    None => {
                        map.remove(name);
                    }
                }
                return true;
            }
            map.get_mut(name)
                .is_some_and(|child| set_at_path(child, rest, value))
        }
        (PathSegment::Element(name), Value::Array(items)) => {
            let position = items
                .iter()
                .position(|item| item.get("name").and_then(Value::as_str) == Some(name.as_str()));
            if rest.is_empty() {
                match (position, value) {
                    (Some(i), Some(v)) => items[i] = v,
                    (Some(i), None) => {
                        items.remove(i);
                    }
                    (None, Some(v)) => items.push(v),
                    (None, None) => {}
                }
                return true;
            }
            position.is_some_and(|i| set_at_path(&mut items[i], rest, value))
        }
        _ => false,
    }
}

fn decode(value: Value, key: &ResourceKey) -> Result<SchemaResource, MergeError> {
    let resource = SchemaResource::from_value(value)?;
    if &resource.key() != key {
        return Err(MergeError::InvalidResolution(format!(
            "resolved value for {key} has identity {}",
            resource.key()
        )));
    }
    Ok(resource)
}

/// Write resolved values into `merged`.
///
/// `merged` must hold the target's side at every conflicting position, as
/// produced by [`merge_snapshots`]. `source` supplies the resource body when
/// a rename conflict is settled in its favour.
pub fn apply_resolutions(
    merged: &mut Snapshot,
    source: &Snapshot,
    resolutions: &[Resolution],
) -> Result<(), MergeError> {
    for resolution in resolutions {
        let conflict = &resolution.conflict;
        let key = &conflict.resource;

        if conflict.conflict_type == ConflictType::RenameRename {
            let parse = |v: &Option<Value>| {
                v.clone()
                    .and_then(|v| serde_json::from_value::<ResourceKey>(v).ok())
            };
            let (Some(source_key), Some(target_key)) =
                (parse(&conflict.source_value), parse(&conflict.target_value))
            else {
                return Err(MergeError::InvalidResolution(format!(
                    "rename conflict on {key} lacks identities"
                )));
            };
            match parse(&resolution.value) {
                Some(chosen) if chosen == source_key => {
                    merged.remove(&target_key);
                    if let Some(resource) = source.get(&source_key) {
                        merged.insert(resource.clone());
                    }
                }
                Some(chosen) if chosen == target_key => {}
                _ => {
                    return Err(MergeError::InvalidResolution(format!(
                        "rename conflict on {key} resolved to an unknown identity"
                    )))
                }
            }
            continue;
        }

        if conflict.path.is_root() {
            match &resolution.value {
                Some(value) => {
                    merged.insert(decode(value.clone(), key)?);
                }
                None => {
                    merged.remove(key);
                }
            }
            continue;
        }

        let Some(current) = merged.get(key) else {
            return Err(MergeError::InvalidResolution(format!(
                "resolved field {} of {key} but the resource is absent",
                conflict.path
            )));
        };
        let mut body = current.to_value()?;
        if !set_at_path(&mut body, conflict.path.segments(), resolution.value.clone()) {
            return Err(MergeError::InvalidResolution(format!(
                "path {} does not exist in {key}",
                conflict.path
            )));
        }
        merged.insert(decode(body, key)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::three_way::merge_snapshots;
    use ontovc_diff::diff_snapshots;
    use ontovc_types::{CommitHash, FieldPath, ObjectTypeDef, PropertyDef};

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

    fn diff_of(base: &Snapshot, source: &Snapshot, target: &Snapshot) -> BranchDiff {
        let direct = diff_snapshots(target, source);
        BranchDiff {
            source_branch: "feature".into(),
            target_branch: "main".into(),
            source_head: CommitHash::digest(b"s"),
            target_head: CommitHash::digest(b"t"),
            merge_base: Some(CommitHash::digest(b"b")),
            added: direct.added_keys(),
            modified: direct.modified_keys(),
            deleted: direct.deleted_keys(),
            renamed: direct.renamed_pairs(),
            source_changes: diff_snapshots(base, source),
            target_changes: diff_snapshots(base, target),
            conflicts: Vec::new(),
        }
    }

    #[test]
    fn one_sided_changes_never_conflict() {
        let base = snapshot(&[product(&[])]);
        let source = snapshot(&[product(&[("price", "decimal")])]);
        assert!(detect_conflicts(&diff_of(&base, &source, &base)).is_empty());
    }

    #[test]
    fn detects_property_type_clash() {
        let base = snapshot(&[product(&[])]);
        let source = snapshot(&[product(&[("price", "decimal")])]);
        let target = snapshot(&[product(&[("price", "string")])]);
        let conflicts = detect_conflicts(&diff_of(&base, &source, &target));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resource, ResourceKey::object_type("Product"));
    }

    #[test]
    fn unrelated_untouched_resources_do_not_matter() {
        let other = SchemaResource::Property(PropertyDef::new("sku", "string"));
        let base = snapshot(&[product(&[]), other.clone()]);
        let source = snapshot(&[product(&[("a", "string")]), other.clone()]);
        let target = snapshot(&[product(&[("b", "string")]), other]);
        assert!(detect_conflicts(&diff_of(&base, &source, &target)).is_empty());
    }

    #[test]
    fn manual_policy_leaves_everything() {
        let conflict = Conflict::new(
            ConflictType::ModifyModify,
            ResourceKey::object_type("Product"),
            FieldPath::root().field("description"),
            None,
            Some(Value::from("a")),
            Some(Value::from("b")),
        );
        let outcome = resolve_conflicts(vec![conflict], &ConflictPolicy::manual());
        assert!(!outcome.is_complete());
        assert!(outcome.resolved.is_empty());
    }

    #[test]
    fn per_kind_override_applies() {
        let policy = ConflictPolicy::manual()
            .with_override(ResourceKind::Property, ResolutionStrategy::PreferSource);
        let conflicts = vec![
            Conflict::new(
                ConflictType::AddAdd,
                ResourceKey::property("price"),
                FieldPath::root(),
                None,
                Some(Value::from(1)),
                Some(Value::from(2)),
            ),
            Conflict::new(
                ConflictType::AddAdd,
                ResourceKey::object_type("Product"),
                FieldPath::root(),
                None,
                Some(Value::from(1)),
                Some(Value::from(2)),
            ),
        ];
        let outcome = resolve_conflicts(conflicts, &policy);
        assert_eq!(outcome.resolved.len(), 1);
        assert_eq!(outcome.resolved[0].value, Some(Value::from(1)));
        assert_eq!(outcome.residual.len(), 1);
    }

    #[test]
    fn prefer_source_applies_field_value() {
        let base = snapshot(&[product(&[])]);
        let source = snapshot(&[product(&[("price", "decimal")])]);
        let target = snapshot(&[product(&[("price", "string")])]);

        let mut result = merge_snapshots(&base, &source, &target);
        let outcome = resolve_conflicts(
            result.conflicts.clone(),
            &ConflictPolicy::uniform(ResolutionStrategy::PreferSource),
        );
        assert!(outcome.is_complete());
        apply_resolutions(&mut result.merged, &source, &outcome.resolved).unwrap();
        assert_eq!(result.merged, source);
    }

    #[test]
    fn field_union_merges_independent_additions() {
        let mut ours = PropertyDef::new("price", "decimal");
        ours.description = Some("unit price".into());
        let mut theirs = PropertyDef::new("price", "decimal");
        theirs.extensions.insert("x-unit".into(), Value::from("EUR"));

        let base = Snapshot::new();
        let source = snapshot(&[SchemaResource::Property(ours)]);
        let target = snapshot(&[SchemaResource::Property(theirs)]);

        let mut result = merge_snapshots(&base, &source, &target);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::AddAdd);
        let outcome = resolve_conflicts(
            result.conflicts.clone(),
            &ConflictPolicy::uniform(ResolutionStrategy::FieldUnion),
        );
        assert!(outcome.is_complete());
        apply_resolutions(&mut result.merged, &source, &outcome.resolved).unwrap();

        let SchemaResource::Property(merged) =
            result.merged.get(&ResourceKey::property("price")).unwrap()
        else {
            panic!("expected a property");
        };
        assert_eq!(merged.description.as_deref(), Some("unit price"));
        assert_eq!(merged.extensions.get("x-unit"), Some(&Value::from("EUR")));
    }

    #[test]
    fn field_union_leaves_overlapping_additions() {
        let base = Snapshot::new();
        let source = snapshot(&[SchemaResource::Property(PropertyDef::new("price", "decimal"))]);
        let target = snapshot(&[SchemaResource::Property(PropertyDef::new("price", "string"))]);
        let result = merge_snapshots(&base, &source, &target);
        let outcome = resolve_conflicts(
            result.conflicts,
            &ConflictPolicy::uniform(ResolutionStrategy::FieldUnion),
        );
        assert_eq!(outcome.residual.len(), 1);
    }

    #[test]
    fn prefer_source_settles_rename_conflict() {
        let prop = |name: &str| SchemaResource::Property(PropertyDef::new(name, "string"));
        let base = snapshot(&[prop("cost")]);
        let source = snapshot(&[prop("price")]);
        let target = snapshot(&[prop("amount")]);

        let mut result = merge_snapshots(&base, &source, &target);
        let outcome = resolve_conflicts(
            result.conflicts.clone(),
            &ConflictPolicy::uniform(ResolutionStrategy::PreferSource),
        );
        apply_resolutions(&mut result.merged, &source, &outcome.resolved).unwrap();
        assert_eq!(result.merged, source);
    }

    #[test]
    fn set_at_path_reaches_named_elements() {
        let mut value = serde_json::json!({"properties": [{"name": "price", "data_type": "string"}]});
        let path = FieldPath::root().field("properties").element("price").field("data_type");
        assert!(set_at_path(&mut value, path.segments(), Some(Value::from("decimal"))));
        assert_eq!(value["properties"][0]["data_type"], Value::from("decimal"));
    }

    #[test]
    fn strategy_parse() {
        assert_eq!("prefer-source".parse::<ResolutionStrategy>(), Ok(ResolutionStrategy::PreferSource));
        assert_eq!("FIELD_UNION".parse::<ResolutionStrategy>(), Ok(ResolutionStrategy::FieldUnion));
        assert!("coin_flip".parse::<ResolutionStrategy>().is_err());
    }
}
