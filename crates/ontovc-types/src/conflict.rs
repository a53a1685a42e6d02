use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::ResourceKey;

/// Classification of a structural conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Both sides changed the same resource (or field) to different values.
    ModifyModify,
    /// One side deleted a resource the other side modified.
    ModifyDelete,
    /// Both sides independently added the same identity with different content.
    AddAdd,
    /// Both sides renamed the same base resource to different identities.
    RenameRename,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ModifyModify => "MODIFY_MODIFY",
            Self::ModifyDelete => "MODIFY_DELETE",
            Self::AddAdd => "ADD_ADD",
            Self::RenameRename => "RENAME_RENAME",
        };
        f.write_str(s)
    }
}

/// One step of a path into a resource's JSON form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathSegment {
    /// An object field.
    Field(String),
    /// An element of a named-object array, addressed by its `name`.
    Element(String),
}

/// A path to a field inside a resource. The empty path is the whole resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// The whole-resource path.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// A new path extended by an object field.
    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.0.push(PathSegment::Field(name.into()));
        next
    }

    /// A new path extended by a named array element.
    pub fn element(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.0.push(PathSegment::Element(name.into()));
        next
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            match segment {
                PathSegment::Field(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Element(name) => write!(f, "[{name}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// A structural disagreement between two branches' changes to the same
/// resource relative to their common ancestor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_type: ConflictType,
    /// The affected resource (for renames: the base identity).
    pub resource: ResourceKey,
    /// Position inside the resource; root for whole-resource conflicts.
    #[serde(default, skip_serializing_if = "FieldPath::is_root")]
    pub path: FieldPath,
    #[serde(default)]
    pub base_value: Option<Value>,
    pub source_value: Option<Value>,
    pub target_value: Option<Value>,
}

impl Conflict {
    pub fn new(
        conflict_type: ConflictType,
        resource: ResourceKey,
        path: FieldPath,
        base_value: Option<Value>,
        source_value: Option<Value>,
        target_value: Option<Value>,
    ) -> Self {
        Self {
            conflict_type,
            resource,
            path,
            base_value,
            source_value,
            target_value,
        }
    }

    /// Direction-independent identity of this conflict.
    ///
    /// Swapping the source and target of a merge produces conflicts with the
    /// same signatures.
    pub fn signature(&self) -> (ConflictType, ResourceKey, FieldPath) {
        (self.conflict_type, self.resource.clone(), self.path.clone())
    }

    /// The same conflict seen from the opposite merge direction.
    pub fn swapped(&self) -> Self {
        Self {
            source_value: self.target_value.clone(),
            target_value: self.source_value.clone(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_root() {
            write!(f, "{} on {}", self.conflict_type, self.resource)
        } else {
            write!(f, "{} on {} at {}", self.conflict_type, self.resource, self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_display() {
        let path = FieldPath::root()
            .field("properties")
            .element("price")
            .field("data_type");
        assert_eq!(path.to_string(), "properties[price].data_type");
        assert_eq!(FieldPath::root().to_string(), "");
    }

    #[test]
    fn signature_ignores_direction() {
        let conflict = Conflict::new(
            ConflictType::ModifyModify,
            ResourceKey::object_type("Product"),
            FieldPath::root().field("description"),
            Some(json!("base")),
            Some(json!("ours")),
            Some(json!("theirs")),
        );
        let swapped = conflict.swapped();
        assert_eq!(swapped.source_value, Some(json!("theirs")));
        assert_eq!(conflict.signature(), swapped.signature());
    }

    #[test]
    fn display_includes_path_when_present() {
        let conflict = Conflict::new(
            ConflictType::AddAdd,
            ResourceKey::property("price"),
            FieldPath::root(),
            None,
            Some(json!(1)),
            Some(json!(2)),
        );
        assert_eq!(conflict.to_string(), "ADD_ADD on Property:price");
    }
}
