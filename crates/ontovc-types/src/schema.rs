//! Typed schema model.
//!
//! Schema documents are tagged variants per resource kind rather than untyped
//! maps. Each variant carries an `extensions` bag so that fields unknown to
//! this version survive a load/merge/store cycle unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::TypeError;

/// The kind of a schema resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    ObjectType,
    Property,
    LinkType,
}

impl ResourceKind {
    /// Every schema resource kind, in canonical order.
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::ObjectType,
        ResourceKind::Property,
        ResourceKind::LinkType,
    ];

    /// The store document type used for this kind.
    pub fn doc_type(&self) -> &'static str {
        match self {
            Self::ObjectType => "ObjectType",
            Self::Property => "Property",
            Self::LinkType => "LinkType",
        }
    }

    /// Map a store document type back to a resource kind.
    pub fn from_doc_type(doc_type: &str) -> Option<Self> {
        match doc_type {
            "ObjectType" => Some(Self::ObjectType),
            "Property" => Some(Self::Property),
            "LinkType" => Some(Self::LinkType),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.doc_type())
    }
}

/// Identity of a schema resource: its kind plus its name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn object_type(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::ObjectType, id)
    }

    pub fn property(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Property, id)
    }

    pub fn link_type(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::LinkType, id)
    }

    /// The store document id for this resource (`"{kind}/{id}"`).
    pub fn document_id(&self) -> String {
        format!("{}/{}", self.kind.doc_type(), self.id)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A property definition, either embedded in an object type or standalone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            required: false,
            description: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// An object type: a named entity class with a list of properties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTypeDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl ObjectTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            description: None,
            properties: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up an embedded property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Cardinality of a link type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// A link type: a directed relationship between two object types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTypeDef {
    pub name: String,
    pub source_type: String,
    pub target_type: String,
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl LinkTypeDef {
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
            cardinality,
            description: None,
            extensions: BTreeMap::new(),
        }
    }
}

/// A schema resource of any kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SchemaResource {
    ObjectType(ObjectTypeDef),
    Property(PropertyDef),
    LinkType(LinkTypeDef),
}

impl SchemaResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::ObjectType(_) => ResourceKind::ObjectType,
            Self::Property(_) => ResourceKind::Property,
            Self::LinkType(_) => ResourceKind::LinkType,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::ObjectType(def) => &def.name,
            Self::Property(def) => &def.name,
            Self::LinkType(def) => &def.name,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind(), self.name())
    }

    /// The resource as a JSON object (including the `kind` tag).
    pub fn to_value(&self) -> Result<Value, TypeError> {
        serde_json::to_value(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Rebuild a resource from its JSON form.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        serde_json::from_value(value).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// The JSON body with the `name` field removed.
    ///
    /// Two resources with equal bodies differ at most by name, which is how
    /// renames are recognized.
    pub fn body_without_name(&self) -> Result<Value, TypeError> {
        let mut value = self.to_value()?;
        if let Value::Object(map) = &mut value {
            map.remove("name");
        }
        Ok(value)
    }

    /// Encode as a store document.
    pub fn to_document(&self) -> Result<Document, TypeError> {
        Ok(Document::new(
            self.key().document_id(),
            self.kind().doc_type(),
            self.to_value()?,
        ))
    }

    /// Decode a store document.
    ///
    /// Returns `Ok(None)` for documents that are not schema resources.
    pub fn from_document(doc: &Document) -> Result<Option<Self>, TypeError> {
        let Some(kind) = ResourceKind::from_doc_type(&doc.doc_type) else {
            return Ok(None);
        };
        let mut body = doc.body.clone();
        if let Value::Object(map) = &mut body {
            map.insert("kind".into(), Value::String(kind.doc_type().into()));
        }
        Self::from_value(body).map(Some)
    }
}

/// A point-in-time view of every schema resource on a branch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    resources: BTreeMap<ResourceKey, SchemaResource>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from store documents, skipping non-schema documents.
    pub fn from_documents<'a, I>(documents: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut snapshot = Self::new();
        for doc in documents {
            if let Some(resource) = SchemaResource::from_document(doc)? {
                snapshot.insert(resource);
            }
        }
        Ok(snapshot)
    }

    /// Encode every resource as a store document, in key order.
    pub fn to_documents(&self) -> Result<Vec<Document>, TypeError> {
        self.resources.values().map(|r| r.to_document()).collect()
    }

    /// Insert a resource under its own key, returning the previous value.
    pub fn insert(&mut self, resource: SchemaResource) -> Option<SchemaResource> {
        self.resources.insert(resource.key(), resource)
    }

    pub fn remove(&mut self, key: &ResourceKey) -> Option<SchemaResource> {
        self.resources.remove(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&SchemaResource> {
        self.resources.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ResourceKey> {
        self.resources.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &SchemaResource)> {
        self.resources.iter()
    }
}

impl FromIterator<SchemaResource> for Snapshot {
    fn from_iter<T: IntoIterator<Item = SchemaResource>>(iter: T) -> Self {
        let mut snapshot = Snapshot::new();
        for resource in iter {
            snapshot.insert(resource);
        }
        snapshot
    }
}
