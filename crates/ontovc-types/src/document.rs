use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw document as held by the backing store.
///
/// The store never interprets document bodies. Schema resources, branch
/// metadata and change proposals are all documents distinguished by
/// `doc_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Store-unique identifier, conventionally `"{doc_type}/{name}"`.
    pub id: String,
    /// The document class (e.g. `"ObjectType"`, `"BranchMetadata"`).
    pub doc_type: String,
    /// The JSON body.
    pub body: Value,
}

impl Document {
    /// Create a document.
    pub fn new(id: impl Into<String>, doc_type: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            doc_type: doc_type.into(),
            body,
        }
    }

    /// Build a document by serializing `value` as its body.
    pub fn from_serializable<T: Serialize>(
        id: impl Into<String>,
        doc_type: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(id, doc_type, serde_json::to_value(value)?))
    }

    /// Deserialize the body into `T`.
    pub fn parse_body<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}
