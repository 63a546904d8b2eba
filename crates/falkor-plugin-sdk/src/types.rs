use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the host should fetch the links in a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Ddl,
    Magnet,
    Torrent,
}

/// One hit returned from `GET /search/:os/:query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SearchResult {
    pub name: String,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Set when the host must call `/return/:returned` with the uri to
    /// resolve the final links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<SourceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_choice: Option<bool>,
    /// Plugin-specific members, passed through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchResult {
    pub fn new(name: impl Into<String>, kind: SourceKind, uris: Vec<String>) -> Self {
        Self {
            name: name.into(),
            uris,
            kind,
            ..Self::default()
        }
    }
}
