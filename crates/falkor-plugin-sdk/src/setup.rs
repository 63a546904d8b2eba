use std::net::SocketAddr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PluginError, Result};

pub const DEFAULT_SETUP_PATH: &str = "/setup.json";

/// Identity and capabilities a plugin advertises to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SetupDescriptor {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub logo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_path: Option<String>,
    #[serde(default)]
    pub multiple_choice: bool,
}

impl SetupDescriptor {
    /// Checks the identifier shape (two or three dot-separated segments), the
    /// semantic version, and that the display fields are filled in.
    pub fn validate(&self) -> Result<()> {
        let segments: Vec<&str> = self.id.split('.').collect();
        if !(2..=3).contains(&segments.len()) || segments.iter().any(|s| s.trim().is_empty()) {
            return Err(PluginError::InvalidSetup(format!(
                "id `{}` must have two or three non-empty dot-separated segments",
                self.id
            )));
        }
        semver::Version::parse(&self.version).map_err(|err| {
            PluginError::InvalidSetup(format!("version `{}` is not semver: {err}", self.version))
        })?;
        for (field, value) in [
            ("name", &self.name),
            ("description", &self.description),
            ("logo", &self.logo),
        ] {
            if value.trim().is_empty() {
                return Err(PluginError::InvalidSetup(format!("{field} must not be empty")));
            }
        }
        if let Some(path) = &self.setup_path {
            if !path.starts_with('/') {
                return Err(PluginError::InvalidSetup(format!(
                    "setup_path `{path}` must start with `/`"
                )));
            }
        }
        Ok(())
    }

    /// Fills `api_url` from the bound address when it was left empty, and
    /// defaults `setup_path`.
    pub fn backfilled(&self, bound: SocketAddr) -> Self {
        let mut finalized = self.clone();
        if finalized.api_url.as_deref().map_or(true, |url| url.trim().is_empty()) {
            finalized.api_url = Some(base_url(bound));
        }
        if finalized.setup_path.is_none() {
            finalized.setup_path = Some(DEFAULT_SETUP_PATH.to_string());
        }
        finalized
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or_default()
    }
}

/// `http://host:port` for a bound socket; wildcard addresses are reported as
/// `localhost`.
pub fn base_url(addr: SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{addr}")
    }
}

/// The `config` member of a setup response. Serialized as JSON `false` when no
/// filters were requested, otherwise `{ "search": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SetupConfig {
    #[default]
    Disabled,
    Search(Vec<String>),
}

impl SetupConfig {
    pub fn from_filters(filters: Option<Vec<String>>) -> Self {
        filters.map_or(SetupConfig::Disabled, SetupConfig::Search)
    }
}

#[derive(Serialize, Deserialize)]
struct SearchConfig {
    search: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConfig {
    Flag(bool),
    Search(SearchConfig),
}

impl Serialize for SetupConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SetupConfig::Disabled => serializer.serialize_bool(false),
            SetupConfig::Search(search) => SearchConfig {
                search: search.clone(),
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SetupConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawConfig::deserialize(deserializer)? {
            RawConfig::Flag(false) => Ok(SetupConfig::Disabled),
            RawConfig::Flag(true) => Err(de::Error::custom(
                "config must be `false` or an object with a `search` list",
            )),
            RawConfig::Search(config) => Ok(SetupConfig::Search(config.search)),
        }
    }
}

/// Body of `GET /setup.json`: the descriptor plus the negotiated `config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupResponse {
    #[serde(flatten)]
    pub descriptor: SetupDescriptor,
    pub config: SetupConfig,
}
