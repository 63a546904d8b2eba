use std::{collections::BTreeMap, net::IpAddr};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    controller::{PluginOptions, Port},
    negotiation::RouteMode,
    setup::SetupDescriptor,
    types::SearchResult,
};

/// Plugin file loaded by the CLI: the advertised descriptor, the server
/// settings and an optional static catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginConfig {
    pub setup: SetupDescriptor,
    pub server: ServerSettings,
    pub catalog: Vec<CatalogEntry>,
    /// `returned` token to resolved links, served on `/return/:returned`.
    pub returns: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: i64,
    pub host: String,
    pub debug: bool,
    pub route_mode: RouteMode,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".into(),
            debug: false,
            route_mode: RouteMode::Query,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub result: SearchResult,
    /// Operating systems the entry is offered for; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<String>,
}

impl PluginConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse plugin config as TOML")
    }

    /// Validates structural invariants and provides actionable error messages.
    pub fn validate(&self) -> Result<()> {
        self.setup.validate().context("invalid [setup] section")?;
        self.port()?;
        self.host()?;

        for (index, entry) in self.catalog.iter().enumerate() {
            if entry.result.name.trim().is_empty() {
                bail!("catalog entry #{index} must have a name");
            }
            if entry.result.uris.is_empty() {
                bail!("catalog entry `{}` must list at least one uri", entry.result.name);
            }
        }
        for (token, links) in &self.returns {
            if links.is_empty() {
                bail!("return token `{token}` must resolve to at least one link");
            }
        }
        Ok(())
    }

    pub fn port(&self) -> Result<Port> {
        Port::try_from(self.server.port).context("invalid [server] port")
    }

    pub fn host(&self) -> Result<IpAddr> {
        self.server
            .host
            .parse()
            .with_context(|| format!("invalid [server] host `{}`", self.server.host))
    }

    pub fn options(&self) -> Result<PluginOptions> {
        Ok(PluginOptions {
            debug: self.server.debug,
            host: self.host()?,
        })
    }
}
