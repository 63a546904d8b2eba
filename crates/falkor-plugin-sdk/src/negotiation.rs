//! Pure helpers that turn an incoming `/setup.json` request into the
//! advertised setup document.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::setup::{SetupConfig, SetupDescriptor, SetupResponse};

/// Separator between filter terms in the params-mode path segment. The raw
/// segment is split on this literal; it is never percent-decoded.
pub const PARAM_TERM_SEPARATOR: &str = "%20";

/// Where `/setup.json` filter terms travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    /// `GET /setup.json?search=a&search=b`
    #[default]
    Query,
    /// `GET /a%20b/setup.json`
    Params,
}

impl RouteMode {
    /// Path pattern of the setup route for this mode.
    pub fn setup_pattern(self) -> &'static str {
        match self {
            RouteMode::Query => "/setup.json",
            RouteMode::Params => "/:search/setup.json",
        }
    }
}

impl fmt::Display for RouteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMode::Query => f.write_str("query"),
            RouteMode::Params => f.write_str("params"),
        }
    }
}

impl FromStr for RouteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(RouteMode::Query),
            "params" => Ok(RouteMode::Params),
            other => Err(format!("unknown route mode `{other}` (expected query or params)")),
        }
    }
}

/// Filters from repeated `search` query parameters; `None` when the parameter
/// is absent.
pub fn query_filters(present: bool, values: Vec<String>) -> Option<Vec<String>> {
    present.then_some(values)
}

/// Filters from the raw params-mode segment.
pub fn param_filters(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|segment| {
        segment
            .split(PARAM_TERM_SEPARATOR)
            .map(str::to_string)
            .collect()
    })
}

/// Default negotiation: the descriptor plus `config`.
pub fn negotiate(descriptor: &SetupDescriptor, filters: Option<Vec<String>>) -> SetupResponse {
    SetupResponse {
        descriptor: descriptor.clone(),
        config: SetupConfig::from_filters(filters),
    }
}
