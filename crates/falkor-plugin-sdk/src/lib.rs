//! Build Falkor search plugins: describe the plugin, bind a search handler
//! and start serving the `/setup.json`, `/search` and `/return` routes.
//!
//! ```rust,ignore
//! use falkor_plugin_sdk::{create_plugin, CreatePluginOptions, Handlers, SearchResult, SourceKind};
//!
//! async fn search(os: String, query: String) -> anyhow::Result<Vec<SearchResult>> {
//!     Ok(vec![SearchResult::new(query, SourceKind::Ddl, vec![format!("https://dl/{os}")])])
//! }
//!
//! let running = create_plugin(CreatePluginOptions {
//!     setup: Some(setup),
//!     port: 3000,
//!     handlers: Some(Handlers::new(search)),
//!     ..Default::default()
//! })
//! .await?;
//! println!("{}", running.install_link());
//! ```

pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod factory;
pub mod handlers;
pub mod negotiation;
mod routes;
pub mod setup;
pub mod types;

pub use config::{CatalogEntry, PluginConfig, ServerSettings};
pub use console::install_link;
pub use controller::{Plugin, PluginOptions, PluginState, Port, RunningPlugin};
pub use error::PluginError;
pub use factory::{create_plugin, CreatePluginOptions};
pub use falkor_core::App;
pub use handlers::{HandlerRegistry, Handlers, ReturnHandler, SearchHandler, SetupHandler};
pub use negotiation::RouteMode;
pub use setup::{SetupConfig, SetupDescriptor, SetupResponse};
pub use types::{SearchResult, SourceKind};
