use std::{collections::BTreeMap, sync::Arc};

use anyhow::bail;
use falkor_plugin_sdk::{CatalogEntry, Handlers, PluginConfig, SearchResult};

/// Static search backend fed from the `[[catalog]]` and `[returns]` sections.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    returns: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    pub fn from_config(config: &PluginConfig) -> Self {
        Self {
            entries: config.catalog.clone(),
            returns: config.returns.clone(),
        }
    }

    /// Case-insensitive substring match on the name, restricted to entries
    /// offered for `os` (entries without an os list match every os).
    pub fn search(&self, os: &str, query: &str) -> Vec<SearchResult> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|entry| entry.os.is_empty() || entry.os.iter().any(|o| o.eq_ignore_ascii_case(os)))
            .filter(|entry| entry.result.name.to_lowercase().contains(&needle))
            .map(|entry| entry.result.clone())
            .collect()
    }

    pub fn resolve(&self, returned: &str) -> anyhow::Result<Vec<String>> {
        match self.returns.get(returned) {
            Some(links) => Ok(links.clone()),
            None => bail!("unknown return token `{returned}`"),
        }
    }

    /// Search always; `/return` only when the config declares return tokens.
    pub fn into_handlers(self) -> Handlers {
        let catalog = Arc::new(self);
        let search = {
            let catalog = catalog.clone();
            move |os: String, query: String| {
                let catalog = catalog.clone();
                async move {
                    let hits = catalog.search(&os, &query);
                    tracing::debug!(os = %os, query = %query, hits = hits.len(), "catalog search");
                    Ok::<_, anyhow::Error>(hits)
                }
            }
        };
        let handlers = Handlers::new(search);
        if catalog.returns.is_empty() {
            return handlers;
        }
        handlers.with_return(move |returned: String| {
            let catalog = catalog.clone();
            async move { catalog.resolve(&returned) }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use falkor_plugin_sdk::SourceKind;

    fn entry(name: &str, os: &[&str]) -> CatalogEntry {
        CatalogEntry {
            result: SearchResult::new(name, SourceKind::Ddl, vec![format!("https://dl/{name}")]),
            os: os.iter().map(|o| o.to_string()).collect(),
        }
    }

    fn catalog() -> Catalog {
        let mut config = PluginConfig::default();
        config.catalog = vec![
            entry("Halo Infinite", &["windows"]),
            entry("Halo Wars", &[]),
            entry("Celeste", &["linux", "windows"]),
        ];
        config
            .returns
            .insert("abc".into(), vec!["https://cdn/abc.zip".into()]);
        Catalog::from_config(&config)
    }

    fn names(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn matches_name_case_insensitively() {
        let hits = catalog().search("Windows", "halo");
        assert_eq!(names(&hits), vec!["Halo Infinite", "Halo Wars"]);
    }

    #[test]
    fn filters_by_operating_system() {
        let hits = catalog().search("linux", "halo");
        assert_eq!(names(&hits), vec!["Halo Wars"]);
        assert!(catalog().search("macos", "celeste").is_empty());
    }

    #[test]
    fn resolves_known_tokens_only() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("abc").unwrap(), vec!["https://cdn/abc.zip"]);
        assert!(catalog.resolve("nope").is_err());
    }

    #[tokio::test]
    async fn handlers_delegate_to_catalog() {
        let registry = falkor_plugin_sdk::HandlerRegistry::from(catalog().into_handlers());
        let hits = registry
            .search()
            .unwrap()
            .search("linux".into(), "celeste".into())
            .await
            .unwrap();
        assert_eq!(names(&hits), vec!["Celeste"]);
        let links = registry
            .return_handler()
            .unwrap()
            .resolve("abc".into())
            .await
            .unwrap();
        assert_eq!(links.len(), 1);

        let bare = falkor_plugin_sdk::HandlerRegistry::from(Catalog::default().into_handlers());
        assert!(bare.return_handler().is_none());
    }
}
