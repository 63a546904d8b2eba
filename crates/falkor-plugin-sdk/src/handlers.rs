use std::{fmt, future::Future, sync::Arc};

use falkor_core::router::BoxFuture;

use crate::{setup::SetupResponse, types::SearchResult};

pub type HandlerFuture<T> = BoxFuture<anyhow::Result<T>>;

/// Answers `GET /search/:os/:query`.
pub trait SearchHandler: Send + Sync + 'static {
    fn search(&self, os: String, query: String) -> HandlerFuture<Vec<SearchResult>>;
}

/// Answers `GET /return/:returned` with the resolved links.
pub trait ReturnHandler: Send + Sync + 'static {
    fn resolve(&self, returned: String) -> HandlerFuture<Vec<String>>;
}

/// Replaces the default `/setup.json` negotiation entirely.
pub trait SetupHandler: Send + Sync + 'static {
    fn setup(&self, filters: Option<Vec<String>>) -> HandlerFuture<SetupResponse>;
}

impl<F, Fut> SearchHandler for F
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<SearchResult>>> + Send + 'static,
{
    fn search(&self, os: String, query: String) -> HandlerFuture<Vec<SearchResult>> {
        Box::pin(self(os, query))
    }
}

impl<F, Fut> ReturnHandler for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<String>>> + Send + 'static,
{
    fn resolve(&self, returned: String) -> HandlerFuture<Vec<String>> {
        Box::pin(self(returned))
    }
}

impl<F, Fut> SetupHandler for F
where
    F: Fn(Option<Vec<String>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<SetupResponse>> + Send + 'static,
{
    fn setup(&self, filters: Option<Vec<String>>) -> HandlerFuture<SetupResponse> {
        Box::pin(self(filters))
    }
}

/// One binding of the three handler slots. The search handler is required by
/// construction; the other two are optional.
#[derive(Clone)]
pub struct Handlers {
    search: Arc<dyn SearchHandler>,
    ret: Option<Arc<dyn ReturnHandler>>,
    setup: Option<Arc<dyn SetupHandler>>,
}

impl Handlers {
    pub fn new(search: impl SearchHandler) -> Self {
        Self::from_search(Arc::new(search))
    }

    pub fn from_search(search: Arc<dyn SearchHandler>) -> Self {
        Self {
            search,
            ret: None,
            setup: None,
        }
    }

    pub fn with_return(mut self, handler: impl ReturnHandler) -> Self {
        self.ret = Some(Arc::new(handler));
        self
    }

    pub fn with_setup(mut self, handler: impl SetupHandler) -> Self {
        self.setup = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("return", &self.ret.is_some())
            .field("setup", &self.setup.is_some())
            .finish_non_exhaustive()
    }
}

/// Slots owned by the controller. Empty until handlers are bound; each bind
/// replaces all three slots.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    search: Option<Arc<dyn SearchHandler>>,
    ret: Option<Arc<dyn ReturnHandler>>,
    setup: Option<Arc<dyn SetupHandler>>,
}

impl HandlerRegistry {
    pub fn bind(&mut self, handlers: Handlers) {
        self.search = Some(handlers.search);
        self.ret = handlers.ret;
        self.setup = handlers.setup;
    }

    pub fn search(&self) -> Option<&Arc<dyn SearchHandler>> {
        self.search.as_ref()
    }

    pub fn return_handler(&self) -> Option<&Arc<dyn ReturnHandler>> {
        self.ret.as_ref()
    }

    pub fn setup_handler(&self) -> Option<&Arc<dyn SetupHandler>> {
        self.setup.as_ref()
    }
}

impl From<Handlers> for HandlerRegistry {
    fn from(handlers: Handlers) -> Self {
        let mut registry = Self::default();
        registry.bind(handlers);
        registry
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("search", &self.search.is_some())
            .field("return", &self.ret.is_some())
            .field("setup", &self.setup.is_some())
            .finish()
    }
}
