use std::sync::Arc;

use anyhow::Result;
use falkor_core::{App, RouteRequest};

use crate::{
    error::PluginError,
    handlers::{HandlerRegistry, SetupHandler},
    negotiation::{negotiate, param_filters, query_filters, RouteMode},
    setup::{SetupDescriptor, SetupResponse},
};

/// Frozen view of the controller that the route closures share.
#[derive(Debug, Clone)]
pub(crate) struct RouteContext {
    pub descriptor: Arc<SetupDescriptor>,
    pub handlers: HandlerRegistry,
    pub debug: bool,
    pub mode: RouteMode,
}

pub(crate) fn register(app: &mut App, ctx: &RouteContext) -> Result<()> {
    register_setup_route(app, ctx)?;
    register_search_route(app, ctx)?;
    register_return_route(app, ctx)
}

fn register_setup_route(app: &mut App, ctx: &RouteContext) -> Result<()> {
    let descriptor = ctx.descriptor.clone();
    let custom = ctx.handlers.setup_handler().cloned();
    let debug = ctx.debug;

    match ctx.mode {
        RouteMode::Query => app.get(RouteMode::Query.setup_pattern(), move |req: RouteRequest| {
            let filters = query_filters(req.has_query("search"), req.query_values("search"));
            setup_response(descriptor.clone(), custom.clone(), filters, debug)
        }),
        RouteMode::Params => app.get(RouteMode::Params.setup_pattern(), move |req: RouteRequest| {
            let filters = param_filters(req.raw_param("search"));
            setup_response(descriptor.clone(), custom.clone(), filters, debug)
        }),
    }
}

async fn setup_response(
    descriptor: Arc<SetupDescriptor>,
    custom: Option<Arc<dyn SetupHandler>>,
    filters: Option<Vec<String>>,
    debug: bool,
) -> Result<SetupResponse> {
    if debug {
        tracing::info!(
            filters = ?filters,
            custom = custom.is_some(),
            "[plugin] GET /setup.json"
        );
    }
    match custom {
        Some(handler) => handler.setup(filters).await,
        None => Ok(negotiate(&descriptor, filters)),
    }
}

fn register_search_route(app: &mut App, ctx: &RouteContext) -> Result<()> {
    let handler = ctx.handlers.search().cloned();
    let debug = ctx.debug;

    app.get("/search/:os/:query", move |req: RouteRequest| {
        let handler = handler.clone();
        async move {
            let os = req.param("os")?;
            let query = req.param("query")?;
            let handler = handler.ok_or(PluginError::MissingHandler("search"))?;
            let results = handler.search(os.clone(), query.clone()).await?;
            if debug {
                tracing::info!(os = %os, query = %query, hits = results.len(), "[plugin] search");
            }
            Ok::<_, anyhow::Error>(results)
        }
    })
}

fn register_return_route(app: &mut App, ctx: &RouteContext) -> Result<()> {
    let Some(handler) = ctx.handlers.return_handler().cloned() else {
        if ctx.debug {
            tracing::warn!("[plugin] skipping /return route: no return handler bound");
        }
        return Ok(());
    };
    let debug = ctx.debug;

    app.get("/return/:returned", move |req: RouteRequest| {
        let handler = handler.clone();
        async move {
            let returned = req.param("returned")?;
            let links = handler.resolve(returned.clone()).await?;
            if debug {
                tracing::info!(returned = %returned, hits = links.len(), "[plugin] return");
            }
            Ok::<_, anyhow::Error>(links)
        }
    })
}
