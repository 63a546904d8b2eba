use crate::{
    controller::{Plugin, PluginOptions, Port, RunningPlugin},
    error::{PluginError, Result},
    handlers::Handlers,
    negotiation::RouteMode,
    setup::SetupDescriptor,
};

/// Everything `create_plugin` needs in one value.
#[derive(Debug, Clone, Default)]
pub struct CreatePluginOptions {
    pub setup: Option<SetupDescriptor>,
    pub port: i64,
    /// Must carry a search handler; return and custom-setup are optional.
    pub handlers: Option<Handlers>,
    pub options: PluginOptions,
    pub route_mode: RouteMode,
}

/// Validates the options, configures a fresh [`Plugin`] and starts it.
///
/// ```rust,ignore
/// let running = create_plugin(CreatePluginOptions {
///     setup: Some(setup),
///     port: 3000,
///     handlers: Some(Handlers::new(search)),
///     ..Default::default()
/// })
/// .await?;
/// ```
pub async fn create_plugin(options: CreatePluginOptions) -> Result<RunningPlugin> {
    let CreatePluginOptions {
        setup,
        port,
        handlers,
        options,
        route_mode,
    } = options;

    let setup = setup.ok_or(PluginError::MissingSetup)?;
    let port = Port::try_from(port)?;
    let handlers = handlers.ok_or_else(|| {
        PluginError::InvalidHandler("search", "a search handler is required".into())
    })?;
    setup.validate()?;

    let mut plugin = Plugin::new();
    plugin
        .configure(setup)?
        .bind_handlers(handlers)?
        .set_options(options)?
        .set_route_mode(route_mode)?;
    plugin.listen(port.get()).await
}
