use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use anyhow::Context;
use falkor_core::{App, Listener};
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    console,
    error::{PluginError, Result},
    handlers::{HandlerRegistry, Handlers},
    negotiation::RouteMode,
    routes::{self, RouteContext},
    setup::SetupDescriptor,
};

/// Runtime switches that do not change the HTTP contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOptions {
    /// Log request metadata (filters, os/query, hit counts) for every call.
    pub debug: bool,
    /// Interface to bind; all interfaces by default.
    pub host: IpAddr,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            debug: false,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// A TCP port in `1..=65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port(u16);

impl Port {
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<i64> for Port {
    type Error = PluginError;

    fn try_from(value: i64) -> Result<Self> {
        u16::try_from(value)
            .ok()
            .filter(|port| *port > 0)
            .map(Port)
            .ok_or_else(|| PluginError::InvalidPort(value.to_string()))
    }
}

impl TryFrom<i32> for Port {
    type Error = PluginError;

    fn try_from(value: i32) -> Result<Self> {
        Port::try_from(i64::from(value))
    }
}

impl TryFrom<u32> for Port {
    type Error = PluginError;

    fn try_from(value: u32) -> Result<Self> {
        Port::try_from(i64::from(value))
    }
}

impl TryFrom<u16> for Port {
    type Error = PluginError;

    fn try_from(value: u16) -> Result<Self> {
        Port::try_from(i64::from(value))
    }
}

impl TryFrom<&str> for Port {
    type Error = PluginError;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl FromStr for Port {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map_err(|_| PluginError::InvalidPort(s.to_string()))
            .and_then(Port::try_from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unconfigured,
    Configured,
    Started,
}

/// Owns the plugin configuration until `listen` freezes it and starts serving.
///
/// Setters overwrite freely before `listen`; afterwards every setter and any
/// further `listen` fails with [`PluginError::AlreadyStarted`].
pub struct Plugin {
    descriptor: Option<SetupDescriptor>,
    handlers: HandlerRegistry,
    options: PluginOptions,
    route_mode: RouteMode,
    app: Option<App>,
    started: bool,
}

impl Default for Plugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin {
    pub fn new() -> Self {
        Self {
            descriptor: None,
            handlers: HandlerRegistry::default(),
            options: PluginOptions::default(),
            route_mode: RouteMode::default(),
            app: Some(App::new()),
            started: false,
        }
    }

    pub fn state(&self) -> PluginState {
        match (self.started, self.descriptor.is_some()) {
            (true, _) => PluginState::Started,
            (false, true) => PluginState::Configured,
            (false, false) => PluginState::Unconfigured,
        }
    }

    pub fn configure(&mut self, descriptor: SetupDescriptor) -> Result<&mut Self> {
        self.ensure_configurable("configure")?;
        self.descriptor = Some(descriptor);
        Ok(self)
    }

    pub fn bind_handlers(&mut self, handlers: Handlers) -> Result<&mut Self> {
        self.ensure_configurable("bind_handlers")?;
        self.handlers.bind(handlers);
        Ok(self)
    }

    pub fn set_options(&mut self, options: PluginOptions) -> Result<&mut Self> {
        self.ensure_configurable("set_options")?;
        self.options = options;
        Ok(self)
    }

    pub fn set_route_mode(&mut self, mode: RouteMode) -> Result<&mut Self> {
        self.ensure_configurable("set_route_mode")?;
        self.route_mode = mode;
        Ok(self)
    }

    pub fn descriptor(&self) -> Option<&SetupDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    pub fn route_mode(&self) -> RouteMode {
        self.route_mode
    }

    /// The HTTP adapter, for registering extra routes before `listen`.
    pub fn app_handle(&mut self) -> Result<&mut App> {
        if self.descriptor.is_none() {
            return Err(PluginError::MissingSetup);
        }
        self.app.as_mut().ok_or(PluginError::AlreadyStarted)
    }

    /// Validates the port, binds the transport, backfills `api_url`/`setup_path`
    /// from the bound address, registers the three plugin routes and spawns the
    /// serve loop. The plugin only counts as started once all of that
    /// succeeded; a failed attempt leaves it configured and retryable.
    pub async fn listen<P>(&mut self, port: P) -> Result<RunningPlugin>
    where
        P: TryInto<Port, Error = PluginError>,
    {
        if self.started {
            tracing::error!("listen called on a plugin that is already running");
            return Err(PluginError::AlreadyStarted);
        }
        let port = port.try_into()?;
        let descriptor = self.descriptor.clone().ok_or(PluginError::MissingSetup)?;
        // Registration works on a copy so host routes survive a failed attempt.
        let mut app = self.app.clone().ok_or(PluginError::AlreadyStarted)?;

        let listener = Listener::bind(SocketAddr::new(self.options.host, port.get()))
            .await
            .map_err(PluginError::Transport)?;
        let bound = listener.local_addr();
        let descriptor = Arc::new(descriptor.backfilled(bound));

        let ctx = RouteContext {
            descriptor: descriptor.clone(),
            handlers: self.handlers.clone(),
            debug: self.options.debug,
            mode: self.route_mode,
        };
        routes::register(&mut app, &ctx).map_err(PluginError::Routes)?;

        self.app = None;
        self.started = true;

        let install_link = console::install_link(descriptor.api_url());
        console::announce_startup(self.options.debug, bound, descriptor.api_url(), &install_link);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listener.serve(app, shutdown_rx));

        Ok(RunningPlugin {
            addr: bound,
            descriptor,
            install_link,
            shutdown: shutdown_tx,
            task,
        })
    }

    fn ensure_configurable(&self, operation: &'static str) -> Result<()> {
        if self.started {
            tracing::error!(operation, "plugin already started; configuration change rejected");
            return Err(PluginError::AlreadyStarted);
        }
        Ok(())
    }
}

/// Handle to a plugin that is accepting connections. Dropping it stops the
/// listener.
pub struct RunningPlugin {
    addr: SocketAddr,
    descriptor: Arc<SetupDescriptor>,
    install_link: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl RunningPlugin {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The advertised descriptor after `api_url`/`setup_path` backfill.
    pub fn descriptor(&self) -> &SetupDescriptor {
        &self.descriptor
    }

    /// `falkor://install-plugin/<api_url>/setup.json`. `listen` only logs it
    /// through `tracing`; hosts without a subscriber should print this value.
    pub fn install_link(&self) -> &str {
        &self.install_link
    }

    /// Stops accepting connections and waits for the listener to exit.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.send(true).ok();
        self.task.await.context("plugin listener task aborted")?
    }

    /// Waits for the listener to exit on its own.
    pub async fn wait(self) -> anyhow::Result<()> {
        let RunningPlugin { shutdown, task, .. } = self;
        let result = task.await.context("plugin listener task aborted")?;
        drop(shutdown);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{setup::tests::descriptor, types::SearchResult};
    use std::{
        io,
        sync::{Arc, Mutex},
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output for the current thread's subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    async fn startup_log(debug: bool) -> (String, String) {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut plugin = loopback_plugin();
        plugin
            .set_options(PluginOptions {
                debug,
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            })
            .unwrap();
        let running = plugin.listen(free_port()).await.unwrap();
        let link = running.install_link().to_string();
        running.shutdown().await.unwrap();
        (captured.contents(), link)
    }

    async fn no_hits(_os: String, _query: String) -> anyhow::Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn loopback_plugin() -> Plugin {
        let mut plugin = Plugin::new();
        plugin
            .configure(descriptor())
            .unwrap()
            .bind_handlers(Handlers::new(no_hits))
            .unwrap()
            .set_options(PluginOptions {
                debug: true,
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            })
            .unwrap();
        plugin
    }

    async fn fetch(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        raw
    }

    #[test]
    fn ports_must_be_positive_and_in_range() {
        for bad in [-1_i64, 0, 65_536] {
            assert!(matches!(Port::try_from(bad), Err(PluginError::InvalidPort(_))));
        }
        assert!(matches!("http".parse::<Port>(), Err(PluginError::InvalidPort(_))));
        assert_eq!(Port::try_from(3000).unwrap().get(), 3000);
        assert_eq!(" 8080 ".parse::<Port>().unwrap().get(), 8080);
    }

    #[test]
    fn state_follows_configuration() {
        let mut plugin = Plugin::new();
        assert_eq!(plugin.state(), PluginState::Unconfigured);
        plugin.configure(descriptor()).unwrap();
        assert_eq!(plugin.state(), PluginState::Configured);
        plugin.set_route_mode(RouteMode::Params).unwrap();
        assert_eq!(plugin.route_mode(), RouteMode::Params);
    }

    #[test]
    fn app_handle_requires_a_descriptor() {
        let mut plugin = Plugin::new();
        assert!(matches!(plugin.app_handle(), Err(PluginError::MissingSetup)));
        plugin.configure(descriptor()).unwrap();
        assert!(plugin.app_handle().is_ok());
    }

    #[tokio::test]
    async fn invalid_ports_fail_before_anything_starts() {
        let mut plugin = loopback_plugin();
        assert!(matches!(plugin.listen(-1).await, Err(PluginError::InvalidPort(_))));
        assert!(matches!(plugin.listen(0).await, Err(PluginError::InvalidPort(_))));
        assert!(matches!(plugin.listen("abc").await, Err(PluginError::InvalidPort(_))));
        assert_eq!(plugin.state(), PluginState::Configured);
        assert!(plugin.app_handle().is_ok());
    }

    #[tokio::test]
    async fn listen_without_descriptor_is_missing_setup() {
        let mut plugin = Plugin::new();
        assert!(matches!(plugin.listen(3000).await, Err(PluginError::MissingSetup)));
        assert_eq!(plugin.state(), PluginState::Unconfigured);
    }

    #[tokio::test]
    async fn second_listen_fails_regardless_of_arguments() {
        let mut plugin = loopback_plugin();
        let running = plugin.listen(free_port()).await.unwrap();

        assert!(matches!(
            plugin.listen(free_port()).await,
            Err(PluginError::AlreadyStarted)
        ));
        assert!(matches!(plugin.listen(-1).await, Err(PluginError::AlreadyStarted)));
        running.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn configuration_is_frozen_after_start() {
        let mut plugin = loopback_plugin();
        let running = plugin.listen(free_port()).await.unwrap();

        assert_eq!(plugin.state(), PluginState::Started);
        assert!(matches!(
            plugin.configure(descriptor()),
            Err(PluginError::AlreadyStarted)
        ));
        assert!(matches!(
            plugin.bind_handlers(Handlers::new(no_hits)),
            Err(PluginError::AlreadyStarted)
        ));
        assert!(matches!(
            plugin.set_options(PluginOptions::default()),
            Err(PluginError::AlreadyStarted)
        ));
        assert!(matches!(
            plugin.set_route_mode(RouteMode::Params),
            Err(PluginError::AlreadyStarted)
        ));
        assert!(matches!(plugin.app_handle(), Err(PluginError::AlreadyStarted)));
        running.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn failed_bind_leaves_plugin_retryable() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let busy = held.local_addr().unwrap().port();

        let mut plugin = loopback_plugin();
        plugin
            .app_handle()
            .unwrap()
            .get("/health", |_| async { Ok::<_, anyhow::Error>("ok") })
            .unwrap();
        assert!(matches!(plugin.listen(busy).await, Err(PluginError::Transport(_))));
        assert_eq!(plugin.state(), PluginState::Configured);

        let running = plugin.listen(free_port()).await.unwrap();
        assert_eq!(plugin.state(), PluginState::Started);
        let raw = fetch(running.local_addr(), "/health").await;
        assert!(raw.ends_with("\"ok\""));
        running.shutdown().await.unwrap();
        drop(held);
    }

    #[tokio::test]
    async fn route_clash_leaves_plugin_retryable() {
        let mut plugin = loopback_plugin();
        plugin
            .app_handle()
            .unwrap()
            .get("/setup.json", |_| async { Ok::<_, anyhow::Error>("mine") })
            .unwrap();
        assert!(matches!(
            plugin.listen(free_port()).await,
            Err(PluginError::Routes(_))
        ));
        assert_eq!(plugin.state(), PluginState::Configured);

        plugin.set_route_mode(RouteMode::Params).unwrap();
        let running = plugin.listen(free_port()).await.unwrap();
        let raw = fetch(running.local_addr(), "/setup.json").await;
        assert!(raw.ends_with("\"mine\""));
        running.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn install_link_is_logged_without_debug() {
        let (log, link) = startup_log(false).await;
        assert!(log.contains(&link), "{log}");
        assert!(!log.contains("Listening on"), "{log}");
    }

    #[tokio::test]
    async fn listening_line_is_logged_with_debug() {
        let (log, link) = startup_log(true).await;
        assert!(log.contains("Listening on"), "{log}");
        assert!(log.contains(&link), "{log}");
    }

    #[tokio::test]
    async fn serves_backfilled_descriptor_and_composed_routes() {
        let mut plugin = loopback_plugin();
        plugin
            .app_handle()
            .unwrap()
            .get("/health", |_| async { Ok::<_, anyhow::Error>("ok") })
            .unwrap();
        let port = free_port();
        let running = plugin.listen(port).await.unwrap();

        let expected_url = format!("http://127.0.0.1:{port}");
        assert_eq!(running.descriptor().api_url(), expected_url);
        assert_eq!(running.descriptor().setup_path.as_deref(), Some("/setup.json"));
        assert_eq!(
            running.install_link(),
            format!("falkor://install-plugin/{expected_url}/setup.json")
        );

        let raw = fetch(running.local_addr(), "/setup.json").await;
        assert!(raw.starts_with("HTTP/1.1 200"));
        let body = raw.split("\r\n\r\n").nth(1).unwrap();
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["api_url"], serde_json::json!(expected_url));
        assert_eq!(json["config"], serde_json::json!(false));

        let raw = fetch(running.local_addr(), "/health").await;
        assert!(raw.ends_with("\"ok\""));
        let raw = fetch(running.local_addr(), "/return/x").await;
        assert!(raw.starts_with("HTTP/1.1 404"));

        running.shutdown().await.unwrap();
    }
}
