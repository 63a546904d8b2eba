use std::{
    convert::Infallible,
    future::Future,
    net::SocketAddr,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};

use anyhow::{Context, Result};
use http::Request;
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use serde::Serialize;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
};
use tower::{Layer, Service};
use tower_http::cors::{Cors, CorsLayer};

use crate::router::{BoxFuture, HttpResponse, RouteRequest, Router};

/// Router plus permissive CORS, ready to be handed to hyper.
pub type AppService = Cors<RouterService>;

/// HTTP adapter handed to plugin code: accumulates routes, then serves them.
#[derive(Clone, Default)]
pub struct App {
    router: Router,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<F, Fut, T>(&mut self, pattern: &str, handler: F) -> Result<()>
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.router.get(pattern, handler)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn into_service(self) -> AppService {
        CorsLayer::permissive().layer(RouterService {
            router: Arc::new(self.router),
        })
    }
}

#[derive(Clone)]
pub struct RouterService {
    router: Arc<Router>,
}

impl<B> Service<Request<B>> for RouterService {
    type Response = HttpResponse;
    type Error = Infallible;
    type Future = BoxFuture<Result<HttpResponse, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let router = self.router.clone();
        // Every route is a GET; the body is never read.
        let (parts, _body) = req.into_parts();
        Box::pin(async move { Ok(router.dispatch(&parts.method, &parts.uri).await) })
    }
}

/// A bound TCP socket that has not started accepting yet.
pub struct Listener {
    tcp: TcpListener,
    addr: SocketAddr,
}

impl Listener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let tcp = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let addr = tcp
            .local_addr()
            .context("failed to read bound socket address")?;
        Ok(Self { tcp, addr })
    }

    /// Concrete address reported by the transport (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn serve(self, app: App, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let service = app.into_service();
        tracing::info!(addr = %self.addr, "listener ready");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    tracing::info!(addr = %self.addr, "listener shutting down");
                    break;
                }
                accept = self.tcp.accept() => {
                    let (stream, peer_addr) = match accept {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to accept connection");
                            continue;
                        }
                    };
                    let service = service.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(service, stream, peer_addr).await {
                            tracing::warn!(error = %err, "connection closed with error");
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(service: AppService, stream: TcpStream, peer_addr: SocketAddr) -> Result<()> {
    http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
        .await
        .with_context(|| format!("connection handling failed for {peer_addr}"))
}
