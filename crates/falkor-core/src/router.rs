use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Instant};

use anyhow::{bail, Result};
use bytes::Bytes;
use http::{header, HeaderValue, Method, Response, StatusCode, Uri};
use http_body_util::Full;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::Instrument;

pub type HttpResponse = Response<Full<Bytes>>;
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type RouteFn = Arc<dyn Fn(RouteRequest) -> BoxFuture<Result<HttpResponse>> + Send + Sync>;

/// Route table consulted for every inbound request.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<RouteHandle>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler whose successful value is serialized as a JSON body.
    pub fn route<F, Fut, T>(&mut self, method: Method, pattern: &str, handler: F) -> Result<()>
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let pattern = PathPattern::parse(pattern)?;
        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.pattern == pattern)
        {
            bail!("duplicate route `{method} {pattern}`");
        }

        let call: RouteFn = Arc::new(move |request| {
            let fut = handler(request);
            Box::pin(async move {
                let value = fut.await?;
                json_response(StatusCode::OK, &value)
            })
        });
        self.routes.push(RouteHandle {
            method,
            pattern,
            handler: call,
        });
        Ok(())
    }

    pub fn get<F, Fut, T>(&mut self, pattern: &str, handler: F) -> Result<()>
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.route(Method::GET, pattern, handler)
    }

    /// Returns true when a route with exactly this method and pattern exists.
    pub fn contains(&self, method: &Method, pattern: &str) -> bool {
        PathPattern::parse(pattern)
            .map(|pattern| {
                self.routes
                    .iter()
                    .any(|route| &route.method == method && route.pattern == pattern)
            })
            .unwrap_or(false)
    }

    /// Picks the matching route with the most literal segments; ties go to the
    /// earliest registration.
    pub fn select(&self, method: &Method, path: &str) -> Option<(&RouteHandle, Vec<(String, String)>)> {
        let mut best: Option<(&RouteHandle, Vec<(String, String)>)> = None;
        for route in self.routes.iter().filter(|route| &route.method == method) {
            let Some(params) = route.pattern.matches(path) else {
                continue;
            };
            let better = best
                .as_ref()
                .map_or(true, |(current, _)| {
                    route.pattern.literal_count() > current.pattern.literal_count()
                });
            if better {
                best = Some((route, params));
            }
        }
        best
    }

    pub async fn dispatch(&self, method: &Method, uri: &Uri) -> HttpResponse {
        let span = tracing::info_span!(
            "request",
            method = %method,
            path = %uri.path(),
            route = tracing::field::Empty,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        self.dispatch_in(method, uri, &span)
            .instrument(span.clone())
            .await
    }

    async fn dispatch_in(&self, method: &Method, uri: &Uri, span: &tracing::Span) -> HttpResponse {
        let start = Instant::now();
        let Some((route, params)) = self.select(method, uri.path()) else {
            span.record("status", StatusCode::NOT_FOUND.as_u16());
            metrics::counter!("falkor_requests_total", "outcome" => "miss").increment(1);
            return error_response(StatusCode::NOT_FOUND, "no matching route");
        };
        let route_name = route.pattern.to_string();
        span.record("route", route_name.as_str());

        let query = match parse_query(uri.query()) {
            Ok(query) => query,
            Err(err) => {
                span.record("status", StatusCode::BAD_REQUEST.as_u16());
                tracing::debug!(error = %err, "rejected malformed query string");
                return error_response(StatusCode::BAD_REQUEST, "malformed query string");
            }
        };

        let request = RouteRequest {
            path: uri.path().to_string(),
            params,
            query,
        };
        let result = (route.handler)(request).await;
        let duration = start.elapsed().as_millis() as u64;
        span.record("duration_ms", duration as i64);

        match result {
            Ok(response) => {
                span.record("status", response.status().as_u16());
                metrics::counter!("falkor_requests_total", "outcome" => "hit").increment(1);
                response
            }
            Err(err) => {
                if let Some(rejection) = err.downcast_ref::<Rejection>() {
                    span.record("status", StatusCode::BAD_REQUEST.as_u16());
                    return error_response(StatusCode::BAD_REQUEST, &rejection.to_string());
                }
                span.record("status", StatusCode::INTERNAL_SERVER_ERROR.as_u16());
                tracing::error!(error = %err, route = %route_name, "route handler failed");
                metrics::counter!("falkor_requests_total", "outcome" => "error").increment(1);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{err:#}"))
            }
        }
    }
}

#[derive(Clone)]
pub struct RouteHandle {
    pub method: Method,
    pub pattern: PathPattern,
    handler: RouteFn,
}

/// Extracted path parameters and query pairs handed to a route handler.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub path: String,
    params: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl RouteRequest {
    /// Path parameter exactly as it appeared on the wire.
    pub fn raw_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Percent-decoded path parameter. Missing or non-UTF-8 values are rejected
    /// with a 400 before any route logic observes them.
    pub fn param(&self, name: &str) -> Result<String> {
        let raw = self
            .raw_param(name)
            .ok_or_else(|| Rejection::new(format!("missing path parameter `{name}`")))?;
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| Rejection::new(format!("path parameter `{name}` is not valid UTF-8")))?;
        Ok(decoded.into_owned())
    }

    /// Every value of a repeated query parameter, in request order.
    pub fn query_values(&self, name: &str) -> Vec<String> {
        self.query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn has_query(&self, name: &str) -> bool {
        self.query.iter().any(|(key, _)| key == name)
    }
}

/// Client-side input error surfaced as `400 Bad Request`.
#[derive(Debug, Clone)]
pub struct Rejection {
    message: String,
}

impl Rejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Rejection {}

/// `/search/:os/:query` style pattern. Segments are compared verbatim; an
/// empty request segment still satisfies a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            bail!("route pattern must not be empty");
        }
        let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
        let mut segments = Vec::new();
        for raw in body.split('/') {
            if let Some(name) = raw.strip_prefix(':') {
                if name.is_empty() {
                    bail!("route pattern `{pattern}` has an unnamed parameter");
                }
                if segments
                    .iter()
                    .any(|segment| matches!(segment, Segment::Param(existing) if existing == name))
                {
                    bail!("route pattern `{pattern}` repeats parameter `{name}`");
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(raw.to_string()));
            }
        }
        Ok(Self { segments })
    }

    fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let body = path.strip_prefix('/').unwrap_or(path);
        let parts: Vec<&str> = body.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        Some(params)
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => write!(f, "/{literal}")?,
                Segment::Param(name) => write!(f, "/:{name}")?,
            }
        }
        Ok(())
    }
}

fn parse_query(query: Option<&str>) -> Result<Vec<(String, String)>> {
    match query {
        Some(raw) if !raw.is_empty() => Ok(serde_urlencoded::from_str(raw)?),
        _ => Ok(Vec::new()),
    }
}

pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<HttpResponse> {
    let body = serde_json::to_vec(value)?;
    Ok(response_with(status, Bytes::from(body)))
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    let body = serde_json::json!({ "error": message }).to_string();
    response_with(status, Bytes::from(body))
}

fn response_with(status: StatusCode, body: Bytes) -> HttpResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
