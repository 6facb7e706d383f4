//! Request gateway: the outermost middleware every request passes through.
//!
//! For each request it assigns a correlation id, consults the rate limiter,
//! times the inner service and finally emits one access-log record. The
//! record is written by a drop guard, so it is produced exactly once whether
//! the inner service answers, fails, or the request future is dropped.

use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::models::Id;
use crate::rate_limit::{RateLimitStatus, WindowRateLimiter};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Per-request data stored in the request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client: String,
    pub started_at: i64,
    /// Set by the `Auth` extractor once the bearer token resolved to a user.
    pub caller: Option<Id>,
}

/// One line of the access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub timestamp: i64,
    pub method: String,
    pub route: String,
    /// 0 when no response was produced.
    pub status: u16,
    pub duration_ms: u128,
    pub request_id: String,
}

impl fmt::Display for AccessLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timestamp={} method={} route={} status={} duration_ms={} request_id={}",
            self.timestamp, self.method, self.route, self.status, self.duration_ms, self.request_id
        )
    }
}

pub trait AccessLogSink: Send + Sync {
    fn record(&self, entry: AccessLogEntry);
}

/// Default sink: one `tracing` event per request on target `access`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAccessLog;

impl AccessLogSink for TracingAccessLog {
    fn record(&self, entry: AccessLogEntry) {
        tracing::info!(target: "access", "{entry}");
    }
}

/// Collects entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAccessLog {
    entries: Mutex<Vec<AccessLogEntry>>,
}

impl MemoryAccessLog {
    pub fn entries(&self) -> Vec<AccessLogEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AccessLogSink for MemoryAccessLog {
    fn record(&self, entry: AccessLogEntry) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
    }
}

#[derive(Clone)]
pub struct RequestGateway {
    limiter: WindowRateLimiter,
    sink: Arc<dyn AccessLogSink>,
    clock: SharedClock,
}

impl RequestGateway {
    pub fn new(limiter: WindowRateLimiter, clock: SharedClock) -> Self {
        Self { limiter, sink: Arc::new(TracingAccessLog), clock }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AccessLogSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestGateway
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestGatewayMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestGatewayMiddleware {
            service: Rc::new(service),
            gateway: self.clone(),
        }))
    }
}

pub struct RequestGatewayMiddleware<S> {
    service: Rc<S>,
    gateway: RequestGateway,
}

/// Emits the access record when dropped.
struct PendingLog {
    method: String,
    route: String,
    request_id: String,
    started: Instant,
    status: u16,
    sink: Arc<dyn AccessLogSink>,
    clock: SharedClock,
}

impl Drop for PendingLog {
    fn drop(&mut self) {
        self.sink.record(AccessLogEntry {
            timestamp: self.clock.now_unix(),
            method: std::mem::take(&mut self.method),
            route: std::mem::take(&mut self.route),
            status: self.status,
            duration_ms: self.started.elapsed().as_millis(),
            request_id: std::mem::take(&mut self.request_id),
        });
    }
}

fn inject_headers<B>(res: &mut ServiceResponse<B>, request_id: &str, quota: RateLimitStatus) {
    let headers = res.headers_mut();
    if let Ok(v) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), v);
    }
    headers.insert(HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER), HeaderValue::from(quota.limit));
    headers.insert(HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER), HeaderValue::from(quota.remaining));
    headers.insert(HeaderName::from_static(RATE_LIMIT_RESET_HEADER), HeaderValue::from(quota.reset_at));
}

impl<S, B> Service<ServiceRequest> for RequestGatewayMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let gw = &self.gateway;

        let request_id = Uuid::new_v4().to_string();
        let client = req.peer_addr().map(|a| a.ip().to_string()).unwrap_or_default();
        let quota = gw.limiter.check(&client);
        let pending = PendingLog {
            method: req.method().to_string(),
            route: req.path().to_string(),
            request_id: request_id.clone(),
            started: Instant::now(),
            status: 0,
            sink: gw.sink.clone(),
            clock: gw.clock.clone(),
        };
        req.extensions_mut().insert(RequestContext {
            request_id: request_id.clone(),
            client,
            started_at: gw.clock.now_unix(),
            caller: None,
        });

        Box::pin(async move {
            // the guard must live in the future so it drops after the inner call
            let mut pending = pending;
            // an inner error leaves status at 0 and propagates unchanged
            let mut res = svc.call(req).await?;
            inject_headers(&mut res, &request_id, quota);
            pending.status = res.status().as_u16();
            Ok(res)
        })
    }
}
