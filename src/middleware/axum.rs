//! Axum middleware adapter (Tower Layer/Service).
//!
//! Tracks every request that produced a response as a Matomo page view.
//! No visitor id is sent unless the caller supplies one through
//! [`MatomoLayer::identify_visitor`].
//!
//! # Example
//!
//! ```rust,no_run
//! use matomo_tracker::{Options, Tracker};
//! use matomo_tracker::middleware::axum::MatomoLayer;
//! use axum::Router;
//! use std::sync::Arc;
//!
//! let tracker = Tracker::new(Options::new(1u32, "https://stats.example.com/matomo.php")).unwrap();
//! let app: Router = Router::new().layer(MatomoLayer::new(Arc::new(tracker)));
//! ```

use crate::{Event, Tracker};

use axum::body::Body;
use http::{HeaderMap, Request, Uri};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};

/// Derives the Matomo `_id` (16 hex chars) for a request from its headers.
pub type IdentifyVisitorFn = Arc<dyn Fn(&HeaderMap) -> Option<String> + Send + Sync>;

/// Tower Layer that reports each handled request to Matomo.
#[derive(Clone)]
pub struct MatomoLayer {
    tracker: Arc<Tracker>,
    identify: Option<IdentifyVisitorFn>,
}

impl MatomoLayer {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self {
            tracker,
            identify: None,
        }
    }

    /// Attach a visitor id to each page view.
    ///
    /// The returned value is sent to the tracker as-is; derive it from a
    /// stable, non-secret identifier (see [`visitor_id`](crate::visitor_id)).
    pub fn identify_visitor<F>(mut self, identify: F) -> Self
    where
        F: Fn(&HeaderMap) -> Option<String> + Send + Sync + 'static,
    {
        self.identify = Some(Arc::new(identify));
        self
    }
}

impl<S> Layer<S> for MatomoLayer {
    type Service = MatomoService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MatomoService {
            inner,
            tracker: Arc::clone(&self.tracker),
            identify: self.identify.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MatomoService<S> {
    inner: S,
    tracker: Arc<Tracker>,
    identify: Option<IdentifyVisitorFn>,
}

impl<S> Service<Request<Body>> for MatomoService<S>
where
    S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = axum::response::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let headers = req.headers().clone();
        let uri = req.uri().clone();
        let visitor = self.identify.as_ref().and_then(|identify| identify(&headers));
        let future = self.inner.call(req);

        ResponseFuture {
            inner: future,
            tracker: Arc::clone(&self.tracker),
            start: Instant::now(),
            request: Some(PendingView {
                headers,
                uri,
                visitor,
            }),
        }
    }
}

pin_project! {
    /// Fires the page view once the inner service has responded.
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        tracker: Arc<Tracker>,
        start: Instant,
        request: Option<PendingView>,
    }
}

/// Request parts captured before the inner service consumes the request.
struct PendingView {
    headers: HeaderMap,
    uri: Uri,
    visitor: Option<String>,
}

impl<F, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<axum::response::Response, E>>,
{
    type Output = Result<axum::response::Response, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = match this.inner.poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };

        if result.is_ok() {
            if let Some(pending) = this.request.take() {
                let event = page_view(pending, this.start.elapsed());
                if let Err(e) = this.tracker.track(event) {
                    tracing::debug!("[matomo] page view not tracked: {e}");
                }
            }
        }
        Poll::Ready(result)
    }
}

fn page_view(pending: PendingView, elapsed: Duration) -> Event {
    let PendingView {
        headers,
        uri,
        visitor,
    } = pending;
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };

    let scheme = header("x-forwarded-proto").unwrap_or_else(|| "http".to_string());
    let host = header("host")
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let mut event = Event::new(format!("{scheme}://{host}{path}"))
        .with("send_image", 0)
        .with("pf_srv", elapsed.as_millis() as u64);
    if let Some(ua) = header("user-agent") {
        event.set("ua", ua);
    }
    if let Some(referer) = header("referer") {
        event.set("urlref", referer);
    }
    if let Some(lang) = header("accept-language") {
        event.set("lang", lang);
    }
    if let Some(id) = visitor {
        event.set("_id", id);
    }
    event
}
