use crate::endpoint::{uses_secure_transport, validate_tracker_url, TrackerTarget};
use crate::error::{Error, TrackError};
use crate::query::stringify;
use crate::types::{BulkCallback, ErrorListener, Event, Options, SiteId};

use std::io::Read;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Status codes the tracking endpoint may answer with on success.
const SUCCESS_STATUSES: [u16; 7] = [200, 204, 301, 302, 304, 307, 308];

pub fn is_success_status(status: u16) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

/// Handle returned by [`Tracker::on_error`], used to unregister the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, ErrorListener)>,
}

/// Error observers shared between the tracker and its in-flight requests.
#[derive(Clone, Default)]
struct Notifier {
    listeners: Arc<RwLock<Listeners>>,
}

impl Notifier {
    fn has_listeners(&self) -> bool {
        let guard = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        !guard.entries.is_empty()
    }

    fn notify(&self, err: &TrackError) {
        // Clone out of the lock so listeners may (un)register re-entrantly.
        let listeners: Vec<ErrorListener> = {
            let guard = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
            guard.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(err);
        }
    }
}

/// Outcome reporting for one request. `armed` is the listener snapshot taken
/// when the call started.
struct Report {
    notifier: Notifier,
    armed: bool,
}

impl Report {
    fn fail(&self, err: TrackError) {
        if self.armed {
            tracing::warn!("[matomo] tracking request failed: {err}");
            self.notifier.notify(&err);
        } else {
            tracing::debug!("[matomo] tracking request failed, no error listener: {err}");
        }
    }

    fn classify(&self, status: u16) {
        if !is_success_status(status) {
            self.fail(TrackError::Status(status));
        }
    }
}

/// A request running on its own thread.
///
/// Dropping the handle detaches the request; [`InFlight::wait`] blocks until
/// it has finished and every notification and callback has run.
#[derive(Debug)]
pub struct InFlight {
    handle: JoinHandle<()>,
}

impl InFlight {
    pub fn wait(self) {
        if self.handle.join().is_err() {
            tracing::warn!("[matomo] request thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Matomo tracking client.
///
/// Every call to [`track`](Self::track) or [`track_bulk`](Self::track_bulk)
/// validates its input synchronously, then issues exactly one HTTP request on
/// a fresh thread and returns. There is no retry; unsuccessful statuses and
/// transport failures are only observable through [`on_error`](Self::on_error).
pub struct Tracker {
    site_id: SiteId,
    tracker_url: String,
    secure: bool,
    agent: ureq::Agent,
    notifier: Notifier,
}

impl Tracker {
    /// Create a new tracker with the given options.
    pub fn new(opts: Options) -> Result<Self, Error> {
        if !opts.site_id.is_present() {
            return Err(Error::MissingSiteId);
        }
        validate_tracker_url(&opts.tracker_url, opts.skip_url_validation)?;

        Ok(Self {
            secure: uses_secure_transport(&opts.tracker_url),
            agent: build_agent(opts.timeout),
            site_id: opts.site_id,
            tracker_url: opts.tracker_url,
            notifier: Notifier::default(),
        })
    }

    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    pub fn tracker_url(&self) -> &str {
        &self.tracker_url
    }

    pub fn uses_secure_transport(&self) -> bool {
        self.secure
    }

    /// Register an error listener.
    ///
    /// Whether a request reports failures is decided when the call starts: a
    /// call made while no listener is registered stays silent even if a
    /// listener is added before its response arrives. A call made while at
    /// least one listener exists notifies every listener registered at the
    /// time of the failure.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TrackError) + Send + Sync + 'static,
    {
        let mut guard = self
            .notifier
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(guard.next_id);
        guard.next_id += 1;
        let listener: ErrorListener = Arc::new(listener);
        guard.entries.push((id, listener));
        id
    }

    /// Returns `false` if the listener was not registered.
    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        let mut guard = self
            .notifier
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.entries.len();
        guard.entries.retain(|(entry, _)| *entry != id);
        guard.entries.len() != before
    }

    pub fn error_listener_count(&self) -> usize {
        let guard = self
            .notifier
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        guard.entries.len()
    }

    /// Send one tracking request as `GET <tracker_url>?<params>`.
    ///
    /// A bare URL string is tracked as `{url}`. The event is taken by value
    /// and stamped with `idsite` and `rec=1`, so caller-held data is never
    /// modified.
    pub fn track(&self, event: impl Into<Event>) -> Result<InFlight, Error> {
        let report = self.report();

        let mut event = event.into();
        if !event.has_url() {
            return Err(Error::MissingUrl);
        }
        event.stamp(&self.site_id);

        let request_url = format!("{}?{}", self.tracker_url, stringify(&event));
        let agent = self.agent.clone();
        tracing::debug!(
            secure = self.secure,
            params = event.len(),
            "[matomo] GET {}",
            self.tracker_url
        );

        spawn("matomo-track", move || {
            match agent.get(&request_url).call() {
                Ok(resp) => report.classify(resp.status()),
                Err(ureq::Error::Status(status, _)) => report.classify(status),
                Err(ureq::Error::Transport(e)) => report.fail(TrackError::Transport(e.to_string())),
            }
        })
    }

    /// Send several tracking requests in one bulk POST.
    ///
    /// The body is `{"requests": ["?<params>", ...]}` in event order. Once a
    /// response has been read in full its body is handed to `callback`,
    /// whatever the status. If no response arrives the callback is skipped
    /// and only the error listeners hear about it.
    pub fn track_bulk<I>(&self, events: I, callback: Option<BulkCallback>) -> Result<InFlight, Error>
    where
        I: IntoIterator,
        I::Item: Into<Event>,
    {
        let report = self.report();

        let requests: Vec<String> = events
            .into_iter()
            .map(|event| {
                let mut event = event.into();
                event.stamp(&self.site_id);
                format!("?{}", stringify(&event))
            })
            .collect();
        if requests.is_empty() {
            return Err(Error::EmptyBulk);
        }

        let body = serde_json::to_string(&serde_json::json!({ "requests": requests }))?;
        let target = TrackerTarget::parse(&self.tracker_url)?;
        let url = target.to_url();
        let agent = self.agent.clone();
        tracing::debug!(
            secure = self.secure,
            events = requests.len(),
            bytes = body.len(),
            "[matomo] POST {url}"
        );

        spawn("matomo-bulk", move || {
            let resp = match agent
                .post(&url)
                .set("Content-Type", "application/json")
                .set("Content-Length", &body.len().to_string())
                .send_string(&body)
            {
                Ok(resp) => resp,
                Err(ureq::Error::Status(_, resp)) => resp,
                Err(ureq::Error::Transport(e)) => {
                    report.fail(TrackError::Transport(e.to_string()));
                    return;
                }
            };

            report.classify(resp.status());

            let mut raw = Vec::new();
            if let Err(e) = resp.into_reader().read_to_end(&mut raw) {
                report.fail(TrackError::Transport(e.to_string()));
                return;
            }
            if let Some(callback) = callback {
                callback(String::from_utf8_lossy(&raw).into_owned());
            }
        })
    }

    fn report(&self) -> Report {
        Report {
            armed: self.notifier.has_listeners(),
            notifier: self.notifier.clone(),
        }
    }
}

fn build_agent(timeout: Option<Duration>) -> ureq::Agent {
    // 3xx answers are classified, never followed.
    let builder = ureq::AgentBuilder::new().redirects(0);
    match timeout {
        Some(timeout) => builder.timeout(timeout).build(),
        None => builder.build(),
    }
}

fn spawn<F>(name: &str, work: F) -> Result<InFlight, Error>
where
    F: FnOnce() + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(work)
        .map_err(Error::Spawn)?;
    Ok(InFlight { handle })
}
