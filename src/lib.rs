//! Matomo / Piwik tracking client.
//!
//! Sends tracking events to a `matomo.php` (or `piwik.php`) endpoint, either
//! one at a time as a GET request or batched into a single bulk POST. Calls
//! return immediately; the request runs on its own thread and failures are
//! reported to registered error listeners.
//!
//! ```rust,no_run
//! use matomo_tracker::{Event, Options, Tracker};
//!
//! let tracker = Tracker::new(Options::new(1u32, "https://stats.example.com/matomo.php")).unwrap();
//! tracker.on_error(|err| eprintln!("matomo: {err}"));
//!
//! tracker.track("https://example.com/pricing").unwrap();
//! tracker
//!     .track(Event::new("https://example.com/").with("action_name", "Home"))
//!     .unwrap();
//! ```

mod endpoint;
mod error;
pub mod middleware;
mod query;
mod tracker;
mod types;
mod visitor;

pub use endpoint::{uses_secure_transport, validate_tracker_url, TrackerTarget};
pub use error::{Error, TrackError};
pub use query::{escape, stringify};
pub use tracker::{is_success_status, InFlight, ListenerId, Tracker};
pub use types::{BulkCallback, ErrorListener, Event, Options, SiteId};
pub use visitor::visitor_id;
