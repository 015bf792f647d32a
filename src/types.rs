use crate::error::TrackError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Observer invoked when a request fails after it has been issued.
pub type ErrorListener = Arc<dyn Fn(&TrackError) + Send + Sync>;

/// Receives the raw response body of a bulk request.
pub type BulkCallback = Box<dyn FnOnce(String) + Send>;

/// Identifier of the tracked website inside Matomo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SiteId {
    Number(u64),
    Text(String),
}

impl SiteId {
    /// A zero id or an empty string counts as absent.
    pub fn is_present(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0,
            Self::Text(s) => !s.is_empty(),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u32> for SiteId {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for SiteId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<usize> for SiteId {
    fn from(n: usize) -> Self {
        Self::Number(n as u64)
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A single tracking request: Matomo parameter names mapped to values.
///
/// Keys keep insertion order, and overwriting a key keeps its original
/// position. Any parameter the tracking API accepts (`action_name`, `ua`,
/// `dimension1`, ...) is passed through to the query string verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Event for a page URL.
    pub fn new(url: impl Into<String>) -> Self {
        let mut params = Map::new();
        params.insert("url".to_string(), Value::String(url.into()));
        Self(params)
    }

    /// Set a parameter, replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn url(&self) -> Option<&str> {
        self.0.get("url").and_then(Value::as_str)
    }

    /// Whether the `url` entry holds a usable (truthy) value.
    pub fn has_url(&self) -> bool {
        match self.0.get("url") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Adds the site id and the `rec=1` record flag.
    pub(crate) fn stamp(&mut self, site_id: &SiteId) {
        self.0.insert("idsite".to_string(), site_id.to_value());
        self.0.insert("rec".to_string(), Value::from(1));
    }
}

impl From<&str> for Event {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for Event {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<Map<String, Value>> for Event {
    fn from(params: Map<String, Value>) -> Self {
        Self(params)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Event {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Configuration for a [`Tracker`](crate::Tracker).
#[derive(Debug, Clone)]
pub struct Options {
    /// Site id of the tracked website (required, non-zero / non-empty).
    pub site_id: SiteId,
    /// Tracking endpoint, e.g. `https://stats.example.com/matomo.php`.
    pub tracker_url: String,
    /// Accept endpoints not ending in `matomo.php` or `piwik.php`.
    pub skip_url_validation: bool,
    /// Overall deadline for each request. Default: none.
    pub timeout: Option<Duration>,
}

impl Options {
    /// Create options with required fields only; all others use defaults.
    pub fn new(site_id: impl Into<SiteId>, tracker_url: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            tracker_url: tracker_url.into(),
            skip_url_validation: false,
            timeout: None,
        }
    }
}
