use thiserror::Error;

/// Synchronous failures: raised before any request is issued.
#[derive(Error, Debug)]
pub enum Error {
    #[error("[matomo] siteId required")]
    MissingSiteId,

    #[error("[matomo] tracker URL required, e.g. http://example.com/matomo.php")]
    MissingTrackerUrl,

    #[error("[matomo] tracker URL must end with \"matomo.php\" or \"piwik.php\": {0}")]
    TrackerUrlSuffix(String),

    #[error("[matomo] invalid tracker URL: {0}")]
    InvalidTrackerUrl(String),

    #[error("[matomo] URL to be tracked must be specified")]
    MissingUrl,

    #[error("[matomo] bulk tracking requires at least one event")]
    EmptyBulk,

    #[error("[matomo] failed to encode bulk body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[matomo] failed to spawn request thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Payload delivered to error listeners once a request has been issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackError {
    /// The tracker answered with a status outside the success set.
    #[error("tracker responded with HTTP {0}")]
    Status(u16),

    /// The request never produced a complete response.
    #[error("{0}")]
    Transport(String),
}

impl TrackError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Transport(_) => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Status(_) => None,
            Self::Transport(msg) => Some(msg),
        }
    }
}
