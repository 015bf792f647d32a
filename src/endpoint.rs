use crate::error::Error;

const ACCEPTED_SUFFIXES: [&str; 2] = ["matomo.php", "piwik.php"];

/// Validate the tracker endpoint URL.
///
/// The URL must be non-empty and, unless `skip_suffix_check` is set, end with
/// `matomo.php` or `piwik.php`.
pub fn validate_tracker_url(tracker_url: &str, skip_suffix_check: bool) -> Result<(), Error> {
    if tracker_url.is_empty() {
        return Err(Error::MissingTrackerUrl);
    }
    if !skip_suffix_check
        && !ACCEPTED_SUFFIXES
            .iter()
            .any(|suffix| tracker_url.ends_with(suffix))
    {
        return Err(Error::TrackerUrlSuffix(tracker_url.to_string()));
    }
    Ok(())
}

/// Whether requests to this endpoint go over TLS.
pub fn uses_secure_transport(tracker_url: &str) -> bool {
    tracker_url
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https"))
}

/// Tracker URL split into the pieces a bulk POST is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerTarget {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Path plus any query string; always starts with `/`.
    pub path: String,
}

impl TrackerTarget {
    pub fn parse(tracker_url: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidTrackerUrl(tracker_url.to_string());

        let (scheme, rest) = tracker_url.split_once("://").ok_or_else(invalid)?;
        if scheme.is_empty() {
            return Err(invalid());
        }

        let rest = rest.split('#').next().unwrap_or(rest);
        let (authority, path) = match rest.find(|c: char| c == '/' || c == '?') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        // Credentials are never forwarded.
        let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);

        let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
            // IPv6: [::1]:8080
            let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
            let port = match tail.strip_prefix(':') {
                Some(p) => Some(p.parse::<u16>().map_err(|_| invalid())?),
                None if tail.is_empty() => None,
                None => return Err(invalid()),
            };
            (format!("[{host}]"), port)
        } else {
            match host_port.rsplit_once(':') {
                Some((host, p)) => (
                    host.to_string(),
                    Some(p.parse::<u16>().map_err(|_| invalid())?),
                ),
                None => (host_port.to_string(), None),
            }
        };

        if host.is_empty() || host == "[]" {
            return Err(invalid());
        }

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Ok(Self {
            scheme: scheme.to_lowercase(),
            host: host.to_lowercase(),
            port,
            path,
        })
    }

    /// Reassemble the target as an absolute URL.
    pub fn to_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}{}", self.scheme, self.host, self.path),
            None => format!("{}://{}{}", self.scheme, self.host, self.path),
        }
    }
}
