//! Daemon-down detection over raw worker output.
//!
//! Vendor error wording differs across engine versions and platforms, so the
//! phrase list is best effort. Callers can swap in any predicate.

/// Phrases that indicate the container engine daemon is unreachable.
pub const DEFAULT_DAEMON_DOWN_PHRASES: &[&str] = &[
    "cannot connect to the docker daemon",
    "is the docker daemon running",
    "connection refused",
    "docker daemon is not running",
    "error response from daemon",
    "dial unix",
    "connection to docker daemon failed",
];

/// User-facing text for [`crate::types::FailureKind::EngineUnavailable`].
pub const DEFAULT_ENGINE_UNAVAILABLE_MESSAGE: &str =
    "Docker engine is not running. Please start Docker Desktop or Docker service.";

pub trait DaemonDownDetector: Send + Sync {
    fn is_daemon_down(&self, stdout: &str, stderr: &str) -> bool;
}

impl<F> DaemonDownDetector for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_daemon_down(&self, stdout: &str, stderr: &str) -> bool {
        self(stdout, stderr)
    }
}

/// Case-insensitive substring match against either stream.
#[derive(Debug, Clone)]
pub struct PhraseDetector {
    phrases: Vec<String>,
}

impl PhraseDetector {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for PhraseDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DAEMON_DOWN_PHRASES)
    }
}

impl DaemonDownDetector for PhraseDetector {
    fn is_daemon_down(&self, stdout: &str, stderr: &str) -> bool {
        let out = stdout.to_lowercase();
        let err = stderr.to_lowercase();
        self.phrases
            .iter()
            .any(|p| out.contains(p.as_str()) || err.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_phrases_case_insensitive() {
        let d = PhraseDetector::default();
        assert!(d.is_daemon_down(
            "",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?"
        ));
        assert!(d.is_daemon_down("CONNECTION REFUSED", ""));
        assert!(!d.is_daemon_down("all good", "warning: something else"));
    }

    #[test]
    fn test_custom_phrases_replace_defaults() {
        let d = PhraseDetector::new(["podman socket missing", "  "]);
        assert_eq!(d.phrases().len(), 1);
        assert!(d.is_daemon_down("Podman Socket Missing", ""));
        assert!(!d.is_daemon_down("connection refused", ""));
    }

    #[test]
    fn test_closure_is_a_detector() {
        let d = |out: &str, _err: &str| out.starts_with("down");
        assert!(d.is_daemon_down("down!", ""));
        assert!(!d.is_daemon_down("up", "down"));
    }
}
