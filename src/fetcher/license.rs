use crate::db::{LicenseCache, LicenseSource};
use crate::error::DiscoveryError;
use crate::model::RepositoryCandidate;
use serde::Serialize;
use std::sync::Arc;

pub trait LicenseLookup: Send + Sync {
    fn license(&self, owner: &str, name: &str) -> Result<Option<String>, DiscoveryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseOrigin {
    Inline,
    Cache,
    Remote,
    Unknown,
}

impl LicenseOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseOrigin::Inline => "inline",
            LicenseOrigin::Cache => "cache",
            LicenseOrigin::Remote => "remote",
            LicenseOrigin::Unknown => "unknown",
        }
    }
}

/// Best-effort license detection: inline key, then cache, then the remote endpoint.
#[derive(Clone, Default)]
pub struct LicenseResolver {
    cache: Option<LicenseCache>,
    remote: Option<Arc<dyn LicenseLookup>>,
}

impl LicenseResolver {
    pub fn new(cache: Option<LicenseCache>, remote: Option<Arc<dyn LicenseLookup>>) -> Self {
        Self { cache, remote }
    }

    pub fn resolve(&self, candidate: &RepositoryCandidate) -> (Option<String>, LicenseOrigin) {
        let full_name = candidate.full_name();
        if let Some(key) = candidate.license_key.as_deref().filter(|k| !k.is_empty()) {
            self.store(&full_name, Some(key), LicenseSource::Search);
            return (Some(key.to_string()), LicenseOrigin::Inline);
        }

        if let Some(cache) = &self.cache {
            match cache.get(&full_name) {
                Ok(Some(hit)) => return (hit.license_key, LicenseOrigin::Cache),
                Ok(None) => {}
                Err(err) => tracing::warn!(repo = %full_name, error = %err, "license cache read failed"),
            }
        }

        let Some(remote) = &self.remote else {
            return (None, LicenseOrigin::Unknown);
        };
        match remote.license(&candidate.owner, &candidate.name) {
            Ok(key) => {
                self.store(&full_name, key.as_deref(), LicenseSource::Api);
                (key, LicenseOrigin::Remote)
            }
            Err(err) => {
                // Not cached: a transient failure should not pin a negative result.
                tracing::warn!(repo = %full_name, error = %err, "license lookup failed");
                (None, LicenseOrigin::Unknown)
            }
        }
    }

    fn store(&self, full_name: &str, key: Option<&str>, source: LicenseSource) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(full_name, key, source) {
                tracing::warn!(repo = %full_name, error = %err, "license cache write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingLookup {
        calls: Mutex<u32>,
        answer: Option<String>,
    }

    impl LicenseLookup for CountingLookup {
        fn license(&self, _owner: &str, _name: &str) -> Result<Option<String>, DiscoveryError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.answer.clone())
        }
    }

    fn candidate(license: Option<&str>) -> RepositoryCandidate {
        RepositoryCandidate {
            owner: "acme".into(),
            name: "lib".into(),
            html_url: "https://github.com/acme/lib".into(),
            clone_url: "https://github.com/acme/lib.git".into(),
            stars: 10,
            pushed_at: None,
            default_branch: None,
            license_key: license.map(String::from),
        }
    }

    #[test]
    fn negative_remote_results_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LicenseCache::open(&dir.path().join("l.sqlite")).unwrap();
        let lookup = Arc::new(CountingLookup {
            calls: Mutex::new(0),
            answer: None,
        });
        let resolver = LicenseResolver::new(Some(cache), Some(lookup.clone()));

        assert_eq!(resolver.resolve(&candidate(None)), (None, LicenseOrigin::Remote));
        assert_eq!(resolver.resolve(&candidate(None)), (None, LicenseOrigin::Cache));
        assert_eq!(*lookup.calls.lock().unwrap(), 1);
    }

    #[test]
    fn inline_key_wins() {
        let lookup = Arc::new(CountingLookup {
            calls: Mutex::new(0),
            answer: Some("gpl-3.0".into()),
        });
        let resolver = LicenseResolver::new(None, Some(lookup.clone()));
        assert_eq!(
            resolver.resolve(&candidate(Some("mit"))),
            (Some("mit".to_string()), LicenseOrigin::Inline)
        );
        assert_eq!(*lookup.calls.lock().unwrap(), 0);
    }
}
