//! App id authorization
//!
//! Before any challenge reaches the device, every app id a request names
//! must authorize the requesting origin. The checking engine sits behind
//! [`AppIdChecker`]; [`AppIdAuthorizer`] is what ceremonies talk to.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::countdown::CountdownTimer;

/// One app id check for one origin
#[async_trait]
pub trait AppIdChecker: Send {
    /// True only if every app id authorizes the origin
    async fn do_check(&mut self) -> bool;

    /// Cancel any in-flight work; safe to call more than once
    fn close(&mut self);
}

/// Creates app id checkers
pub trait AppIdCheckerFactory: Send + Sync {
    fn create(
        &self,
        timer: CountdownTimer,
        origin: &str,
        app_ids: Vec<String>,
        allow_http: bool,
        log_msg_url: Option<&str>,
    ) -> Box<dyn AppIdChecker>;
}

/// Whether http app ids may be accepted for `origin`
///
/// Only a page that is itself served over http gets this. It mirrors the
/// page's own scheme and is a deliberate weakening.
pub fn allow_http_for(origin: &str) -> bool {
    origin.starts_with("http://")
}

/// Distinct app ids, in first-seen order
pub fn distinct_app_ids<'a>(app_ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    app_ids
        .into_iter()
        .filter(|app_id| seen.insert(*app_id))
        .map(str::to_owned)
        .collect()
}

/// Ceremony-facing wrapper around an [`AppIdChecker`]
pub struct AppIdAuthorizer {
    factory: Arc<dyn AppIdCheckerFactory>,
    timer: CountdownTimer,
    checker: Option<Box<dyn AppIdChecker>>,
    closed: bool,
}

impl AppIdAuthorizer {
    /// The authorizer gets its own copy of the ceremony timer
    pub fn new(factory: Arc<dyn AppIdCheckerFactory>, timer: &CountdownTimer) -> Self {
        Self {
            factory,
            timer: timer.clone_timer(),
            checker: None,
            closed: false,
        }
    }

    /// Check that all distinct `app_ids` authorize `origin`
    pub async fn check(
        &mut self,
        app_ids: &[String],
        origin: &str,
        allow_http: bool,
        log_msg_url: Option<&str>,
    ) -> bool {
        if self.closed {
            return false;
        }

        let app_ids = distinct_app_ids(app_ids.iter().map(String::as_str));
        if app_ids.is_empty() {
            return false;
        }

        let remaining = self.timer.remaining();
        let checker = self.checker.insert(self.factory.create(
            self.timer.clone_timer(),
            origin,
            app_ids,
            allow_http,
            log_msg_url,
        ));

        match tokio::time::timeout(remaining, checker.do_check()).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("App id check failed for origin {}", origin);
                false
            }
            Err(_) => {
                warn!("App id check for origin {} timed out", origin);
                false
            }
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
        if let Some(mut checker) = self.checker.take() {
            checker.close();
        }
    }
}

/// Checks app ids against the origin itself and a configured facet list
///
/// No app id files are fetched: an app id authorizes an origin when it is
/// same-origin with it, or when the facet list names the origin for it.
#[derive(Debug, Clone, Default)]
pub struct LocalAppIdCheckerFactory {
    trusted_facets: Arc<HashMap<String, Vec<String>>>,
}

impl LocalAppIdCheckerFactory {
    pub fn new(trusted_facets: HashMap<String, Vec<String>>) -> Self {
        Self {
            trusted_facets: Arc::new(trusted_facets),
        }
    }
}

impl AppIdCheckerFactory for LocalAppIdCheckerFactory {
    fn create(
        &self,
        timer: CountdownTimer,
        origin: &str,
        app_ids: Vec<String>,
        allow_http: bool,
        _log_msg_url: Option<&str>,
    ) -> Box<dyn AppIdChecker> {
        Box::new(LocalAppIdChecker {
            timer,
            origin: origin.to_string(),
            app_ids,
            allow_http,
            trusted_facets: Arc::clone(&self.trusted_facets),
            closed: false,
        })
    }
}

struct LocalAppIdChecker {
    timer: CountdownTimer,
    origin: String,
    app_ids: Vec<String>,
    allow_http: bool,
    trusted_facets: Arc<HashMap<String, Vec<String>>>,
    closed: bool,
}

impl LocalAppIdChecker {
    fn authorizes(&self, app_id: &str) -> bool {
        let url = match Url::parse(app_id) {
            Ok(url) => url,
            Err(e) => {
                debug!("App id {} is not a URL: {}", app_id, e);
                return false;
            }
        };

        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            scheme => {
                debug!("App id {} has disallowed scheme {}", app_id, scheme);
                return false;
            }
        }

        if url.origin().ascii_serialization() == self.origin {
            return true;
        }

        self.trusted_facets
            .get(app_id)
            .is_some_and(|facets| facets.iter().any(|facet| facet == &self.origin))
    }
}

#[async_trait]
impl AppIdChecker for LocalAppIdChecker {
    async fn do_check(&mut self) -> bool {
        if self.closed || self.timer.expired() {
            return false;
        }
        self.app_ids.iter().all(|app_id| self.authorizes(app_id))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timer() -> CountdownTimer {
        CountdownTimer::new(Duration::from_secs(30))
    }

    fn local(facets: &[(&str, &str)]) -> Arc<dyn AppIdCheckerFactory> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (app_id, origin) in facets {
            map.entry(app_id.to_string())
                .or_default()
                .push(origin.to_string());
        }
        Arc::new(LocalAppIdCheckerFactory::new(map))
    }

    async fn check(factory: Arc<dyn AppIdCheckerFactory>, app_ids: &[&str], origin: &str) -> bool {
        let mut authorizer = AppIdAuthorizer::new(factory, &timer());
        let app_ids: Vec<String> = app_ids.iter().map(|s| s.to_string()).collect();
        authorizer
            .check(&app_ids, origin, allow_http_for(origin), None)
            .await
    }

    #[test]
    fn test_allow_http_follows_origin_scheme() {
        assert!(allow_http_for("http://intranet"));
        assert!(!allow_http_for("https://example.com"));
    }

    #[test]
    fn test_distinct_keeps_first_order() {
        let ids = distinct_app_ids(["b", "a", "b", "c", "a"]);
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_same_origin_app_id_allowed() {
        let factory = local(&[]);
        assert!(check(factory, &["https://example.com/app.json"], "https://example.com").await);
    }

    #[tokio::test]
    async fn test_foreign_app_id_denied_unless_trusted() {
        let app_id = "https://login.example.com/facets";
        assert!(!check(local(&[]), &[app_id], "https://mail.example.com").await);
        assert!(
            check(
                local(&[(app_id, "https://mail.example.com")]),
                &[app_id],
                "https://mail.example.com"
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_every_app_id_must_authorize() {
        let ids = ["https://example.com", "https://other.example"];
        assert!(!check(local(&[]), &ids, "https://example.com").await);
    }

    #[tokio::test]
    async fn test_http_app_id_needs_http_origin() {
        assert!(check(local(&[]), &["http://intranet"], "http://intranet").await);
        assert!(!check(local(&[]), &["http://example.com"], "https://example.com").await);
    }

    #[tokio::test]
    async fn test_empty_app_ids_denied() {
        assert!(!check(local(&[]), &[], "https://example.com").await);
    }

    struct StalledChecker;

    #[async_trait]
    impl AppIdChecker for StalledChecker {
        async fn do_check(&mut self) -> bool {
            std::future::pending().await
        }

        fn close(&mut self) {}
    }

    struct StalledFactory;

    impl AppIdCheckerFactory for StalledFactory {
        fn create(
            &self,
            _timer: CountdownTimer,
            _origin: &str,
            _app_ids: Vec<String>,
            _allow_http: bool,
            _log_msg_url: Option<&str>,
        ) -> Box<dyn AppIdChecker> {
            Box::new(StalledChecker)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_check_fails_at_deadline() {
        let mut authorizer = AppIdAuthorizer::new(
            Arc::new(StalledFactory),
            &CountdownTimer::new(Duration::from_secs(3)),
        );
        let ids = vec!["https://example.com".to_string()];

        assert!(!authorizer.check(&ids, "https://example.com", false, None).await);
    }

    #[tokio::test]
    async fn test_closed_authorizer_denies() {
        let mut authorizer = AppIdAuthorizer::new(local(&[]), &timer());
        authorizer.close();
        authorizer.close();

        let ids = vec!["https://example.com".to_string()];
        assert!(!authorizer.check(&ids, "https://example.com", false, None).await);
    }
}
