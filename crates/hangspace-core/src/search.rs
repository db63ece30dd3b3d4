//! Debounced user search.
//!
//! Typing arms a debounce; only the query that survives the quiet period is
//! sent. Every request carries a fresh token and only the response whose
//! token is current may touch the results, so a slow answer to a superseded
//! query can never overwrite a newer one.
//!
//! ```text
//! Idle ──fire──> Loading ──response──> Done | Errored
//!   ^               ^                        │
//!   └──── clear ────┴──────── fire ──────────┘
//! ```

use std::time::Duration;

use hangspace_proto::UserRecord;

use crate::{env::MonotonicInstant, error::RequestError, timer::Timer};

/// Quiet period before a typed query is sent.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Search configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Debounce for typed queries
    pub debounce: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { debounce: DEFAULT_SEARCH_DEBOUNCE }
    }
}

/// Search lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    /// No query
    Idle,
    /// Request in flight
    Loading,
    /// Results shown
    Done,
    /// Last request failed
    Errored(String),
}

/// A search request to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Token the response must carry back
    pub token: u64,
    /// Trimmed query
    pub query: String,
}

/// Debounce and token bookkeeping for one search box.
#[derive(Debug, Clone)]
pub struct SearchSession<I> {
    query: String,
    token: u64,
    status: SearchStatus,
    debounce: Timer<I>,
    results: Vec<UserRecord>,
}

impl<I: MonotonicInstant> SearchSession<I> {
    /// Idle session.
    pub fn new(config: SearchConfig) -> Self {
        Self {
            query: String::new(),
            token: 0,
            status: SearchStatus::Idle,
            debounce: Timer::new(config.debounce),
            results: Vec::new(),
        }
    }

    /// Current (trimmed) query.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Token of the newest request.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Current status.
    pub fn status(&self) -> &SearchStatus {
        &self.status
    }

    /// Results of the newest completed request.
    pub fn results(&self) -> &[UserRecord] {
        &self.results
    }

    /// Whether a typed query is waiting out its debounce.
    pub fn is_debouncing(&self) -> bool {
        self.debounce.is_armed()
    }

    /// Input changed.
    ///
    /// An empty query clears results immediately and invalidates any request
    /// in flight. Anything else (re)arms the debounce.
    pub fn input(&mut self, text: &str, now: I) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.clear();
            return;
        }

        trimmed.clone_into(&mut self.query);
        self.debounce.arm(now);
    }

    /// Enter pressed. Fires immediately and cancels the debounce.
    pub fn submit(&mut self) -> Option<SearchRequest> {
        self.debounce.cancel();
        if self.query.is_empty() {
            return None;
        }
        Some(self.fire())
    }

    /// Fire the debounced query when its quiet period is over.
    pub fn tick(&mut self, now: I) -> Option<SearchRequest> {
        if self.debounce.poll(now) && !self.query.is_empty() {
            return Some(self.fire());
        }
        None
    }

    /// Apply a response.
    ///
    /// Returns `false` and changes nothing if `token` is stale.
    pub fn apply_response(
        &mut self,
        token: u64,
        response: Result<Vec<UserRecord>, RequestError>,
    ) -> bool {
        if token != self.token || self.status != SearchStatus::Loading {
            tracing::debug!(token, current = self.token, "discarding stale search response");
            return false;
        }

        match response {
            Ok(results) => {
                self.results = results;
                self.status = SearchStatus::Done;
            },
            Err(err) => {
                self.results.clear();
                self.status = SearchStatus::Errored(err.to_string());
            },
        }
        true
    }

    /// Reset to idle and invalidate anything in flight.
    pub fn clear(&mut self) {
        self.debounce.cancel();
        self.query.clear();
        self.results.clear();
        self.token += 1;
        self.status = SearchStatus::Idle;
    }

    fn fire(&mut self) -> SearchRequest {
        self.token += 1;
        self.status = SearchStatus::Loading;
        SearchRequest { token: self.token, query: self.query.clone() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use hangspace_proto::UserId;

    use super::*;

    fn session() -> SearchSession<Instant> {
        SearchSession::new(SearchConfig::default())
    }

    fn user(name: &str) -> UserRecord {
        UserRecord {
            id: UserId::from(name),
            username: name.to_string(),
            display_name: None,
            status: None,
        }
    }

    #[test]
    fn rapid_typing_fires_once_for_last_query() {
        let t0 = Instant::now();
        let mut search = session();

        let mut fired = Vec::new();
        for (ms, text) in [(0, "a"), (200, "ab"), (400, "abc")] {
            let now = t0 + Duration::from_millis(ms);
            search.input(text, now);
            fired.extend(search.tick(now));
        }
        fired.extend(search.tick(t0 + Duration::from_millis(899)));
        fired.extend(search.tick(t0 + Duration::from_millis(900)));
        fired.extend(search.tick(t0 + Duration::from_secs(5)));

        assert_eq!(fired, vec![SearchRequest { token: 1, query: "abc".to_string() }]);
        assert_eq!(search.status(), &SearchStatus::Loading);
    }

    #[test]
    fn empty_query_clears_without_request() {
        let t0 = Instant::now();
        let mut search = session();
        search.input("bob", t0);
        let request = search.submit().unwrap();

        search.input("   ", t0);
        assert_eq!(search.status(), &SearchStatus::Idle);
        assert_eq!(search.tick(t0 + Duration::from_secs(1)), None);
        assert!(!search.apply_response(request.token, Ok(vec![user("bob")])));
        assert!(search.results().is_empty());
    }

    #[test]
    fn submit_cancels_debounce() {
        let t0 = Instant::now();
        let mut search = session();
        search.input("  al ", t0);

        let request = search.submit().unwrap();
        assert_eq!(request.query, "al");
        assert_eq!(search.tick(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn stale_response_ignored() {
        let t0 = Instant::now();
        let mut search = session();
        search.input("bob", t0);
        let first = search.submit().unwrap();
        search.input("al", t0);
        let second = search.submit().unwrap();

        assert!(search.apply_response(second.token, Ok(vec![user("alice")])));
        assert!(!search.apply_response(first.token, Ok(vec![user("bob")])));

        assert_eq!(search.status(), &SearchStatus::Done);
        assert_eq!(search.results()[0].username, "alice");
    }

    #[test]
    fn error_then_new_query_reloads() {
        let t0 = Instant::now();
        let mut search = session();
        search.input("bob", t0);
        let request = search.submit().unwrap();

        search.apply_response(request.token, Err(RequestError::Network("offline".into())));
        assert!(matches!(search.status(), SearchStatus::Errored(_)));

        search.input("bobby", t0);
        search.submit().unwrap();
        assert_eq!(search.status(), &SearchStatus::Loading);
    }
}
