//! In-memory cache for the short-lived session token.
//!
//! The token is derived from the long-lived API key and is never persisted.
//! There is no locking: two callers racing on an expired token may both
//! fetch, which the server tolerates.

use chrono::{DateTime, Duration, Utc};

/// Session tokens are valid for 8 minutes server-side; refresh well before.
pub const TOKEN_TTL_MINUTES: i64 = 5;

#[derive(Clone)]
pub struct SessionToken {
    value: String,
    issued_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= Duration::minutes(TOKEN_TTL_MINUTES)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &crate::auth::MASK)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc>>;

pub struct SessionTokenCache {
    token: Option<SessionToken>,
    clock: Clock,
}

impl Default for SessionTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTokenCache {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + 'static) -> Self {
        Self {
            token: None,
            clock: Box::new(clock),
        }
    }

    /// Return the cached token, calling `fetch` only when it is absent or
    /// expired. Errors from `fetch` propagate and leave the cache untouched.
    pub fn get_token<F, E>(&mut self, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        let now = (self.clock)();
        if let Some(token) = &self.token {
            if !token.is_expired(now) {
                tracing::debug!("Using cached session token");
                return Ok(token.value.clone());
            }
            tracing::debug!("Session token expired, fetching a new one");
        }

        let value = fetch()?;
        self.token = Some(SessionToken {
            value: value.clone(),
            issued_at: now,
        });
        Ok(value)
    }

    /// Drop the cached token so the next call fetches.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    pub fn current(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fake_clock() -> (Rc<Cell<DateTime<Utc>>>, SessionTokenCache) {
        let now = Rc::new(Cell::new(Utc::now()));
        let handle = now.clone();
        (now, SessionTokenCache::with_clock(move || handle.get()))
    }

    #[test]
    fn test_fetches_once_within_window() {
        let (now, mut cache) = fake_clock();
        let calls = Cell::new(0);
        let fetch = || -> Result<String, ()> {
            calls.set(calls.get() + 1);
            Ok(format!("token-{}", calls.get()))
        };

        assert_eq!(cache.get_token(fetch), Ok("token-1".to_string()));
        now.set(now.get() + Duration::minutes(4));
        assert_eq!(cache.get_token(fetch), Ok("token-1".to_string()));
        assert_eq!(calls.get(), 1);

        now.set(now.get() + Duration::minutes(1));
        assert_eq!(cache.get_token(fetch), Ok("token-2".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_fetch_error_propagates() {
        let (_now, mut cache) = fake_clock();
        let result: Result<String, &str> = cache.get_token(|| Err("unreachable"));
        assert_eq!(result, Err("unreachable"));
        assert!(cache.current().is_none());

        let result: Result<String, &str> = cache.get_token(|| Ok("fresh".to_string()));
        assert_eq!(result, Ok("fresh".to_string()));
    }

    #[test]
    fn test_invalidate_forces_fetch() {
        let (_now, mut cache) = fake_clock();
        let calls = Cell::new(0);
        let fetch = || -> Result<String, ()> {
            calls.set(calls.get() + 1);
            Ok("t".to_string())
        };
        cache.get_token(fetch).unwrap();
        cache.invalidate();
        cache.get_token(fetch).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_debug_masks_value() {
        let (_now, mut cache) = fake_clock();
        cache
            .get_token(|| Ok::<_, ()>("super-secret-token".to_string()))
            .unwrap();
        let debug = format!("{:?}", cache.current().unwrap());
        assert!(!debug.contains("super-secret-token"));
    }
}
