//! Rate-Limited Resolver Client
//!
//! Wraps a [`CatalogSearch`] backend with the shared rate-limit bucket, a
//! retry policy for transient failures and a fan-out cap.
//!
//! **Retry algorithm:**
//! 1. Take a token (every attempt, retries included)
//! 2. Stop if the run deadline passed or the run was cancelled, otherwise
//!    attempt the search
//! 3. On success, return the results
//! 4. On a transient failure (network, 5xx, 429) with attempts remaining:
//!    sleep for the server's retry-after hint if one was given, otherwise
//!    for the exponential backoff delay, then go to 1
//! 5. Otherwise fail with `SearchFailed`
//!
//! **Backoff:** `base_delay * 2^(attempt-1)`, capped at `max_delay`.
//!
//! One client instance owns one bucket; share it behind an `Arc` to share
//! quota.
//!
//! Waiting for a permit, a token or a backoff delay races the caller's
//! [`StopSignal`], so no search is dispatched after the run deadline.

use crate::error::{CatalogError, ResolveError};
use crate::rate_limiter::RateLimiter;
use crate::sources::CatalogSearch;
use crate::types::CatalogSearchResult;
use spinlist_common::config::ResolverConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Run deadline and cancellation, checked before every catalog search
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    deadline_at: Option<Instant>,
    cancel_token: CancellationToken,
}

impl StopSignal {
    pub fn new(deadline_at: Option<Instant>, cancel_token: CancellationToken) -> Self {
        Self {
            deadline_at,
            cancel_token,
        }
    }

    /// `Stopped` if the run was cancelled or its deadline has passed
    pub fn check(&self) -> Result<(), ResolveError> {
        if self.cancel_token.is_cancelled() {
            return Err(ResolveError::Stopped { cancelled: true });
        }
        if self.deadline_at.map_or(false, |d| Instant::now() >= d) {
            return Err(ResolveError::Stopped { cancelled: false });
        }
        Ok(())
    }

    /// Drive `fut` unless the run stops first
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, ResolveError> {
        let deadline = async {
            match self.deadline_at {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(ResolveError::Stopped { cancelled: true }),
            _ = deadline => Err(ResolveError::Stopped { cancelled: false }),
            output = fut => Ok(output),
        }
    }
}

/// Retry policy for transient catalog failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Computed backoff after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before the next attempt; a retry-after hint takes precedence
    pub fn delay_for(&self, attempt: u32, error: &CatalogError) -> Duration {
        error.retry_after().unwrap_or_else(|| self.backoff(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

/// Rate-limited, retrying catalog client
pub struct ResolverClient {
    search: Arc<dyn CatalogSearch>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    in_flight: Semaphore,
    fan_out: usize,
}

impl ResolverClient {
    pub fn new(
        search: Arc<dyn CatalogSearch>,
        limiter: RateLimiter,
        retry: RetryPolicy,
        fan_out: usize,
    ) -> Self {
        let fan_out = fan_out.max(1);
        Self {
            search,
            limiter,
            retry,
            in_flight: Semaphore::new(fan_out),
            fan_out,
        }
    }

    pub fn from_config(search: Arc<dyn CatalogSearch>, config: &ResolverConfig) -> Self {
        let limiter = RateLimiter::new(
            config.requests_per_window,
            Duration::from_secs(config.window_secs),
            Duration::from_millis(config.max_wait_ms),
        );
        Self::new(search, limiter, RetryPolicy::from_config(config), config.fan_out)
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out
    }

    /// Search the catalog for one (artist, title) pair, with no deadline
    pub async fn resolve(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<CatalogSearchResult>, ResolveError> {
        self.resolve_until(artist, title, &StopSignal::default()).await
    }

    /// Search the catalog for one (artist, title) pair
    ///
    /// # Errors
    /// - `RateLimitTimeout` if a token was not available within the maximum wait
    /// - `SearchFailed` on a non-transient failure or once attempts run out
    /// - `Stopped` if `stop` fires before a search is dispatched
    pub async fn resolve_until(
        &self,
        artist: &str,
        title: &str,
        stop: &StopSignal,
    ) -> Result<Vec<CatalogSearchResult>, ResolveError> {
        // The semaphore is never closed
        let _permit = stop.guard(self.in_flight.acquire()).await?.ok();

        let mut attempt = 0u32;

        loop {
            attempt += 1;

            stop.guard(self.limiter.acquire()).await??;
            stop.check()?;

            if attempt > 1 {
                tracing::debug!(
                    artist = %artist,
                    title = %title,
                    attempt,
                    "Retrying catalog search"
                );
            }

            match self.search.search(artist, title).await {
                Ok(results) => {
                    if attempt > 1 {
                        tracing::info!(
                            artist = %artist,
                            title = %title,
                            attempt,
                            "Catalog search succeeded after retry"
                        );
                    }
                    return Ok(results);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt, &err);
                    tracing::warn!(
                        artist = %artist,
                        title = %title,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient catalog failure, backing off"
                    );
                    stop.guard(tokio::time::sleep(delay)).await?;
                }
                Err(err) => {
                    tracing::warn!(
                        artist = %artist,
                        title = %title,
                        attempt,
                        transient = err.is_transient(),
                        error = %err,
                        "Catalog search failed"
                    );
                    return Err(ResolveError::SearchFailed {
                        attempts: attempt,
                        cause: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted responses and records when each attempt happened
    struct ScriptedSearch {
        responses: Mutex<VecDeque<Result<Vec<CatalogSearchResult>, CatalogError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedSearch {
        fn new(responses: Vec<Result<Vec<CatalogSearchResult>, CatalogError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CatalogSearch for ScriptedSearch {
        async fn search(
            &self,
            _artist: &str,
            _title: &str,
        ) -> Result<Vec<CatalogSearchResult>, CatalogError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn creep() -> CatalogSearchResult {
        CatalogSearchResult {
            artist: "Radiohead".into(),
            title: "Creep".into(),
            album: None,
            service_id: "1".into(),
            service_uri: "https://musicbrainz.org/recording/1".into(),
        }
    }

    fn config(max_attempts: u32) -> ResolverConfig {
        ResolverConfig {
            max_attempts,
            ..ResolverConfig::default()
        }
    }

    const THROTTLED: CatalogError = CatalogError::TooManyRequests { retry_after: None };

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(1000),
            max_attempts: 10,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(1000));
        assert_eq!(policy.backoff(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_retry_after_takes_precedence() {
        let policy = RetryPolicy::default();
        let hinted = CatalogError::TooManyRequests {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(policy.delay_for(1, &hinted), Duration::from_secs(7));
        assert_eq!(policy.delay_for(1, &THROTTLED), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_429s_then_success() {
        let search = ScriptedSearch::new(vec![
            Err(THROTTLED),
            Err(THROTTLED),
            Err(THROTTLED),
            Ok(vec![creep()]),
        ]);
        let client = ResolverClient::from_config(search.clone(), &config(4));

        let results = client.resolve("Radiohead", "Creep").await.unwrap();
        assert_eq!(results, vec![creep()]);

        let calls = search.call_times();
        assert_eq!(calls.len(), 4);
        assert!(calls.len() as u32 <= client.retry.max_attempts);

        let delays: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(delays.windows(2).all(|d| d[0] <= d[1]), "delays {:?}", delays);
        assert!(delays[0] >= Duration::from_millis(250));
        assert!(delays[2] >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let search = ScriptedSearch::new(vec![
            Err(CatalogError::Server(503)),
            Err(CatalogError::Server(503)),
            Err(CatalogError::Server(503)),
            Ok(vec![creep()]),
        ]);
        let client = ResolverClient::from_config(search.clone(), &config(3));

        let result = client.resolve("Radiohead", "Creep").await;
        assert_eq!(
            result,
            Err(ResolveError::SearchFailed {
                attempts: 3,
                cause: CatalogError::Server(503)
            })
        );
        assert_eq!(search.call_times().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_fails_immediately() {
        let auth = CatalogError::Client {
            status: 401,
            message: "unauthorized".into(),
        };
        let search = ScriptedSearch::new(vec![Err(auth.clone()), Ok(vec![creep()])]);
        let client = ResolverClient::from_config(search.clone(), &config(3));

        let result = client.resolve("Radiohead", "Creep").await;
        assert_eq!(
            result,
            Err(ResolveError::SearchFailed {
                attempts: 1,
                cause: auth
            })
        );
        assert_eq!(search.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hinted_429_waits_for_hint() {
        let search = ScriptedSearch::new(vec![
            Err(CatalogError::TooManyRequests {
                retry_after: Some(Duration::from_secs(30)),
            }),
            Ok(vec![creep()]),
        ]);
        let client = ResolverClient::from_config(search.clone(), &config(3));

        client.resolve("Radiohead", "Creep").await.unwrap();

        let calls = search.call_times();
        assert!(calls[1] - calls[0] >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_consumes_a_token() {
        let search = ScriptedSearch::new(vec![Err(THROTTLED), Ok(vec![creep()])]);
        let client = ResolverClient::from_config(
            search,
            &ResolverConfig {
                requests_per_window: 5,
                ..ResolverConfig::default()
            },
        );

        client.resolve("Radiohead", "Creep").await.unwrap();
        assert_eq!(client.limiter.available().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_token_wait_short() {
        let search = ScriptedSearch::new(vec![]);
        let client = ResolverClient::from_config(
            search.clone(),
            &ResolverConfig {
                requests_per_window: 1,
                ..ResolverConfig::default()
            },
        );
        let stop = StopSignal::new(
            Some(Instant::now() + Duration::from_secs(5)),
            CancellationToken::new(),
        );

        client.resolve_until("A", "B", &stop).await.unwrap();

        let started = Instant::now();
        let result = client.resolve_until("C", "D", &stop).await;

        assert_eq!(result, Err(ResolveError::Stopped { cancelled: false }));
        assert_eq!(search.call_times().len(), 1);
        assert!(Instant::now() - started <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retries() {
        let search = ScriptedSearch::new(vec![
            Err(CatalogError::TooManyRequests {
                retry_after: Some(Duration::from_secs(30)),
            }),
            Ok(vec![creep()]),
        ]);
        let client = ResolverClient::from_config(search.clone(), &config(3));
        let stop = StopSignal::new(
            Some(Instant::now() + Duration::from_secs(10)),
            CancellationToken::new(),
        );

        let result = client.resolve_until("Radiohead", "Creep", &stop).await;

        assert_eq!(result, Err(ResolveError::Stopped { cancelled: false }));
        assert_eq!(search.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_token_wait() {
        let search = ScriptedSearch::new(vec![]);
        let client = Arc::new(ResolverClient::from_config(
            search.clone(),
            &ResolverConfig {
                requests_per_window: 1,
                ..ResolverConfig::default()
            },
        ));
        let cancel_token = CancellationToken::new();
        let stop = StopSignal::new(None, cancel_token.clone());

        client.resolve_until("A", "B", &stop).await.unwrap();

        let waiting = {
            let client = client.clone();
            let stop = stop.clone();
            tokio::spawn(async move { client.resolve_until("C", "D", &stop).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel_token.cancel();

        let result = waiting.await.unwrap();
        assert_eq!(result, Err(ResolveError::Stopped { cancelled: true }));
        assert_eq!(search.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_timeout_surfaces() {
        let search = ScriptedSearch::new(vec![]);
        let client = ResolverClient::from_config(
            search,
            &ResolverConfig {
                requests_per_window: 1,
                max_wait_ms: 10,
                ..ResolverConfig::default()
            },
        );

        client.resolve("A", "B").await.unwrap();
        let result = client.resolve("A", "B").await;
        assert!(matches!(result, Err(ResolveError::RateLimitTimeout { .. })));
    }
}
