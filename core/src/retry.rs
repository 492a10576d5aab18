// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Retry decisions.
//!
//! A [`RetryPolicy`] looks at the outcome of a failed attempt, packed into a
//! [`RetryContext`], and either gives up or returns a [`RetryInfo`] telling
//! the engine where to go next and how long to wait first.

use std::fmt::Debug;
use std::time::Duration;

use http::StatusCode;
use rand::Rng;

use crate::time::{elapsed_since, DateTime};
use crate::{LocationMode, OperationContext, RequestResult, StorageLocation};

/// Retry interval used until a policy sets its own.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(3000);

/// Default number of retries for the built-in policies.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff delta for the built-in policies.
pub const DEFAULT_DELTA_BACKOFF: Duration = Duration::from_secs(30);

/// Default lower bound of the exponential backoff.
pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(3);

/// Default upper bound of the exponential backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(90);

/// Input of one retry decision.
#[derive(Debug, Clone)]
pub struct RetryContext {
    current_retry_count: u32,
    last_request_result: RequestResult,
    location_mode: LocationMode,
    next_location: StorageLocation,
}

impl RetryContext {
    /// Create a new retry context.
    pub fn new(
        current_retry_count: u32,
        last_request_result: RequestResult,
        location_mode: LocationMode,
        next_location: StorageLocation,
    ) -> Self {
        Self {
            current_retry_count,
            last_request_result,
            location_mode,
            next_location,
        }
    }

    /// Number of retries already made, zero for the first decision.
    pub fn current_retry_count(&self) -> u32 {
        self.current_retry_count
    }

    /// Result of the attempt that just failed.
    pub fn last_request_result(&self) -> &RequestResult {
        &self.last_request_result
    }

    /// Location mode in effect for the operation.
    pub fn location_mode(&self) -> LocationMode {
        self.location_mode
    }

    /// Location the engine would try next under the current mode.
    pub fn next_location(&self) -> StorageLocation {
        self.next_location
    }
}

/// Output of a positive retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryInfo {
    target_location: StorageLocation,
    updated_location_mode: LocationMode,
    retry_interval: Duration,
}

impl Default for RetryInfo {
    fn default() -> Self {
        Self {
            target_location: StorageLocation::Primary,
            updated_location_mode: LocationMode::PrimaryOnly,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryInfo {
    /// Retry at the context's next location, keeping its location mode.
    pub fn new(ctx: &RetryContext) -> Self {
        Self {
            target_location: ctx.next_location(),
            updated_location_mode: ctx.location_mode(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Location of the next attempt.
    pub fn target_location(&self) -> StorageLocation {
        self.target_location
    }

    /// Location mode for the rest of the operation.
    pub fn updated_location_mode(&self) -> LocationMode {
        self.updated_location_mode
    }

    /// How long to wait before the next attempt.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Set the location of the next attempt.
    pub fn set_target_location(&mut self, location: StorageLocation) {
        self.target_location = location;
    }

    /// Set the location mode for the rest of the operation.
    pub fn set_updated_location_mode(&mut self, mode: LocationMode) {
        self.updated_location_mode = mode;
    }

    /// Set the wait before the next attempt.
    pub fn set_retry_interval(&mut self, interval: Duration) {
        self.retry_interval = interval;
    }

    /// Set the wait in milliseconds, negative values clamp to zero.
    pub fn set_retry_interval_ms(&mut self, interval_ms: i64) {
        self.retry_interval = Duration::from_millis(interval_ms.max(0) as u64);
    }
}

/// RetryPolicy decides whether and how a failed attempt is retried.
///
/// A policy instance serves exactly one logical operation and may keep state
/// across its decisions. Clients hold a [`RetryPolicyFactory`] instead.
pub trait RetryPolicy: Debug + Send {
    /// Return `None` to stop and surface the last failure.
    fn should_retry(&mut self, ctx: &RetryContext) -> Option<RetryInfo>;
}

/// RetryPolicyFactory creates a fresh policy for every operation.
pub trait RetryPolicyFactory: Debug + Send + Sync + 'static {
    /// Create the policy instance for the operation tracked by `ctx`.
    fn create_instance(&self, ctx: &OperationContext) -> Box<dyn RetryPolicy>;
}

impl<T> RetryPolicyFactory for T
where
    T: RetryPolicy + Clone + Sync + 'static,
{
    fn create_instance(&self, _: &OperationContext) -> Box<dyn RetryPolicy> {
        Box::new(self.clone())
    }
}

/// Remembers when each location was last attempted.
///
/// Two attempts against the same location should be a full interval apart,
/// so time already spent on the other location counts toward the wait.
#[derive(Debug, Clone, Default)]
struct AttemptTracker {
    last_primary_attempt: Option<DateTime>,
    last_secondary_attempt: Option<DateTime>,
}

impl AttemptTracker {
    /// Record the last attempt, returns whether it was a 404 on the secondary.
    fn observe(&mut self, ctx: &RetryContext) -> bool {
        let result = ctx.last_request_result();
        let finished_at = result.stop_time().unwrap_or_else(|| result.start_time());

        match result.target_location() {
            StorageLocation::Primary => self.last_primary_attempt = Some(finished_at),
            StorageLocation::Secondary => self.last_secondary_attempt = Some(finished_at),
        }

        // The resource may not be replicated yet.
        result.target_location() == StorageLocation::Secondary
            && result.status() == Some(StatusCode::NOT_FOUND)
    }

    fn evaluate(
        &self,
        ctx: &RetryContext,
        secondary_not_found: bool,
        delay: Duration,
    ) -> RetryInfo {
        let mut info = RetryInfo::new(ctx);

        if secondary_not_found && ctx.location_mode() != LocationMode::SecondaryOnly {
            info.set_updated_location_mode(LocationMode::PrimaryOnly);
            info.set_target_location(StorageLocation::Primary);
        }

        let last_attempt = match info.target_location() {
            StorageLocation::Primary => self.last_primary_attempt,
            StorageLocation::Secondary => self.last_secondary_attempt,
        };
        let interval = match last_attempt {
            Some(at) => delay.saturating_sub(elapsed_since(at)),
            None => Duration::ZERO,
        };
        info.set_retry_interval(interval);

        info
    }
}

/// Whether a failed attempt with this status may be retried at all.
///
/// Client errors are final, except request timeouts and a 404 caused by
/// replication lag on the secondary. `501` and `505` will never succeed.
fn is_retryable_status(status: Option<StatusCode>, secondary_not_found: bool) -> bool {
    let Some(status) = status else {
        // No response at all, the transport failed.
        return true;
    };

    if status == StatusCode::NOT_IMPLEMENTED || status == StatusCode::HTTP_VERSION_NOT_SUPPORTED {
        return false;
    }

    let code = status.as_u16();
    if (300..500).contains(&code) && status != StatusCode::REQUEST_TIMEOUT {
        return secondary_not_found;
    }

    true
}

/// ExponentialRetry backs off exponentially with jitter. This is the default.
///
/// The delay before retry `n` (zero based) is
/// `min(min_backoff + (2^n - 1) * rand[0.8 * delta, 1.2 * delta), max_backoff)`.
#[derive(Debug, Clone)]
pub struct ExponentialRetry {
    delta_backoff: Duration,
    max_attempts: u32,
    min_backoff: Duration,
    max_backoff: Duration,
    tracker: AttemptTracker,
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self {
            delta_backoff: DEFAULT_DELTA_BACKOFF,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            tracker: AttemptTracker::default(),
        }
    }
}

impl ExponentialRetry {
    /// Create a policy with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backoff delta.
    pub fn with_delta_backoff(mut self, delta: Duration) -> Self {
        self.delta_backoff = delta;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the lower bound of the delay.
    pub fn with_min_backoff(mut self, min_backoff: Duration) -> Self {
        self.min_backoff = min_backoff;
        self
    }

    /// Set the upper bound of the delay.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Maximum number of retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Jittered delay before retry `retry_count`.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let delta_ms = self.delta_backoff.as_millis() as f64;
        let (low, high) = (delta_ms * 0.8, delta_ms * 1.2);
        let sampled = if high > low {
            rand::thread_rng().gen_range(low..high)
        } else {
            low
        };

        let increment = (2f64.powi(retry_count.min(62) as i32) - 1.0) * sampled;
        let delay_ms = (self.min_backoff.as_millis() as f64 + increment)
            .min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(delay_ms.round() as u64)
    }
}

impl RetryPolicy for ExponentialRetry {
    fn should_retry(&mut self, ctx: &RetryContext) -> Option<RetryInfo> {
        let secondary_not_found = self.tracker.observe(ctx);

        if ctx.current_retry_count() >= self.max_attempts {
            return None;
        }
        if !is_retryable_status(ctx.last_request_result().status(), secondary_not_found) {
            return None;
        }

        let delay = self.backoff_for(ctx.current_retry_count());
        Some(self.tracker.evaluate(ctx, secondary_not_found, delay))
    }
}

/// LinearRetry waits the same delta before every retry.
#[derive(Debug, Clone)]
pub struct LinearRetry {
    delta_backoff: Duration,
    max_attempts: u32,
    tracker: AttemptTracker,
}

impl Default for LinearRetry {
    fn default() -> Self {
        Self {
            delta_backoff: DEFAULT_DELTA_BACKOFF,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            tracker: AttemptTracker::default(),
        }
    }
}

impl LinearRetry {
    /// Create a policy waiting `delta_backoff` up to `max_attempts` times.
    pub fn new(delta_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            delta_backoff,
            max_attempts,
            tracker: AttemptTracker::default(),
        }
    }

    /// Maximum number of retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl RetryPolicy for LinearRetry {
    fn should_retry(&mut self, ctx: &RetryContext) -> Option<RetryInfo> {
        let secondary_not_found = self.tracker.observe(ctx);

        if ctx.current_retry_count() >= self.max_attempts {
            return None;
        }
        if !is_retryable_status(ctx.last_request_result().status(), secondary_not_found) {
            return None;
        }

        Some(
            self.tracker
                .evaluate(ctx, secondary_not_found, self.delta_backoff),
        )
    }
}

/// NoRetry never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&mut self, _: &RetryContext) -> Option<RetryInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use http::HeaderMap;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn failed(location: StorageLocation, status: Option<StatusCode>) -> RequestResult {
        let mut result = RequestResult::start(location);
        match status {
            Some(status) => {
                result.record_response(status, &HeaderMap::new());
                result.record_error(&Error::unexpected_status(status));
            }
            None => result.record_error(&Error::transport("connection reset")),
        }
        result.stop();
        result
    }

    fn context(
        retry_count: u32,
        mode: LocationMode,
        last: StorageLocation,
        status: Option<StatusCode>,
    ) -> RetryContext {
        RetryContext::new(
            retry_count,
            failed(last, status),
            mode,
            mode.next_location(last),
        )
    }

    #[test]
    fn test_retry_info_defaults_and_clamping() {
        let mut info = RetryInfo::default();
        assert_eq!(info.retry_interval(), Duration::from_millis(3000));

        info.set_retry_interval_ms(-250);
        assert_eq!(info.retry_interval(), Duration::ZERO);

        info.set_retry_interval_ms(1500);
        assert_eq!(info.retry_interval(), Duration::from_millis(1500));
    }

    #[test]
    fn test_primary_then_secondary_alternates_target() {
        let mut policy = LinearRetry::new(Duration::from_millis(10), 3);
        let mode = LocationMode::PrimaryThenSecondary;

        let first = policy
            .should_retry(&context(
                0,
                mode,
                StorageLocation::Primary,
                Some(StatusCode::INTERNAL_SERVER_ERROR),
            ))
            .expect("must retry");
        assert_eq!(first.target_location(), StorageLocation::Secondary);
        assert_eq!(first.updated_location_mode(), mode);
        // The secondary was never tried, so there is nothing to wait for.
        assert_eq!(first.retry_interval(), Duration::ZERO);

        let second = policy
            .should_retry(&context(1, mode, StorageLocation::Secondary, None))
            .expect("must retry");
        assert_eq!(second.target_location(), StorageLocation::Primary);
        assert_eq!(second.updated_location_mode(), mode);
        assert!(second.retry_interval() <= Duration::from_millis(10));
    }

    #[test]
    fn test_single_location_mode_waits_full_interval() {
        let mut policy = LinearRetry::new(Duration::from_secs(60), 3);

        let info = policy
            .should_retry(&context(
                0,
                LocationMode::PrimaryOnly,
                StorageLocation::Primary,
                Some(StatusCode::SERVICE_UNAVAILABLE),
            ))
            .expect("must retry");

        assert_eq!(info.target_location(), StorageLocation::Primary);
        assert!(info.retry_interval() > Duration::from_secs(59));
    }

    #[test_case(StatusCode::BAD_REQUEST, false)]
    #[test_case(StatusCode::FORBIDDEN, false)]
    #[test_case(StatusCode::NOT_FOUND, false)]
    #[test_case(StatusCode::CONFLICT, false)]
    #[test_case(StatusCode::REQUEST_TIMEOUT, true)]
    #[test_case(StatusCode::INTERNAL_SERVER_ERROR, true)]
    #[test_case(StatusCode::NOT_IMPLEMENTED, false)]
    #[test_case(StatusCode::SERVICE_UNAVAILABLE, true)]
    #[test_case(StatusCode::HTTP_VERSION_NOT_SUPPORTED, false)]
    fn test_primary_status_classification(status: StatusCode, retry: bool) {
        let mut policy = ExponentialRetry::new();
        let decision = policy.should_retry(&context(
            0,
            LocationMode::PrimaryOnly,
            StorageLocation::Primary,
            Some(status),
        ));
        assert_eq!(decision.is_some(), retry, "status {status}");
    }

    #[test]
    fn test_secondary_not_found_pins_primary() {
        let mut policy = ExponentialRetry::new();
        let info = policy
            .should_retry(&context(
                0,
                LocationMode::SecondaryThenPrimary,
                StorageLocation::Secondary,
                Some(StatusCode::NOT_FOUND),
            ))
            .expect("404 on secondary must be retried");

        assert_eq!(info.target_location(), StorageLocation::Primary);
        assert_eq!(info.updated_location_mode(), LocationMode::PrimaryOnly);
    }

    #[test]
    fn test_secondary_only_not_found_stays_on_secondary() {
        let mut policy = ExponentialRetry::new();
        let info = policy
            .should_retry(&context(
                0,
                LocationMode::SecondaryOnly,
                StorageLocation::Secondary,
                Some(StatusCode::NOT_FOUND),
            ))
            .expect("404 on secondary must be retried");

        assert_eq!(info.target_location(), StorageLocation::Secondary);
        assert_eq!(info.updated_location_mode(), LocationMode::SecondaryOnly);
    }

    #[test]
    fn test_stops_after_max_attempts() {
        let mut policy = ExponentialRetry::new().with_max_attempts(2);
        let status = Some(StatusCode::INTERNAL_SERVER_ERROR);

        for count in 0..2 {
            assert!(policy
                .should_retry(&context(
                    count,
                    LocationMode::PrimaryOnly,
                    StorageLocation::Primary,
                    status
                ))
                .is_some());
        }
        assert!(policy
            .should_retry(&context(
                2,
                LocationMode::PrimaryOnly,
                StorageLocation::Primary,
                status
            ))
            .is_none());
    }

    #[test]
    fn test_no_retry_never_retries() {
        let mut policy = NoRetry;
        assert!(policy
            .should_retry(&context(
                0,
                LocationMode::PrimaryOnly,
                StorageLocation::Primary,
                None
            ))
            .is_none());
    }

    #[test]
    fn test_exponential_backoff_is_monotonic_and_capped() {
        let cap = Duration::from_secs(90);
        let policy = ExponentialRetry::new()
            .with_delta_backoff(Duration::from_secs(4))
            .with_max_backoff(cap);

        for _ in 0..64 {
            let mut previous = Duration::ZERO;
            for n in 0..12 {
                let delay = policy.backoff_for(n);
                assert!(delay >= previous, "delay for {n} went down");
                assert!(delay <= cap, "delay for {n} exceeded cap");
                previous = delay;
            }
        }
        assert_eq!(policy.backoff_for(0), DEFAULT_MIN_BACKOFF);
        assert_eq!(policy.backoff_for(40), cap);
    }

    #[test]
    fn test_factory_creates_independent_instances() {
        let factory: &dyn RetryPolicyFactory = &LinearRetry::new(Duration::from_secs(60), 3);
        let ctx = OperationContext::new();

        let mut first = factory.create_instance(&ctx);
        let _ = first.should_retry(&context(
            0,
            LocationMode::PrimaryOnly,
            StorageLocation::Primary,
            None,
        ));

        // A fresh instance has never seen the secondary attempt history of
        // the first one, so its first look at the secondary waits zero.
        let mut second = factory.create_instance(&ctx);
        let info = second
            .should_retry(&context(
                0,
                LocationMode::SecondaryThenPrimary,
                StorageLocation::Primary,
                None,
            ))
            .expect("must retry");
        assert_eq!(info.target_location(), StorageLocation::Secondary);
        assert_eq!(info.retry_interval(), Duration::ZERO);
    }
}
