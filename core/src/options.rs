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

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{ClientDefaults, LocationMode, RetryPolicyFactory};

/// Per-call overrides of the client defaults.
///
/// Every field is optional. Unset fields are filled from the client when the
/// options are resolved for an operation.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    retry_policy_factory: Option<Arc<dyn RetryPolicyFactory>>,
    timeout: Option<Duration>,
    location_mode: Option<LocationMode>,
    maximum_execution_time: Option<Duration>,
    operation_expiry_time: Option<Instant>,
}

impl RequestOptions {
    /// Create options that override nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this retry policy for the call.
    pub fn with_retry_policy(mut self, factory: impl RetryPolicyFactory) -> Self {
        self.retry_policy_factory = Some(Arc::new(factory));
        self
    }

    /// Use this per-attempt timeout for the call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use this location mode for the call.
    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = Some(mode);
        self
    }

    /// Bound the whole call, retries and waits included.
    pub fn with_maximum_execution_time(mut self, max: Duration) -> Self {
        self.maximum_execution_time = Some(max);
        self
    }

    /// Retry policy factory, if set.
    pub fn retry_policy_factory(&self) -> Option<&Arc<dyn RetryPolicyFactory>> {
        self.retry_policy_factory.as_ref()
    }

    /// Per-attempt timeout, if set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Location mode, if set.
    pub fn location_mode(&self) -> Option<LocationMode> {
        self.location_mode
    }

    /// Maximum execution time, if set.
    pub fn maximum_execution_time(&self) -> Option<Duration> {
        self.maximum_execution_time
    }

    /// Deadline of the operation, set once the options have been resolved.
    pub fn operation_expiry_time(&self) -> Option<Instant> {
        self.operation_expiry_time
    }

    /// Fill unset fields from `defaults` and fix the deadline.
    ///
    /// The deadline is only computed the first time, so resolving the same
    /// options again never extends it.
    pub fn apply_defaults(&mut self, defaults: &ClientDefaults) {
        if self.retry_policy_factory.is_none() {
            self.retry_policy_factory = Some(defaults.retry_policy_factory().clone());
        }
        if self.timeout.is_none() {
            self.timeout = Some(defaults.timeout());
        }
        if self.location_mode.is_none() {
            self.location_mode = Some(defaults.location_mode());
        }
        if self.maximum_execution_time.is_none() {
            self.maximum_execution_time = defaults.maximum_execution_time();
        }

        if self.operation_expiry_time.is_none() {
            self.operation_expiry_time = self
                .maximum_execution_time
                .and_then(|max| Instant::now().checked_add(max));
        }
    }

    /// Time left before the deadline, `None` if the operation is unbounded.
    pub fn remaining_time(&self) -> Option<Duration> {
        self.operation_expiry_time
            .map(|expiry| expiry.saturating_duration_since(Instant::now()))
    }

    /// Whether waiting `delay` from now would reach the deadline.
    pub fn expires_within(&self, delay: Duration) -> bool {
        match self.operation_expiry_time {
            Some(expiry) => match Instant::now().checked_add(delay) {
                Some(at) => at >= expiry,
                None => true,
            },
            None => false,
        }
    }

    /// Timeout for the next attempt: the configured timeout, shortened to
    /// the remaining budget while some is left.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        match (self.timeout, self.remaining_time()) {
            (Some(timeout), Some(remaining)) if !remaining.is_zero() => {
                Some(timeout.min(remaining))
            }
            (timeout, _) => timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LinearRetry, NoRetry};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_defaults_fills_only_unset_fields() {
        let defaults = ClientDefaults::default();
        let mut options = RequestOptions::new()
            .with_location_mode(LocationMode::SecondaryOnly)
            .with_retry_policy(NoRetry);
        options.apply_defaults(&defaults);

        assert_eq!(options.location_mode(), Some(LocationMode::SecondaryOnly));
        assert_eq!(options.timeout(), Some(Duration::from_secs(90)));
        assert_eq!(options.maximum_execution_time(), None);
        assert_eq!(options.operation_expiry_time(), None);
        assert!(format!("{:?}", options.retry_policy_factory()).contains("NoRetry"));
    }

    #[test]
    fn test_expiry_is_computed_once() {
        let defaults = ClientDefaults::default();
        let mut options = RequestOptions::new()
            .with_retry_policy(LinearRetry::new(Duration::ZERO, 1))
            .with_maximum_execution_time(Duration::from_secs(10));
        options.apply_defaults(&defaults);
        let expiry = options.operation_expiry_time();
        assert!(expiry.is_some());

        std::thread::sleep(Duration::from_millis(5));
        options.apply_defaults(&defaults);
        assert_eq!(options.operation_expiry_time(), expiry);
    }

    #[test]
    fn test_attempt_timeout_is_bounded_by_budget() {
        let mut options = RequestOptions::new()
            .with_timeout(Duration::from_secs(90))
            .with_maximum_execution_time(Duration::from_secs(5));
        options.apply_defaults(&ClientDefaults::default());

        let timeout = options.attempt_timeout().unwrap();
        assert!(timeout <= Duration::from_secs(5));
        assert!(!options.expires_within(Duration::ZERO));
        assert!(options.expires_within(Duration::from_secs(6)));
    }

    #[test]
    fn test_zero_budget_expires_immediately() {
        let mut options = RequestOptions::new().with_maximum_execution_time(Duration::ZERO);
        options.apply_defaults(&ClientDefaults::default());

        assert!(options.expires_within(Duration::ZERO));
        // Nothing left to shorten to, the configured timeout applies.
        assert_eq!(options.attempt_timeout(), Some(Duration::from_secs(90)));
    }
}
