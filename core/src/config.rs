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

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::*;
use crate::retry::{DEFAULT_DELTA_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use crate::{
    Env, Error, ExponentialRetry, LinearRetry, LocationMode, NoRetry, Result, RetryPolicyFactory,
};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// ClientDefaults carries the options every operation of a client starts from.
///
/// - location mode: [`LocationMode::PrimaryOnly`]
/// - timeout: 90 seconds per attempt
/// - retry policy: [`ExponentialRetry::default`]
/// - maximum execution time: unbounded
#[derive(Debug, Clone)]
pub struct ClientDefaults {
    location_mode: LocationMode,
    timeout: Duration,
    retry_policy_factory: Arc<dyn RetryPolicyFactory>,
    maximum_execution_time: Option<Duration>,
}

impl Default for ClientDefaults {
    fn default() -> Self {
        Self {
            location_mode: LocationMode::PrimaryOnly,
            timeout: DEFAULT_TIMEOUT,
            retry_policy_factory: Arc::new(ExponentialRetry::default()),
            maximum_execution_time: None,
        }
    }
}

impl ClientDefaults {
    /// Load defaults from env, falling back to the built-in values.
    ///
    /// - `REQRETRY_LOCATION_MODE`: `primary_only`, `secondary_only`,
    ///   `primary_then_secondary` or `secondary_then_primary`
    /// - `REQRETRY_TIMEOUT_MS`
    /// - `REQRETRY_MAX_EXECUTION_TIME_MS`
    /// - `REQRETRY_RETRY_POLICY`: `exponential`, `linear` or `none`
    /// - `REQRETRY_RETRY_MAX_ATTEMPTS`
    /// - `REQRETRY_RETRY_BACKOFF_MS`: delta backoff of the retry policy
    pub fn from_env(env: &dyn Env) -> Result<Self> {
        let mut defaults = Self::default();

        if let Some(v) = env.var(REQRETRY_LOCATION_MODE) {
            defaults.location_mode = LocationMode::from_str(&v)?;
        }
        if let Some(v) = env.var(REQRETRY_TIMEOUT_MS) {
            defaults.timeout = Duration::from_millis(parse_number(REQRETRY_TIMEOUT_MS, &v)?);
        }
        if let Some(v) = env.var(REQRETRY_MAX_EXECUTION_TIME_MS) {
            defaults.maximum_execution_time = Some(Duration::from_millis(parse_number(
                REQRETRY_MAX_EXECUTION_TIME_MS,
                &v,
            )?));
        }

        let max_attempts = match env.var(REQRETRY_RETRY_MAX_ATTEMPTS) {
            Some(v) => u32::try_from(parse_number(REQRETRY_RETRY_MAX_ATTEMPTS, &v)?)
                .map_err(|e| {
                    Error::invalid_argument(format!(
                        "{REQRETRY_RETRY_MAX_ATTEMPTS} is out of range: {v}"
                    ))
                    .with_source(e)
                })?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        let backoff = match env.var(REQRETRY_RETRY_BACKOFF_MS) {
            Some(v) => Duration::from_millis(parse_number(REQRETRY_RETRY_BACKOFF_MS, &v)?),
            None => DEFAULT_DELTA_BACKOFF,
        };

        defaults.retry_policy_factory = match env.var(REQRETRY_RETRY_POLICY).as_deref() {
            None | Some("exponential") => Arc::new(
                ExponentialRetry::new()
                    .with_delta_backoff(backoff)
                    .with_max_attempts(max_attempts),
            ),
            Some("linear") => Arc::new(LinearRetry::new(backoff, max_attempts)),
            Some("none") => Arc::new(NoRetry),
            Some(v) => {
                return Err(Error::invalid_argument(format!(
                    "{REQRETRY_RETRY_POLICY} must be one of exponential, linear or none, got {v}"
                )))
            }
        };

        Ok(defaults)
    }

    /// Set the default location mode.
    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    /// Set the default per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the default retry policy.
    pub fn with_retry_policy(mut self, factory: impl RetryPolicyFactory) -> Self {
        self.retry_policy_factory = Arc::new(factory);
        self
    }

    /// Bound every operation by default.
    pub fn with_maximum_execution_time(mut self, max: Duration) -> Self {
        self.maximum_execution_time = Some(max);
        self
    }

    /// Default location mode.
    pub fn location_mode(&self) -> LocationMode {
        self.location_mode
    }

    /// Default per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Default retry policy factory.
    pub fn retry_policy_factory(&self) -> &Arc<dyn RetryPolicyFactory> {
        &self.retry_policy_factory
    }

    /// Default maximum execution time, `None` for unbounded.
    pub fn maximum_execution_time(&self) -> Option<Duration> {
        self.maximum_execution_time
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|e| {
        Error::invalid_argument(format!("{key} must be a non-negative integer, got {value}"))
            .with_source(e)
    })
}
