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

use std::fmt;

use bytes::Bytes;
use http::{StatusCode, Uri};

use crate::{Body, OperationContext, RequestLocationMode, Result, ServiceClient};

/// How a response status is treated by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusOutcome {
    /// The operation succeeded, hand the response to post processing.
    Success,
    /// The attempt failed, let the retry policy decide.
    Retryable,
    /// The operation failed, never retry.
    Terminal,
}

/// StatusTable maps response statuses to outcomes for one operation.
///
/// Statuses not listed are [`StatusOutcome::Retryable`], leaving the
/// decision to the retry policy. The default table accepts `200 OK`.
///
/// ```
/// use http::StatusCode;
/// use reqretry_core::{StatusOutcome, StatusTable};
///
/// let table = StatusTable::expect([StatusCode::CREATED])
///     .with(StatusCode::CONFLICT, StatusOutcome::Terminal);
///
/// assert_eq!(table.classify(StatusCode::CREATED), StatusOutcome::Success);
/// assert_eq!(table.classify(StatusCode::CONFLICT), StatusOutcome::Terminal);
/// assert_eq!(table.classify(StatusCode::OK), StatusOutcome::Retryable);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    entries: Vec<(StatusCode, StatusOutcome)>,
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::expect([StatusCode::OK])
    }
}

impl StatusTable {
    /// Create a table that lists nothing.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Create a table where `statuses` mean success.
    pub fn expect(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        Self {
            entries: statuses
                .into_iter()
                .map(|s| (s, StatusOutcome::Success))
                .collect(),
        }
    }

    /// Set the outcome of `status`, replacing any previous entry.
    pub fn with(mut self, status: StatusCode, outcome: StatusOutcome) -> Self {
        match self.entries.iter_mut().find(|(s, _)| *s == status) {
            Some(entry) => entry.1 = outcome,
            None => self.entries.push((status, outcome)),
        }
        self
    }

    /// Outcome for `status`.
    pub fn classify(&self, status: StatusCode) -> StatusOutcome {
        self.entries
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, outcome)| *outcome)
            .unwrap_or(StatusOutcome::Retryable)
    }
}

type BuildFn<'a, P> =
    Box<dyn FnMut(&mut P, &Uri, &ServiceClient, &OperationContext) -> Result<http::Request<Body>> + 'a>;
type SignFn<'a> =
    Box<dyn FnMut(&mut http::Request<Body>, &ServiceClient, &OperationContext) -> Result<()> + 'a>;
type PreProcessFn<'a, P> = Box<
    dyn FnMut(&http::Response<Bytes>, &P, &ServiceClient, &OperationContext) -> Result<StatusOutcome>
        + 'a,
>;
type PostProcessFn<'a, P, R> = Box<
    dyn FnMut(http::Response<Bytes>, &mut P, &ServiceClient, &OperationContext) -> Result<R> + 'a,
>;
type RecoverFn<'a, P> = Box<dyn FnMut(&mut P, &OperationContext) -> Result<()> + 'a>;

/// StorageRequest describes one logical operation as a set of callbacks.
///
/// `P` is the state owned by the operation, for example the resource being
/// addressed or the upload stream, and `R` is what the operation returns.
///
/// - `build` creates the request against the uri of the target location.
///   It runs again for every attempt.
/// - `sign` overrides the client's signer.
/// - `pre_process` overrides the [`StatusTable`] lookup.
/// - `post_process` turns the successful response into `R`. Its failures
///   are never retried.
/// - `recover` prepares the state for the next attempt. Without it the engine
///   rewinds the body it sent.
pub struct StorageRequest<'a, P, R> {
    pub(crate) parent: P,
    pub(crate) location_mode: RequestLocationMode,
    pub(crate) statuses: StatusTable,
    pub(crate) build: BuildFn<'a, P>,
    pub(crate) sign: Option<SignFn<'a>>,
    pub(crate) pre_process: Option<PreProcessFn<'a, P>>,
    pub(crate) post_process: PostProcessFn<'a, P, R>,
    pub(crate) recover: Option<RecoverFn<'a, P>>,
}

impl<'a, P, R> StorageRequest<'a, P, R> {
    /// Create a request from its mandatory callbacks.
    pub fn new(
        parent: P,
        build: impl FnMut(&mut P, &Uri, &ServiceClient, &OperationContext) -> Result<http::Request<Body>>
            + 'a,
        post_process: impl FnMut(http::Response<Bytes>, &mut P, &ServiceClient, &OperationContext) -> Result<R>
            + 'a,
    ) -> Self {
        Self {
            parent,
            location_mode: RequestLocationMode::default(),
            statuses: StatusTable::default(),
            build: Box::new(build),
            sign: None,
            pre_process: None,
            post_process: Box::new(post_process),
            recover: None,
        }
    }

    /// Restrict the endpoints this operation may target.
    pub fn with_location_mode(mut self, mode: RequestLocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    /// Set the status table.
    pub fn with_statuses(mut self, statuses: StatusTable) -> Self {
        self.statuses = statuses;
        self
    }

    /// Sign with this callback instead of the client's signer.
    pub fn with_sign(
        mut self,
        sign: impl FnMut(&mut http::Request<Body>, &ServiceClient, &OperationContext) -> Result<()>
            + 'a,
    ) -> Self {
        self.sign = Some(Box::new(sign));
        self
    }

    /// Classify responses with this callback instead of the status table.
    pub fn with_pre_process(
        mut self,
        pre_process: impl FnMut(&http::Response<Bytes>, &P, &ServiceClient, &OperationContext) -> Result<StatusOutcome>
            + 'a,
    ) -> Self {
        self.pre_process = Some(Box::new(pre_process));
        self
    }

    /// Prepare the state for the next attempt with this callback.
    pub fn with_recover(
        mut self,
        recover: impl FnMut(&mut P, &OperationContext) -> Result<()> + 'a,
    ) -> Self {
        self.recover = Some(Box::new(recover));
        self
    }

    /// Endpoints this operation may target.
    pub fn location_mode(&self) -> RequestLocationMode {
        self.location_mode
    }

    /// State owned by the operation.
    pub fn parent(&self) -> &P {
        &self.parent
    }
}

impl<P: fmt::Debug, R> fmt::Debug for StorageRequest<'_, P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRequest")
            .field("parent", &self.parent)
            .field("location_mode", &self.location_mode)
            .field("statuses", &self.statuses)
            .field("sign", &self.sign.is_some())
            .field("pre_process", &self.pre_process.is_some())
            .field("recover", &self.recover.is_some())
            .finish_non_exhaustive()
    }
}
