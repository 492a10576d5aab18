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

use std::fmt::{self, Debug};
use std::sync::{Mutex, MutexGuard};

use http::{Method, Uri};

use crate::hash::Checksum;
use crate::time::{now, DateTime};
use crate::{Body, Error, RequestResult, RetryInfo, StorageLocation};

type SendingRequestHandler = Box<dyn for<'a, 'b> Fn(&'a SendingRequestEvent<'b>) + Send + Sync>;
type ResponseReceivedHandler =
    Box<dyn for<'a, 'b> Fn(&'a ResponseReceivedEvent<'b>) + Send + Sync>;
type RetryingHandler = Box<dyn for<'a, 'b> Fn(&'a RetryingEvent<'b>) + Send + Sync>;

/// Fired right before an attempt goes on the wire.
#[derive(Debug)]
pub struct SendingRequestEvent<'a> {
    /// Client request id of the operation.
    pub client_request_id: &'a str,
    /// Zero based attempt number.
    pub attempt: u32,
    /// Location the request targets.
    pub location: StorageLocation,
    /// The fully built and signed request.
    pub request: &'a http::Request<Body>,
}

/// Fired once an attempt has finished, successful or not.
#[derive(Debug)]
pub struct ResponseReceivedEvent<'a> {
    /// Client request id of the operation.
    pub client_request_id: &'a str,
    /// Result recorded for the attempt.
    pub result: &'a RequestResult,
}

/// Fired when a retry has been scheduled, before sleeping.
#[derive(Debug)]
pub struct RetryingEvent<'a> {
    /// Client request id of the operation.
    pub client_request_id: &'a str,
    /// Number of retries scheduled so far, including this one.
    pub retry_count: u32,
    /// Where and when the retry will happen.
    pub retry_info: &'a RetryInfo,
    /// Failure that triggered the retry.
    pub error: &'a Error,
}

/// Request currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRequest {
    /// HTTP method.
    pub method: Method,
    /// Full uri, including the host of the target location.
    pub uri: Uri,
    /// Location the request targets.
    pub location: StorageLocation,
}

#[derive(Debug, Default)]
struct OperationState {
    request_results: Vec<RequestResult>,
    start_time: Option<DateTime>,
    current_request: Option<CurrentRequest>,
    intermediate_checksum: Option<Checksum>,
    current_operation_byte_count: u64,
}

/// OperationContext tracks one logical operation across all its attempts.
///
/// Create one per operation. The engine appends a [`RequestResult`] for
/// every physical attempt; other threads may observe the context while the
/// operation runs.
///
/// ```
/// use reqretry_core::OperationContext;
///
/// let mut ctx = OperationContext::new();
/// ctx.on_retrying(|event| println!("retry #{}", event.retry_count));
/// assert!(ctx.request_results().is_empty());
/// ```
pub struct OperationContext {
    client_request_id: String,
    logging_enabled: bool,
    state: Mutex<OperationState>,
    // Serializes handler invocation without holding the state lock.
    notify: Mutex<()>,
    sending_request: Vec<SendingRequestHandler>,
    response_received: Vec<ResponseReceivedHandler>,
    retrying: Vec<RetryingHandler>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationContext {
    /// Create a context with a fresh client request id.
    pub fn new() -> Self {
        Self::with_client_request_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create a context with a caller supplied client request id.
    pub fn with_client_request_id(id: impl Into<String>) -> Self {
        Self {
            client_request_id: id.into(),
            logging_enabled: true,
            state: Mutex::new(OperationState::default()),
            notify: Mutex::new(()),
            sending_request: Vec::new(),
            response_received: Vec::new(),
            retrying: Vec::new(),
        }
    }

    /// Enable or disable the engine's log lines for this operation.
    pub fn with_logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    fn state(&self) -> MutexGuard<'_, OperationState> {
        self.state.lock().expect("lock poisoned")
    }

    /// Id sent as `x-ms-client-request-id` on every attempt.
    pub fn client_request_id(&self) -> &str {
        &self.client_request_id
    }

    /// Whether the engine logs this operation.
    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    /// Reset per-operation state before a new run, keeping the request id.
    pub fn initialize(&self) {
        let mut state = self.state();
        *state = OperationState {
            start_time: Some(now()),
            ..OperationState::default()
        };
    }

    /// When the current run started.
    pub fn start_time(&self) -> Option<DateTime> {
        self.state().start_time
    }

    /// Append the result of a finished attempt.
    pub fn append_request_result(&self, result: RequestResult) {
        self.state().request_results.push(result);
    }

    /// Snapshot of all attempts so far, in order.
    pub fn request_results(&self) -> Vec<RequestResult> {
        self.state().request_results.clone()
    }

    /// Result of the most recent attempt.
    pub fn last_result(&self) -> Option<RequestResult> {
        self.state().request_results.last().cloned()
    }

    /// Request currently in flight.
    pub fn current_request(&self) -> Option<CurrentRequest> {
        self.state().current_request.clone()
    }

    pub(crate) fn set_current_request(&self, request: Option<CurrentRequest>) {
        self.state().current_request = request;
    }

    /// Feed downloaded bytes into the running checksum.
    pub fn update_intermediate_checksum(&self, content: &[u8]) {
        self.state()
            .intermediate_checksum
            .get_or_insert_with(Checksum::new)
            .update(content);
    }

    /// Running checksum of the bytes fed so far.
    pub fn intermediate_checksum(&self) -> Option<Checksum> {
        self.state().intermediate_checksum.clone()
    }

    /// Drop the running checksum.
    pub fn reset_intermediate_checksum(&self) {
        self.state().intermediate_checksum = None;
    }

    /// Bytes transferred by this operation so far.
    pub fn current_operation_byte_count(&self) -> u64 {
        self.state().current_operation_byte_count
    }

    /// Overwrite the transferred byte count.
    pub fn set_current_operation_byte_count(&self, count: u64) {
        self.state().current_operation_byte_count = count;
    }

    /// Add to the transferred byte count.
    pub fn add_current_operation_byte_count(&self, count: u64) {
        self.state().current_operation_byte_count += count;
    }

    /// Observe every attempt right before it is sent.
    pub fn on_sending_request(
        &mut self,
        f: impl Fn(&SendingRequestEvent<'_>) + Send + Sync + 'static,
    ) {
        self.sending_request.push(Box::new(f));
    }

    /// Observe every attempt once it finished.
    pub fn on_response_received(
        &mut self,
        f: impl Fn(&ResponseReceivedEvent<'_>) + Send + Sync + 'static,
    ) {
        self.response_received.push(Box::new(f));
    }

    /// Observe every scheduled retry.
    pub fn on_retrying(&mut self, f: impl Fn(&RetryingEvent<'_>) + Send + Sync + 'static) {
        self.retrying.push(Box::new(f));
    }

    pub(crate) fn fire_sending_request(&self, event: &SendingRequestEvent<'_>) {
        let _guard = self.notify.lock().expect("lock poisoned");
        for handler in &self.sending_request {
            handler(event);
        }
    }

    pub(crate) fn fire_response_received(&self, event: &ResponseReceivedEvent<'_>) {
        let _guard = self.notify.lock().expect("lock poisoned");
        for handler in &self.response_received {
            handler(event);
        }
    }

    pub(crate) fn fire_retrying(&self, event: &RetryingEvent<'_>) {
        let _guard = self.notify.lock().expect("lock poisoned");
        for handler in &self.retrying {
            handler(event);
        }
    }
}

impl Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("client_request_id", &self.client_request_id)
            .field("logging_enabled", &self.logging_enabled)
            .field("sending_request", &self.sending_request.len())
            .field("response_received", &self.response_received.len())
            .field("retrying", &self.retrying.len())
            .finish_non_exhaustive()
    }
}
