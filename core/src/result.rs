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

use std::time::Duration;

use http::header::{DATE, ETAG};
use http::{HeaderMap, StatusCode};

use crate::constants::{CONTENT_MD5, X_MS_REQUEST_ID};
use crate::time::{now, parse_http_date, DateTime};
use crate::{Error, ErrorKind, StorageLocation};

/// Outcome of one physical attempt.
#[derive(Debug, Clone)]
pub struct RequestResult {
    target_location: StorageLocation,
    start_time: DateTime,
    stop_time: Option<DateTime>,
    status: Option<StatusCode>,
    service_request_id: Option<String>,
    etag: Option<String>,
    content_md5: Option<String>,
    request_date: Option<DateTime>,
    error_kind: Option<ErrorKind>,
    error_message: Option<String>,
}

impl RequestResult {
    /// Start recording an attempt against `target_location`.
    pub fn start(target_location: StorageLocation) -> Self {
        Self {
            target_location,
            start_time: now(),
            stop_time: None,
            status: None,
            service_request_id: None,
            etag: None,
            content_md5: None,
            request_date: None,
            error_kind: None,
            error_message: None,
        }
    }

    /// Record the response status and the service headers worth keeping.
    pub fn record_response(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.status = Some(status);
        self.service_request_id = header_string(headers, X_MS_REQUEST_ID);
        self.etag = header_string(headers, ETAG.as_str());
        self.content_md5 = header_string(headers, CONTENT_MD5);
        // A malformed Date header is not worth failing the attempt for.
        self.request_date = header_string(headers, DATE.as_str())
            .and_then(|v| parse_http_date(&v).ok());
    }

    /// Record the failure of this attempt.
    pub fn record_error(&mut self, err: &Error) {
        self.error_kind = Some(err.kind());
        self.error_message = Some(err.to_string());
        if self.status.is_none() {
            self.status = err.status();
        }
    }

    /// Mark the attempt as finished.
    pub fn stop(&mut self) {
        self.stop_time = Some(now());
    }

    /// Location the attempt was sent to.
    pub fn target_location(&self) -> StorageLocation {
        self.target_location
    }

    /// When the attempt started.
    pub fn start_time(&self) -> DateTime {
        self.start_time
    }

    /// When the attempt finished, `None` while it is in flight.
    pub fn stop_time(&self) -> Option<DateTime> {
        self.stop_time
    }

    /// Wall clock time the attempt took.
    pub fn duration(&self) -> Option<Duration> {
        self.stop_time
            .and_then(|stop| (stop - self.start_time).to_std().ok())
    }

    /// HTTP status, `None` if no response arrived.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// `x-ms-request-id` assigned by the service.
    pub fn service_request_id(&self) -> Option<&str> {
        self.service_request_id.as_deref()
    }

    /// ETag of the resource, if returned.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Content MD5 of the payload, if returned.
    pub fn content_md5(&self) -> Option<&str> {
        self.content_md5.as_deref()
    }

    /// Date header of the response.
    pub fn request_date(&self) -> Option<DateTime> {
        self.request_date
    }

    /// Kind of the failure, `None` if the attempt succeeded.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Message of the failure, `None` if the attempt succeeded.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether the attempt failed.
    pub fn is_failure(&self) -> bool {
        self.error_kind.is_some()
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
