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

//! Core components for executing requests against geo-replicated storage.
//!
//! A storage account is reachable through a primary endpoint and an optional
//! read-only secondary. This crate owns the one loop every operation goes
//! through: pick an endpoint, build and sign the request, send it, classify
//! the outcome, and decide whether, where and when to try again.
//!
//! ## Overview
//!
//! - [`StorageUri`]: the primary and secondary address of one resource
//! - [`LocationMode`]: which endpoints an operation may use, and in what order
//! - [`RetryPolicy`]: decides whether a failed attempt is retried
//! - [`OperationContext`]: the attempt history and hooks of one operation
//! - [`StorageRequest`]: an operation expressed as callbacks
//! - [`ServiceClient`]: transport, signer and defaults shared by operations
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use reqretry_core::{
//!     Body, LocationMode, OperationContext, RequestOptions, Result, ServiceClient,
//!     StorageRequest, StorageUri,
//! };
//!
//! # fn example(client: ServiceClient) -> Result<()> {
//! let request = StorageRequest::new(
//!     (),
//!     |_, uri, _, _| {
//!         Ok(http::Request::get(uri.clone()).body(Body::Empty)?)
//!     },
//!     |resp, _, _, _| Ok(resp.into_body()),
//! );
//!
//! let options = RequestOptions::new().with_location_mode(LocationMode::PrimaryThenSecondary);
//! let ctx = OperationContext::new();
//! let content: Bytes = client.execute(request, Some(&options), &ctx)?;
//! println!("read {} bytes in {} attempt(s)", content.len(), ctx.request_results().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Traits
//!
//! - [`HttpSend`]: sends one request, never retries
//! - [`SignRequest`]: authenticates one request
//! - [`RetryPolicy`] and [`RetryPolicyFactory`]: retry decisions
//! - [`Env`]: environment variable access
//!
//! ## Utilities
//!
//! - [`hash`]: Cryptographic hashing utilities
//! - [`time`]: Time manipulation utilities

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;

mod constants;

mod error;
pub use error::{Error, ErrorKind, Result};
mod env;
pub use env::{Env, OsEnv, StaticEnv};
mod location;
pub use location::{LocationMode, RequestLocationMode, StorageLocation};
mod uri;
pub use uri::StorageUri;
mod result;
pub use result::RequestResult;
mod retry;
pub use retry::{
    ExponentialRetry, LinearRetry, NoRetry, RetryContext, RetryInfo, RetryPolicy,
    RetryPolicyFactory,
};
mod config;
pub use config::ClientDefaults;
mod options;
pub use options::RequestOptions;
mod context;
pub use context::{
    CurrentRequest, OperationContext, ResponseReceivedEvent, RetryingEvent, SendingRequestEvent,
};
mod body;
pub use body::{Body, ReadSeek, RewindableStream};
mod http;
pub use http::{AttemptTimeout, HttpSend, NoopHttpSend};
mod api;
pub use api::{NoopSigner, SignRequest};
mod request;
pub use request::{StatusOutcome, StatusTable, StorageRequest};
mod client;
pub use client::ServiceClient;
mod execute;

/// Header carrying the client request id on every attempt.
pub const X_MS_CLIENT_REQUEST_ID: &str = constants::X_MS_CLIENT_REQUEST_ID;
