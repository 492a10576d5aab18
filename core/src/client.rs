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

use bytes::Bytes;

use crate::execute::execute;
use crate::http::NoopHttpSend;
use crate::{
    Body, ClientDefaults, HttpSend, NoopSigner, OperationContext, RequestOptions, Result,
    SignRequest, StorageRequest, StorageUri,
};

/// ServiceClient is the shared, immutable entry point of a storage service.
///
/// It owns the account address, the transport, the signer and the defaults
/// every operation starts from. Clone it freely; clones share everything.
///
/// ## Important
///
/// No transport is configured by default. Sending through an unconfigured
/// client fails, use [`ServiceClient::with_http_send`] to plug one in.
///
/// ## Example
///
/// ```
/// use reqretry_core::{ClientDefaults, LocationMode, ServiceClient, StorageUri};
///
/// let uri = StorageUri::parse(
///     "https://acct.blob.core.windows.net",
///     Some("https://acct-secondary.blob.core.windows.net"),
/// )
/// .unwrap();
/// let client = ServiceClient::new(uri)
///     .with_defaults(ClientDefaults::default().with_location_mode(LocationMode::PrimaryThenSecondary));
/// assert_eq!(client.defaults().location_mode(), LocationMode::PrimaryThenSecondary);
/// ```
#[derive(Debug, Clone)]
pub struct ServiceClient {
    storage_uri: StorageUri,
    http: Arc<dyn HttpSend>,
    signer: Arc<dyn SignRequest>,
    defaults: ClientDefaults,
}

impl ServiceClient {
    /// Create a client for `storage_uri` with no transport and no signer.
    pub fn new(storage_uri: StorageUri) -> Self {
        Self {
            storage_uri,
            http: Arc::new(NoopHttpSend),
            signer: Arc::new(NoopSigner),
            defaults: ClientDefaults::default(),
        }
    }

    /// Replace the HTTP client implementation.
    pub fn with_http_send(mut self, http: impl HttpSend) -> Self {
        self.http = Arc::new(http);
        self
    }

    /// Replace the signer.
    pub fn with_signer(mut self, signer: impl SignRequest) -> Self {
        self.signer = Arc::new(signer);
        self
    }

    /// Replace the defaults.
    pub fn with_defaults(mut self, defaults: ClientDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Address of the account or resource this client talks to.
    pub fn storage_uri(&self) -> &StorageUri {
        &self.storage_uri
    }

    /// Defaults every operation starts from.
    pub fn defaults(&self) -> &ClientDefaults {
        &self.defaults
    }

    /// Overlay per-call overrides on the client defaults.
    ///
    /// The client itself is never modified.
    pub fn resolve_options(&self, options: Option<&RequestOptions>) -> RequestOptions {
        let mut resolved = options.cloned().unwrap_or_default();
        resolved.apply_defaults(&self.defaults);
        resolved
    }

    /// Send one request through the configured transport.
    #[inline]
    pub fn http_send(&self, req: http::Request<Body>) -> Result<http::Response<Bytes>> {
        self.http.http_send(req)
    }

    /// Sign one request with the configured signer.
    #[inline]
    pub fn sign(&self, req: &mut http::request::Parts, ctx: &OperationContext) -> Result<()> {
        self.signer.sign_request(req, ctx)
    }

    /// Run `request` to completion, retrying as the options allow.
    pub fn execute<P, R>(
        &self,
        request: StorageRequest<'_, P, R>,
        options: Option<&RequestOptions>,
        ctx: &OperationContext,
    ) -> Result<R> {
        execute(self, request, options, ctx)
    }
}
