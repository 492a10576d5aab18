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

//! Plugging a custom signer and a custom retry policy into a client.
//!
//! The transport here is an in-process fake that fails the first attempt, so
//! the example runs without network access.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::{HeaderValue, StatusCode};
use reqretry_core::{
    Body, HttpSend, LocationMode, OperationContext, RequestOptions, Result, RetryContext,
    RetryInfo, RetryPolicy, ServiceClient, SignRequest, StorageRequest, StorageUri,
};

/// Signs requests with a static bearer token.
#[derive(Debug)]
struct TokenSigner {
    token: String,
}

impl SignRequest for TokenSigner {
    fn sign_request(&self, req: &mut Parts, ctx: &OperationContext) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token))?;
        value.set_sensitive(true);
        req.headers.insert(AUTHORIZATION, value);
        println!(
            "signed {} {} for operation {}",
            req.method,
            req.uri,
            ctx.client_request_id()
        );
        Ok(())
    }
}

/// Retries once, immediately, at whatever location comes next.
#[derive(Debug, Clone, Default)]
struct RetryOnce;

impl RetryPolicy for RetryOnce {
    fn should_retry(&mut self, ctx: &RetryContext) -> Option<RetryInfo> {
        if ctx.current_retry_count() > 0 {
            return None;
        }
        let mut info = RetryInfo::new(ctx);
        info.set_retry_interval(Duration::ZERO);
        Some(info)
    }
}

/// Fails the first request with 503 and accepts everything after it.
#[derive(Debug, Default)]
struct FlakyHttpSend {
    calls: AtomicU32,
}

impl HttpSend for FlakyHttpSend {
    fn http_send(&self, req: http::Request<Body>) -> Result<http::Response<Bytes>> {
        let status = match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::OK,
        };
        println!("{} {} -> {status}", req.method(), req.uri());
        Ok(http::Response::builder()
            .status(status)
            .body(Bytes::from_static(b"hello"))?)
    }
}

fn main() -> Result<()> {
    let _ = env_logger::builder().try_init();

    let uri = StorageUri::parse(
        "https://acct.example.com/container",
        Some("https://acct-secondary.example.com/container"),
    )?;
    let client = ServiceClient::new(uri)
        .with_http_send(FlakyHttpSend::default())
        .with_signer(TokenSigner {
            token: "demo-token".to_string(),
        });

    let request = StorageRequest::new(
        (),
        |_, uri, _, _| Ok(http::Request::get(format!("{uri}/blob")).body(Body::Empty)?),
        |resp, _, _, _| Ok(resp.into_body()),
    );
    let options = RequestOptions::new()
        .with_retry_policy(RetryOnce)
        .with_location_mode(LocationMode::PrimaryThenSecondary);

    let mut ctx = OperationContext::new();
    let retries = Arc::new(AtomicU32::new(0));
    {
        let retries = retries.clone();
        ctx.on_retrying(move |event| {
            retries.fetch_add(1, Ordering::SeqCst);
            println!("retrying after: {}", event.error);
        });
    }

    let content = client.execute(request, Some(&options), &ctx)?;
    println!(
        "got {:?} after {} attempt(s), {} retry",
        content,
        ctx.request_results().len(),
        retries.load(Ordering::SeqCst)
    );

    Ok(())
}
