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

//! The execution engine.

use std::thread;

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::HeaderValue;
use log::{debug, warn};

use crate::constants::{X_MS_CLIENT_REQUEST_ID, X_MS_ERROR_CODE};
use crate::context::{CurrentRequest, ResponseReceivedEvent, RetryingEvent, SendingRequestEvent};
use crate::http::AttemptTimeout;
use crate::{
    Body, Error, ErrorKind, OperationContext, RequestOptions, RequestResult, Result, RetryContext,
    ServiceClient, StatusOutcome, StorageLocation, StorageRequest,
};

enum Attempt {
    Succeeded(http::Response<Bytes>),
    Failed {
        err: Error,
        retryable: bool,
        result: RequestResult,
        body: Body,
    },
}

/// Run `request` to completion against `client`.
///
/// Every physical attempt appends exactly one [`RequestResult`] to `ctx`.
/// Failures surface the last observed error with the whole attempt history
/// attached.
pub(crate) fn execute<P, R>(
    client: &ServiceClient,
    mut request: StorageRequest<'_, P, R>,
    options: Option<&RequestOptions>,
    ctx: &OperationContext,
) -> Result<R> {
    let options = client.resolve_options(options);
    ctx.initialize();

    let mut location_mode = request
        .location_mode
        .apply(options.location_mode().unwrap_or_default())?;
    if !client.storage_uri().is_valid_for(location_mode) {
        return Err(Error::invalid_argument(format!(
            "location mode {location_mode} requires a uri that is not configured: {}",
            client.storage_uri()
        )));
    }

    let factory = options
        .retry_policy_factory()
        .unwrap_or_else(|| client.defaults().retry_policy_factory())
        .clone();
    let mut policy = factory.create_instance(ctx);

    let mut location = location_mode.initial_location();
    let mut retry_count = 0;

    loop {
        let (err, retryable, result, body) =
            match attempt(client, &mut request, &options, ctx, location, retry_count) {
                Ok(Attempt::Succeeded(resp)) => {
                    return (request.post_process)(resp, &mut request.parent, client, ctx)
                        .map_err(|err| {
                            let err = match err.kind() {
                                ErrorKind::Unexpected => {
                                    Error::protocol(err.to_string()).with_source(err)
                                }
                                _ => err,
                            };
                            fail(ctx, err)
                        });
                }
                Ok(Attempt::Failed {
                    err,
                    retryable,
                    result,
                    body,
                }) => (err, retryable, result, body),
                Err(err) => return Err(fail(ctx, err)),
            };

        if !retryable {
            if ctx.logging_enabled() {
                warn!(
                    "operation {} failed at {location} with non-retryable error: {err}",
                    ctx.client_request_id()
                );
            }
            return Err(fail(ctx, err));
        }

        let retry_ctx = RetryContext::new(
            retry_count,
            result,
            location_mode,
            location_mode.next_location(location),
        );
        let Some(info) = policy.should_retry(&retry_ctx) else {
            if ctx.logging_enabled() {
                warn!(
                    "operation {} failed after {} attempt(s), retry policy gave up: {err}",
                    ctx.client_request_id(),
                    retry_count + 1
                );
            }
            return Err(fail(ctx, err));
        };

        if options.expires_within(info.retry_interval()) {
            if ctx.logging_enabled() {
                warn!(
                    "operation {} ran out of execution time after {} attempt(s): {err}",
                    ctx.client_request_id(),
                    retry_count + 1
                );
            }
            return Err(fail(ctx, err).set_budget_exceeded());
        }

        if let Err(e) = client.storage_uri().uri_for(info.target_location()) {
            if ctx.logging_enabled() {
                warn!(
                    "operation {} cannot be retried at {}: {e}",
                    ctx.client_request_id(),
                    info.target_location()
                );
            }
            return Err(fail(ctx, err));
        }

        retry_count += 1;
        if ctx.logging_enabled() {
            warn!(
                "operation {} retrying #{retry_count} at {} in {:?} after: {err}",
                ctx.client_request_id(),
                info.target_location(),
                info.retry_interval()
            );
        }
        ctx.fire_retrying(&RetryingEvent {
            client_request_id: ctx.client_request_id(),
            retry_count,
            retry_info: &info,
            error: &err,
        });

        if !info.retry_interval().is_zero() {
            thread::sleep(info.retry_interval());
        }
        location = info.target_location();
        location_mode = info.updated_location_mode();

        let recovered = match request.recover.as_mut() {
            Some(recover) => recover(&mut request.parent, ctx),
            None => body.rewind(),
        };
        if let Err(e) = recovered {
            return Err(fail(ctx, e));
        }
    }
}

/// Make one physical attempt against `location`.
///
/// Returns `Err` only for failures before anything was sent.
fn attempt<P, R>(
    client: &ServiceClient,
    request: &mut StorageRequest<'_, P, R>,
    options: &RequestOptions,
    ctx: &OperationContext,
    location: StorageLocation,
    attempt: u32,
) -> Result<Attempt> {
    let uri = client.storage_uri().uri_for(location)?;
    let mut req = (request.build)(&mut request.parent, uri, client, ctx)?;

    req.headers_mut().insert(
        X_MS_CLIENT_REQUEST_ID,
        HeaderValue::from_str(ctx.client_request_id())?,
    );
    // Signers need the length before the transport computes it.
    if !req.body().is_empty() && !req.headers().contains_key(CONTENT_LENGTH) {
        let len = HeaderValue::from(req.body().len());
        req.headers_mut().insert(CONTENT_LENGTH, len);
    }
    if let Some(timeout) = options.attempt_timeout() {
        req.extensions_mut().insert(AttemptTimeout(timeout));
    }

    match request.sign.as_mut() {
        Some(sign) => sign(&mut req, client, ctx)?,
        None => {
            let (mut parts, body) = req.into_parts();
            client.sign(&mut parts, ctx)?;
            req = http::Request::from_parts(parts, body);
        }
    }

    if ctx.logging_enabled() {
        debug!(
            "operation {} attempt #{attempt}: {} {} at {location}",
            ctx.client_request_id(),
            req.method(),
            req.uri()
        );
    }
    ctx.set_current_request(Some(CurrentRequest {
        method: req.method().clone(),
        uri: req.uri().clone(),
        location,
    }));
    ctx.fire_sending_request(&SendingRequestEvent {
        client_request_id: ctx.client_request_id(),
        attempt,
        location,
        request: &req,
    });

    let body = req.body().clone();
    let mut result = RequestResult::start(location);

    let outcome = match client.http_send(req) {
        // Only failures to reach the service are worth another attempt.
        Err(err) => {
            let retryable = err.kind() == ErrorKind::Transport;
            Err((err, retryable))
        }
        Ok(resp) => {
            result.record_response(resp.status(), resp.headers());

            let classified = match request.pre_process.as_mut() {
                Some(pre_process) => pre_process(&resp, &request.parent, client, ctx),
                None => Ok(request.statuses.classify(resp.status())),
            };
            match classified {
                Ok(StatusOutcome::Success) => Ok(resp),
                Ok(outcome) => Err((status_error(&resp), outcome == StatusOutcome::Retryable)),
                Err(err) => Err((err, false)),
            }
        }
    };

    if let Err((err, _)) = &outcome {
        result.record_error(err);
    }
    result.stop();

    ctx.set_current_request(None);
    ctx.append_request_result(result.clone());
    ctx.fire_response_received(&ResponseReceivedEvent {
        client_request_id: ctx.client_request_id(),
        result: &result,
    });

    Ok(match outcome {
        Ok(resp) => Attempt::Succeeded(resp),
        Err((err, retryable)) => Attempt::Failed {
            err,
            retryable,
            result,
            body,
        },
    })
}

fn status_error(resp: &http::Response<Bytes>) -> Error {
    let err = Error::unexpected_status(resp.status());
    match resp
        .headers()
        .get(X_MS_ERROR_CODE)
        .and_then(|v| v.to_str().ok())
    {
        Some(code) => err.with_error_code(code),
        None => err,
    }
}

fn fail(ctx: &OperationContext, err: Error) -> Error {
    err.with_request_results(ctx.request_results())
}
