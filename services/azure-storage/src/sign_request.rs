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

use std::fmt::Write;

use http::request::Parts;
use http::{header, HeaderName, HeaderValue};
use log::debug;
use percent_encoding::{percent_decode_str, percent_encode};
use reqretry_core::hash::{base64_decode, base64_hmac_sha256};
use reqretry_core::time::{format_http_date, now, DateTime};
use reqretry_core::{Error, OperationContext, Result, SignRequest};

use crate::constants::*;
use crate::signing::SigningRequest;
use crate::Credential;

/// RequestSigner authenticates requests against an Azure Storage account.
///
/// - [Authorize with Shared Key](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
/// - [Delegate access with a shared access signature](https://docs.microsoft.com/en-us/rest/api/storageservices/delegate-access-with-shared-access-signature)
///
/// Every request also gets the `x-ms-version` header unless it already
/// carries one.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credential: Credential,
    version: String,
    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new signer for `credential`.
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            version: AZURE_VERSION.to_string(),
            time: None,
        }
    }

    /// Override the service version sent as `x-ms-version`.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    #[cfg(test)]
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// The credential requests are signed with.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

impl SignRequest for RequestSigner {
    fn sign_request(&self, req: &mut Parts, _: &OperationContext) -> Result<()> {
        if !self.credential.is_valid() {
            return Err(Error::invalid_argument(format!(
                "credential is incomplete: {:?}",
                self.credential
            )));
        }

        if !req.headers.contains_key(X_MS_VERSION) {
            req.headers
                .insert(X_MS_VERSION, HeaderValue::from_str(&self.version)?);
        }

        let mut ctx = SigningRequest::build(req)?;

        match &self.credential {
            Credential::Anonymous => {}
            Credential::SasToken { token } => {
                ctx.query_append(token);
            }
            Credential::SharedKey {
                account_name,
                account_key,
            } => {
                let now_time = self.time.unwrap_or_else(now);
                ctx.headers
                    .insert(X_MS_DATE, HeaderValue::from_str(&format_http_date(now_time))?);

                let string_to_sign = string_to_sign(&ctx, account_name)?;
                let key = base64_decode(account_key)?;
                let signature = base64_hmac_sha256(&key, string_to_sign.as_bytes());

                let mut value =
                    HeaderValue::from_str(&format!("SharedKey {account_name}:{signature}"))?;
                value.set_sensitive(true);
                ctx.headers.insert(header::AUTHORIZATION, value);
            }
        }

        // Query values were decoded while taking the request apart.
        for (_, v) in ctx.query.iter_mut() {
            *v = percent_encode(v.as_bytes(), &AZURE_QUERY_ENCODE_SET).to_string();
        }

        ctx.apply(req)
    }
}

/// Construct string to sign
///
/// ## Format
///
/// ```text
/// VERB + "\n" +
/// Content-Encoding + "\n" +
/// Content-Language + "\n" +
/// Content-Length + "\n" +
/// Content-MD5 + "\n" +
/// Content-Type + "\n" +
/// Date + "\n" +
/// If-Modified-Since + "\n" +
/// If-Match + "\n" +
/// If-None-Match + "\n" +
/// If-Unmodified-Since + "\n" +
/// Range + "\n" +
/// CanonicalizedHeaders +
/// CanonicalizedResource;
/// ```
///
/// ## Reference
///
/// - [Blob, Queue, and File Services (Shared Key authorization)](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
fn string_to_sign(ctx: &SigningRequest, account_name: &str) -> Result<String> {
    let content_md5 = HeaderName::from_static(CONTENT_MD5);
    let standard_headers = [
        &header::CONTENT_ENCODING,
        &header::CONTENT_LANGUAGE,
        &header::CONTENT_LENGTH,
        &content_md5,
        &header::CONTENT_TYPE,
        &header::DATE,
        &header::IF_MODIFIED_SINCE,
        &header::IF_MATCH,
        &header::IF_NONE_MATCH,
        &header::IF_UNMODIFIED_SINCE,
        &header::RANGE,
    ];

    let mut s = String::with_capacity(256);
    push_line(&mut s, ctx.method.as_str())?;
    for name in standard_headers {
        let value = ctx.header_get_or_default(name)?;
        // A zero length is signed as empty since version 2015-02-21.
        if *name == header::CONTENT_LENGTH && value == "0" {
            push_line(&mut s, "")?;
        } else {
            push_line(&mut s, value)?;
        }
    }
    push_line(&mut s, &canonicalize_header(ctx)?)?;
    write!(&mut s, "{}", canonicalize_resource(ctx, account_name))
        .map_err(|e| Error::unexpected("failed to write string to sign").with_source(e))?;

    debug!("string to sign: {}", &s);

    Ok(s)
}

fn push_line(s: &mut String, line: &str) -> Result<()> {
    writeln!(s, "{line}")
        .map_err(|e| Error::unexpected("failed to write string to sign").with_source(e))
}

/// ## Reference
///
/// - [Constructing the canonicalized headers string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-headers-string)
fn canonicalize_header(ctx: &SigningRequest) -> Result<String> {
    Ok(SigningRequest::pairs_to_string(
        ctx.header_to_vec_with_prefix("x-ms-")?,
        ":",
        "\n",
    ))
}

/// ## Reference
///
/// - [Constructing the canonicalized resource string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-resource-string)
fn canonicalize_resource(ctx: &SigningRequest, account_name: &str) -> String {
    let path = percent_decode_str(&ctx.path).decode_utf8_lossy();
    if ctx.query.is_empty() {
        return format!("/{account_name}{path}");
    }

    let query = ctx
        .query
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();

    format!(
        "/{account_name}{path}\n{}",
        SigningRequest::pairs_to_string(query, ":", "\n")
    )
}
