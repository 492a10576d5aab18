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

use std::mem;
use std::str::FromStr;

use http::header::HeaderName;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, Method, Uri};
use reqretry_core::{Error, Result};

/// Request taken apart for signing.
///
/// Headers are moved out of the request and put back by [`SigningRequest::apply`].
#[derive(Debug)]
pub(crate) struct SigningRequest {
    pub method: Method,
    pub scheme: Scheme,
    pub authority: Authority,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl SigningRequest {
    pub fn build(parts: &mut http::request::Parts) -> Result<Self> {
        let uri = mem::take(&mut parts.uri).into_parts();
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(SigningRequest {
            method: parts.method.clone(),
            scheme: uri.scheme.unwrap_or(Scheme::HTTP),
            authority: uri.authority.ok_or_else(|| {
                Error::invalid_argument("request without authority is invalid for signing")
            })?,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),
            headers: mem::take(&mut parts.headers),
        })
    }

    pub fn apply(mut self, parts: &mut http::request::Parts) -> Result<()> {
        mem::swap(&mut parts.headers, &mut self.headers);
        parts.method = self.method;

        let mut paq = self.path;
        for (i, (k, v)) in self.query.iter().enumerate() {
            paq.push(if i == 0 { '?' } else { '&' });
            paq.push_str(k);
            if !v.is_empty() {
                paq.push('=');
                paq.push_str(v);
            }
        }

        let mut uri_parts = mem::take(&mut parts.uri).into_parts();
        uri_parts.scheme = Some(self.scheme);
        uri_parts.authority = Some(self.authority);
        uri_parts.path_and_query = Some(PathAndQuery::from_str(&paq)?);
        parts.uri = Uri::from_parts(uri_parts)?;

        Ok(())
    }

    /// Push a raw query string, already encoded, into the query list.
    pub fn query_append(&mut self, query: &str) {
        self.query.push((query.to_string(), "".to_string()));
    }

    /// Header value, or an empty string if absent.
    pub fn header_get_or_default(&self, key: &HeaderName) -> Result<&str> {
        match self.headers.get(key) {
            Some(v) => v.to_str().map_err(|e| {
                Error::invalid_argument(format!("header {key} is not valid utf-8")).with_source(e)
            }),
            None => Ok(""),
        }
    }

    /// Lowercased headers whose name starts with `prefix`.
    pub fn header_to_vec_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        self.headers
            .iter()
            .filter(|(k, _)| k.as_str().starts_with(prefix))
            .map(|(k, v)| {
                let v = v.to_str().map_err(|e| {
                    Error::invalid_argument(format!("header {k} is not valid utf-8"))
                        .with_source(e)
                })?;
                Ok((k.as_str().to_lowercase(), v.trim().to_string()))
            })
            .collect()
    }

    /// Join sorted pairs: `[(a, b), (c, d)] => "a:b\nc:d"`.
    pub fn pairs_to_string(mut pairs: Vec<(String, String)>, sep: &str, join: &str) -> String {
        pairs.sort();

        let mut s = String::with_capacity(16);
        for (idx, (k, v)) in pairs.into_iter().enumerate() {
            if idx != 0 {
                s.push_str(join);
            }
            s.push_str(&k);
            s.push_str(sep);
            s.push_str(&v);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_and_apply_round_trip() {
        let req = http::Request::put("https://acct.blob.core.windows.net/c/b?comp=block&blockid=AA%3D%3D")
            .header("x-ms-meta-Name", " value ")
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        let mut ctx = SigningRequest::build(&mut parts).unwrap();
        assert_eq!(ctx.path, "/c/b");
        assert_eq!(
            ctx.query,
            vec![
                ("comp".to_string(), "block".to_string()),
                ("blockid".to_string(), "AA==".to_string())
            ]
        );
        assert_eq!(
            ctx.header_to_vec_with_prefix("x-ms-").unwrap(),
            vec![("x-ms-meta-name".to_string(), "value".to_string())]
        );

        ctx.query = vec![("comp".to_string(), "list".to_string())];
        ctx.query_append("sv=2021&sig=abc");
        ctx.apply(&mut parts).unwrap();
        assert_eq!(
            parts.uri.to_string(),
            "https://acct.blob.core.windows.net/c/b?comp=list&sv=2021&sig=abc"
        );
        assert!(parts.headers.contains_key("x-ms-meta-name"));
    }
}
