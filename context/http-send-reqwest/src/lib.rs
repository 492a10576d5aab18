//! Blocking [`HttpSend`] implementation on top of `reqwest`.

use bytes::Bytes;
use log::debug;
use reqretry_core::{AttemptTimeout, Body, Error, HttpSend, Result};
use reqwest::blocking::{Client, Request};

/// ReqwestHttpSend sends requests with a blocking [`reqwest`] client.
///
/// The [`AttemptTimeout`] extension attached by the engine overrides the
/// client wide timeout for that request. Stream bodies are streamed from
/// their shared handle, so a failed upload can be rewound and sent again.
#[derive(Debug, Default, Clone)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend with a reqwest::blocking::Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl HttpSend for ReqwestHttpSend {
    fn http_send(&self, req: http::Request<Body>) -> Result<http::Response<Bytes>> {
        let timeout = req.extensions().get::<AttemptTimeout>().map(|t| t.0);
        let req = req.map(into_reqwest_body);

        let mut req = Request::try_from(req).map_err(|e| {
            Error::invalid_argument("request cannot be sent by reqwest").with_source(e)
        })?;
        if let Some(timeout) = timeout {
            *req.timeout_mut() = Some(timeout);
        }
        debug!("sending {} {} with timeout {:?}", req.method(), req.url(), timeout);

        let resp = self.client.execute(req).map_err(transport)?;
        let status = resp.status();
        let version = resp.version();
        let headers = resp.headers().clone();
        let body = resp.bytes().map_err(transport)?;

        let mut out = http::Response::new(body);
        *out.status_mut() = status;
        *out.version_mut() = version;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

fn into_reqwest_body(body: Body) -> reqwest::blocking::Body {
    match body {
        Body::Empty => reqwest::blocking::Body::from(Bytes::new()),
        Body::Bytes(bs) => reqwest::blocking::Body::from(bs),
        Body::Stream(stream) => {
            let len = stream.len();
            reqwest::blocking::Body::sized(stream, len)
        }
    }
}

fn transport(err: reqwest::Error) -> Error {
    Error::transport(format!("failed to send request: {err}")).with_source(err)
}
