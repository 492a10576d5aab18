use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use reqretry_core::{
    AttemptTimeout, Body, ClientDefaults, Error, ErrorKind, HttpSend, LinearRetry, LocationMode,
    NoRetry, OperationContext, RequestLocationMode, RequestOptions, Result, RewindableStream,
    ServiceClient, SignRequest, StatusOutcome, StatusTable, StorageLocation, StorageRequest,
    StorageUri, X_MS_CLIENT_REQUEST_ID,
};

const PRIMARY: &str = "https://acct.blob.core.windows.net/container/blob";
const SECONDARY: &str = "https://acct-secondary.blob.core.windows.net/container/blob";

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the fake transport does with the next request.
#[derive(Debug, Clone)]
enum Step {
    Respond(StatusCode),
    RespondWithErrorCode(StatusCode, &'static str),
    /// Read this many body bytes, then drop the connection.
    FailAfterReading(usize),
}

#[derive(Debug, Clone)]
struct Sent {
    host: String,
    client_request_id: Option<String>,
    timeout: Option<Duration>,
    body_len: usize,
}

/// Plays back a fixed script of responses and records what was sent.
#[derive(Debug, Clone, Default)]
struct ScriptedHttpSend {
    steps: Arc<Mutex<VecDeque<Step>>>,
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl ScriptedHttpSend {
    fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            sent: Arc::default(),
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn hosts(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.host).collect()
    }
}

impl HttpSend for ScriptedHttpSend {
    fn http_send(&self, req: http::Request<Body>) -> Result<http::Response<Bytes>> {
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");

        let mut sent = Sent {
            host: req.uri().host().unwrap_or_default().to_string(),
            client_request_id: req
                .headers()
                .get(X_MS_CLIENT_REQUEST_ID)
                .map(|v| v.to_str().unwrap().to_string()),
            timeout: req.extensions().get::<AttemptTimeout>().map(|t| t.0),
            body_len: 0,
        };

        let result = match step {
            Step::FailAfterReading(n) => {
                if let Body::Stream(mut stream) = req.into_body() {
                    let mut buf = vec![0; n];
                    stream.read_exact(&mut buf).unwrap();
                    sent.body_len = n;
                }
                Err(Error::transport("connection reset by peer"))
            }
            Step::Respond(status) | Step::RespondWithErrorCode(status, _) => {
                sent.body_len = match req.body() {
                    Body::Stream(_) => req.body().read_to_bytes().unwrap().len(),
                    other => other.len() as usize,
                };
                let mut resp = http::Response::new(Bytes::from_static(b"payload"));
                *resp.status_mut() = status;
                if let Step::RespondWithErrorCode(_, code) = step {
                    resp.headers_mut()
                        .insert("x-ms-error-code", HeaderValue::from_static(code));
                }
                Ok(resp)
            }
        };

        self.sent.lock().unwrap().push(sent);
        result
    }
}

/// Records the host of every request it signs.
#[derive(Debug, Clone, Default)]
struct RecordingSigner {
    hosts: Arc<Mutex<Vec<String>>>,
}

impl SignRequest for RecordingSigner {
    fn sign_request(&self, req: &mut http::request::Parts, _: &OperationContext) -> Result<()> {
        self.hosts
            .lock()
            .unwrap()
            .push(req.uri.host().unwrap_or_default().to_string());
        req.headers
            .insert("authorization", HeaderValue::from_static("signed"));
        Ok(())
    }
}

fn client(http: &ScriptedHttpSend, secondary: bool) -> ServiceClient {
    let uri = StorageUri::parse(PRIMARY, secondary.then_some(SECONDARY)).unwrap();
    ServiceClient::new(uri)
        .with_http_send(http.clone())
        .with_defaults(
            ClientDefaults::default().with_retry_policy(LinearRetry::new(Duration::ZERO, 3)),
        )
}

fn get_request<'a>() -> StorageRequest<'a, (), Bytes> {
    StorageRequest::new(
        (),
        |_, uri, _, _| Ok(http::Request::get(uri.clone()).body(Body::Empty)?),
        |resp, _, _, _| Ok(resp.into_body()),
    )
}

#[test]
fn test_primary_only_500_surfaces_last_error_with_history() {
    init();
    let http = ScriptedHttpSend::new([
        Step::RespondWithErrorCode(StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        Step::RespondWithErrorCode(StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
    ]);
    let options = RequestOptions::new().with_retry_policy(LinearRetry::new(Duration::ZERO, 1));
    let ctx = OperationContext::new();

    let err = client(&http, false)
        .execute(get_request(), Some(&options), &ctx)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnexpectedStatus);
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(err.error_code(), Some("InternalError"));
    assert!(!err.is_budget_exceeded());
    assert_eq!(err.request_results().len(), 2);
    for result in err.request_results() {
        assert_eq!(result.target_location(), StorageLocation::Primary);
        assert_eq!(result.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }
    assert_eq!(ctx.request_results().len(), 2);
    assert_eq!(
        http.hosts(),
        vec!["acct.blob.core.windows.net", "acct.blob.core.windows.net"]
    );
}

#[test]
fn test_no_retry_makes_exactly_one_attempt() {
    init();
    let http = ScriptedHttpSend::new([Step::Respond(StatusCode::SERVICE_UNAVAILABLE)]);
    let options = RequestOptions::new().with_retry_policy(NoRetry);
    let ctx = OperationContext::new();

    let err = client(&http, false)
        .execute(get_request(), Some(&options), &ctx)
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(http.sent().len(), 1);
    assert_eq!(ctx.request_results().len(), 1);
}

#[test]
fn test_zero_execution_time_makes_exactly_one_attempt() {
    init();
    let http = ScriptedHttpSend::new([Step::Respond(StatusCode::SERVICE_UNAVAILABLE)]);
    let options = RequestOptions::new()
        .with_retry_policy(LinearRetry::new(Duration::ZERO, 10))
        .with_maximum_execution_time(Duration::ZERO);
    let ctx = OperationContext::new();

    let err = client(&http, false)
        .execute(get_request(), Some(&options), &ctx)
        .unwrap_err();

    // The last real failure is surfaced, not a synthetic timeout.
    assert_eq!(err.kind(), ErrorKind::UnexpectedStatus);
    assert!(err.is_budget_exceeded());
    assert_eq!(http.sent().len(), 1);
}

#[test]
fn test_budget_runs_out_after_a_retry() {
    init();
    let http = ScriptedHttpSend::new([
        Step::Respond(StatusCode::INTERNAL_SERVER_ERROR),
        Step::Respond(StatusCode::INTERNAL_SERVER_ERROR),
        Step::Respond(StatusCode::INTERNAL_SERVER_ERROR),
    ]);
    // Room for one 200ms wait, not for a second one.
    let options = RequestOptions::new()
        .with_retry_policy(LinearRetry::new(Duration::from_millis(200), 10))
        .with_maximum_execution_time(Duration::from_millis(300));
    let ctx = OperationContext::new();

    let err = client(&http, false)
        .execute(get_request(), Some(&options), &ctx)
        .unwrap_err();

    assert!(err.is_budget_exceeded());
    assert_eq!(err.kind(), ErrorKind::UnexpectedStatus);
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(err.request_results().len(), 2);
    assert_eq!(ctx.request_results().len(), 2);
    assert_eq!(
        http.hosts(),
        vec!["acct.blob.core.windows.net", "acct.blob.core.windows.net"]
    );
}

#[test]
fn test_stream_is_rewound_before_retry() {
    init();
    const SIZE: usize = 10 * 1024 * 1024;

    let http = ScriptedHttpSend::new([
        Step::FailAfterReading(3 * 1024 * 1024),
        Step::Respond(StatusCode::CREATED),
    ]);
    let stream = RewindableStream::from_bytes(vec![0xAB; SIZE]);
    let request = StorageRequest::new(
        stream,
        |stream: &mut RewindableStream, uri, _, _| {
            Ok(http::Request::put(uri.clone()).body(Body::Stream(stream.clone()))?)
        },
        |resp, _, _, _| Ok(resp.status()),
    )
    .with_location_mode(RequestLocationMode::PrimaryOnly)
    .with_statuses(StatusTable::expect([StatusCode::CREATED]));
    let ctx = OperationContext::new();

    let status = client(&http, false).execute(request, None, &ctx).unwrap();

    assert_eq!(status, StatusCode::CREATED);
    let sent = http.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].body_len, 3 * 1024 * 1024);
    assert_eq!(sent[1].body_len, SIZE);
    assert_eq!(
        ctx.request_results()[0].error_kind(),
        Some(ErrorKind::Transport)
    );
}

#[test]
fn test_custom_recover_replaces_default_rewind() {
    init();
    let http = ScriptedHttpSend::new([
        Step::FailAfterReading(4),
        Step::Respond(StatusCode::OK),
    ]);
    let recovered = Arc::new(AtomicUsize::new(0));
    let counter = recovered.clone();
    let request = StorageRequest::new(
        RewindableStream::from_bytes("0123456789"),
        |stream: &mut RewindableStream, uri, _, _| {
            Ok(http::Request::put(uri.clone()).body(Body::Stream(stream.clone()))?)
        },
        |_, _, _, _| Ok(()),
    )
    .with_recover(move |stream, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        // Resume where the failed attempt stopped.
        stream.mark()
    });

    client(&http, false)
        .execute(request, None, &OperationContext::new())
        .unwrap();

    assert_eq!(recovered.load(Ordering::SeqCst), 1);
    assert_eq!(http.sent()[1].body_len, 6);
}

#[test]
fn test_recover_failure_is_terminal() {
    init();
    let http = ScriptedHttpSend::new([Step::Respond(StatusCode::SERVICE_UNAVAILABLE)]);
    let request = get_request().with_recover(|_, _| Err(Error::unexpected("cannot rewind")));
    let ctx = OperationContext::new();

    let err = client(&http, false)
        .execute(request, None, &ctx)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert_eq!(err.request_results().len(), 1);
    assert_eq!(http.sent().len(), 1);
}

#[test]
fn test_post_process_failure_is_not_retried() {
    init();
    let http = ScriptedHttpSend::new([Step::Respond(StatusCode::OK)]);
    let request: StorageRequest<'_, (), ()> = StorageRequest::new(
        (),
        |_, uri, _, _| Ok(http::Request::get(uri.clone()).body(Body::Empty)?),
        |_, _, _, _| Err(Error::protocol("malformed listing")),
    );
    let ctx = OperationContext::new();

    let err = client(&http, false)
        .execute(request, None, &ctx)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.request_results().len(), 1);
    assert!(!err.request_results()[0].is_failure());
    assert_eq!(http.sent().len(), 1);
}

#[test]
fn test_terminal_status_is_not_retried() {
    init();
    let http = ScriptedHttpSend::new([Step::RespondWithErrorCode(
        StatusCode::CONFLICT,
        "ContainerAlreadyExists",
    )]);
    let request = get_request().with_statuses(
        StatusTable::expect([StatusCode::CREATED])
            .with(StatusCode::CONFLICT, StatusOutcome::Terminal),
    );

    let err = client(&http, false)
        .execute(request, None, &OperationContext::new())
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    assert_eq!(err.error_code(), Some("ContainerAlreadyExists"));
    assert_eq!(http.sent().len(), 1);
}

#[test]
fn test_client_errors_are_left_to_the_policy() {
    init();
    // 403 is not in the table, so the policy decides, and it refuses.
    let http = ScriptedHttpSend::new([Step::Respond(StatusCode::FORBIDDEN)]);

    let err = client(&http, false)
        .execute(get_request(), None, &OperationContext::new())
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
    assert_eq!(http.sent().len(), 1);
}

#[test]
fn test_primary_then_secondary_alternates() {
    init();
    let http = ScriptedHttpSend::new([
        Step::Respond(StatusCode::SERVICE_UNAVAILABLE),
        Step::Respond(StatusCode::SERVICE_UNAVAILABLE),
        Step::Respond(StatusCode::OK),
    ]);
    let options = RequestOptions::new().with_location_mode(LocationMode::PrimaryThenSecondary);
    let ctx = OperationContext::new();

    let body = client(&http, true)
        .execute(get_request(), Some(&options), &ctx)
        .unwrap();

    assert_eq!(body, Bytes::from_static(b"payload"));
    assert_eq!(
        http.hosts(),
        vec![
            "acct.blob.core.windows.net",
            "acct-secondary.blob.core.windows.net",
            "acct.blob.core.windows.net",
        ]
    );
    let locations: Vec<_> = ctx
        .request_results()
        .iter()
        .map(|r| r.target_location())
        .collect();
    assert_eq!(
        locations,
        vec![
            StorageLocation::Primary,
            StorageLocation::Secondary,
            StorageLocation::Primary
        ]
    );
}

#[test]
fn test_secondary_not_found_pins_primary() {
    init();
    let http = ScriptedHttpSend::new([
        Step::Respond(StatusCode::NOT_FOUND),
        Step::Respond(StatusCode::INTERNAL_SERVER_ERROR),
        Step::Respond(StatusCode::OK),
    ]);
    let options = RequestOptions::new().with_location_mode(LocationMode::SecondaryThenPrimary);

    client(&http, true)
        .execute(get_request(), Some(&options), &OperationContext::new())
        .unwrap();

    assert_eq!(
        http.hosts(),
        vec![
            "acct-secondary.blob.core.windows.net",
            "acct.blob.core.windows.net",
            "acct.blob.core.windows.net",
        ]
    );
}

#[test]
fn test_write_under_secondary_only_is_rejected() {
    init();
    let http = ScriptedHttpSend::default();
    let options = RequestOptions::new().with_location_mode(LocationMode::SecondaryOnly);
    let request = get_request().with_location_mode(RequestLocationMode::PrimaryOnly);
    let ctx = OperationContext::new();

    let err = client(&http, true)
        .execute(request, Some(&options), &ctx)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(http.sent().is_empty());
    assert!(ctx.request_results().is_empty());
}

#[test]
fn test_missing_secondary_is_rejected() {
    init();
    let http = ScriptedHttpSend::default();
    let options = RequestOptions::new().with_location_mode(LocationMode::PrimaryThenSecondary);

    let err = client(&http, false)
        .execute(get_request(), Some(&options), &OperationContext::new())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(http.sent().is_empty());
}

#[test]
fn test_request_id_timeout_and_signing_per_attempt() {
    init();
    let http = ScriptedHttpSend::new([
        Step::Respond(StatusCode::SERVICE_UNAVAILABLE),
        Step::Respond(StatusCode::OK),
    ]);
    let signer = RecordingSigner::default();
    let client = client(&http, true)
        .with_signer(signer.clone())
        .with_defaults(
            ClientDefaults::default()
                .with_location_mode(LocationMode::PrimaryThenSecondary)
                .with_timeout(Duration::from_secs(30))
                .with_retry_policy(LinearRetry::new(Duration::ZERO, 3)),
        );
    let ctx = OperationContext::with_client_request_id("7c9e6679-7425-40de-944b-e07fc1f90ae7");

    client.execute(get_request(), None, &ctx).unwrap();

    let sent = http.sent();
    for s in &sent {
        assert_eq!(
            s.client_request_id.as_deref(),
            Some("7c9e6679-7425-40de-944b-e07fc1f90ae7")
        );
        assert_eq!(s.timeout, Some(Duration::from_secs(30)));
    }
    assert_eq!(*signer.hosts.lock().unwrap(), http.hosts());
}

#[test]
fn test_attempt_timeout_is_bounded_by_remaining_budget() {
    init();
    let http = ScriptedHttpSend::new([Step::Respond(StatusCode::OK)]);
    let options = RequestOptions::new().with_maximum_execution_time(Duration::from_secs(5));

    client(&http, false)
        .execute(get_request(), Some(&options), &OperationContext::new())
        .unwrap();

    let timeout = http.sent()[0].timeout.unwrap();
    assert!(timeout <= Duration::from_secs(5));
}

#[test]
fn test_hooks_fire_once_per_attempt() {
    init();
    let http = ScriptedHttpSend::new([
        Step::Respond(StatusCode::SERVICE_UNAVAILABLE),
        Step::FailAfterReading(0),
        Step::Respond(StatusCode::OK),
    ]);
    let sending = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(AtomicUsize::new(0));
    let retrying = Arc::new(Mutex::new(Vec::new()));

    let mut ctx = OperationContext::new();
    {
        let sending = sending.clone();
        ctx.on_sending_request(move |e| {
            assert!(e.request.headers().contains_key(X_MS_CLIENT_REQUEST_ID));
            sending.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let received = received.clone();
        ctx.on_response_received(move |_| {
            received.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let retrying = retrying.clone();
        ctx.on_retrying(move |e| retrying.lock().unwrap().push(e.retry_count));
    }

    client(&http, false)
        .execute(get_request(), None, &ctx)
        .unwrap();

    assert_eq!(sending.load(Ordering::SeqCst), 3);
    assert_eq!(received.load(Ordering::SeqCst), 3);
    assert_eq!(*retrying.lock().unwrap(), vec![1, 2]);
    assert!(ctx.current_request().is_none());
}

#[test]
fn test_unconfigured_transport_is_terminal() {
    init();
    let uri = StorageUri::parse(PRIMARY, None).unwrap();
    let client = ServiceClient::new(uri);
    let ctx = OperationContext::new();

    let err = client.execute(get_request(), None, &ctx).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert_eq!(ctx.request_results().len(), 1);
}

#[test]
fn test_context_is_reset_between_operations() {
    init();
    let http = ScriptedHttpSend::new([
        Step::Respond(StatusCode::SERVICE_UNAVAILABLE),
        Step::Respond(StatusCode::OK),
        Step::Respond(StatusCode::OK),
    ]);
    let client = client(&http, false);
    let ctx = OperationContext::new();

    client.execute(get_request(), None, &ctx).unwrap();
    assert_eq!(ctx.request_results().len(), 2);

    client.execute(get_request(), None, &ctx).unwrap();
    assert_eq!(ctx.request_results().len(), 1);
    let ids: Vec<_> = http
        .sent()
        .into_iter()
        .map(|s| s.client_request_id)
        .collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
}
