use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use reqretry_core::{AttemptTimeout, Body, ErrorKind, HttpSend, RewindableStream};
use reqretry_http_send_reqwest::ReqwestHttpSend;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Accept one connection, return the received body and answer with `status`.
fn serve_once(status: u16, delay: Duration) -> (String, thread::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();

        thread::sleep(delay);
        let mut stream = stream;
        let _ = write!(
            stream,
            "HTTP/1.1 {status} Status\r\nx-ms-request-id: test-request\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok"
        );
        body
    });

    (addr, handle)
}

#[test]
fn test_send_stream_body() -> anyhow::Result<()> {
    init();
    let (addr, server) = serve_once(201, Duration::ZERO);

    let stream = RewindableStream::from_bytes(vec![b'x'; 4096]);
    let req = http::Request::put(format!("{addr}/container/blob"))
        .body(Body::Stream(stream.clone()))?;

    let resp = ReqwestHttpSend::default().http_send(req)?;
    assert_eq!(resp.status(), http::StatusCode::CREATED);
    assert_eq!(resp.headers()["x-ms-request-id"], "test-request");
    assert_eq!(resp.body().as_ref(), b"ok");

    assert_eq!(server.join().unwrap().len(), 4096);
    assert_eq!(stream.position()?, 4096);
    Ok(())
}

#[test]
fn test_send_bytes_body() -> anyhow::Result<()> {
    init();
    let (addr, server) = serve_once(201, Duration::ZERO);

    let req = http::Request::put(format!("{addr}/container/blob"))
        .body(Body::from(bytes::Bytes::from_static(b"hello world")))?;

    let resp = ReqwestHttpSend::default().http_send(req)?;
    assert_eq!(resp.status(), http::StatusCode::CREATED);
    assert_eq!(server.join().unwrap(), b"hello world".to_vec());
    Ok(())
}

#[test]
fn test_attempt_timeout_is_transport_error() -> anyhow::Result<()> {
    init();
    let (addr, _server) = serve_once(200, Duration::from_secs(2));

    let mut req = http::Request::get(addr).body(Body::Empty)?;
    req.extensions_mut()
        .insert(AttemptTimeout(Duration::from_millis(100)));

    let err = ReqwestHttpSend::default().http_send(req).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    Ok(())
}
