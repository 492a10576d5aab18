use std::time::Duration;

use anyhow::Result;
use reqretry_core::{
    Body, ClientDefaults, LinearRetry, OperationContext, ServiceClient, StorageRequest, StorageUri,
};
use reqretry_http_send_reqwest::ReqwestHttpSend;
use reqwest::blocking::Client;

fn main() -> Result<()> {
    // Create a custom reqwest client with specific configuration
    let client = Client::builder()
        .pool_max_idle_per_host(10)
        .user_agent("reqretry-example/1.0")
        .build()?;

    let uri = StorageUri::parse("https://httpbin.org/status/503", None)?;
    let service = ServiceClient::new(uri)
        .with_http_send(ReqwestHttpSend::new(client))
        .with_defaults(
            ClientDefaults::default()
                .with_timeout(Duration::from_secs(10))
                .with_retry_policy(LinearRetry::new(Duration::from_secs(1), 2)),
        );

    let mut ctx = OperationContext::new();
    ctx.on_retrying(|e| println!("retry #{} in {:?}", e.retry_count, e.retry_info.retry_interval()));

    let request = StorageRequest::new(
        (),
        |_, uri, _, _| Ok(http::Request::get(uri.clone()).body(Body::Empty)?),
        |resp, _, _, _| Ok(resp.status()),
    );

    match service.execute(request, None, &ctx) {
        Ok(status) => println!("succeeded with {status}"),
        Err(err) => println!("failed: {err}"),
    }
    for (i, result) in ctx.request_results().iter().enumerate() {
        println!(
            "attempt {i}: {:?} at {} in {:?}",
            result.status(),
            result.target_location(),
            result.duration()
        );
    }

    Ok(())
}
