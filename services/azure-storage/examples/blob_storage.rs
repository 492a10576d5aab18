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

//! List containers of a storage account, falling back to the secondary
//! endpoint when the primary is unavailable.
//!
//! Reads `AZBLOB_ACCOUNT_NAME`, `AZBLOB_ACCOUNT_KEY` or `AZURE_STORAGE_SAS_TOKEN`
//! from the environment. Without an account name the local emulator is used.

use std::time::Duration;

use http::StatusCode;
use reqretry_azure_storage::{Config, StorageAccount, StorageService};
use reqretry_core::{
    Body, ExponentialRetry, LocationMode, OperationContext, OsEnv, RequestLocationMode,
    RequestOptions, Result, StatusTable, StorageRequest,
};
use reqretry_http_send_reqwest::ReqwestHttpSend;

fn main() -> Result<()> {
    let _ = env_logger::builder().try_init();
    let _ = dotenv::dotenv();

    let config = Config::default().from_env(&OsEnv);
    let account = match config.account_name {
        Some(_) => StorageAccount::from_config(config)?,
        None => {
            println!("AZBLOB_ACCOUNT_NAME is not set, using development storage");
            StorageAccount::development_storage()
        }
    };
    let secondary = account.endpoint(StorageService::Blob)?.secondary().is_some();

    let client = account.service_client(StorageService::Blob, ReqwestHttpSend::default())?;

    let request = StorageRequest::new(
        (),
        |_, uri, _, _| {
            let uri = format!("{}?comp=list", uri.to_string().trim_end_matches('/'));
            Ok(http::Request::get(uri).body(Body::Empty)?)
        },
        |resp, _, _, _| Ok(String::from_utf8_lossy(resp.body()).into_owned()),
    )
    .with_location_mode(RequestLocationMode::PrimaryOrSecondary)
    .with_statuses(StatusTable::expect([StatusCode::OK]));

    let mut options = RequestOptions::new()
        .with_retry_policy(
            ExponentialRetry::new()
                .with_delta_backoff(Duration::from_secs(1))
                .with_max_attempts(4),
        )
        .with_maximum_execution_time(Duration::from_secs(30));
    if secondary {
        options = options.with_location_mode(LocationMode::PrimaryThenSecondary);
    }

    let mut ctx = OperationContext::new();
    ctx.on_response_received(|event| {
        println!(
            "attempt at {} finished with {:?}",
            event.result.target_location(),
            event.result.status()
        );
    });

    match client.execute(request, Some(&options), &ctx) {
        Ok(listing) => println!("containers:\n{listing}"),
        Err(err) => {
            println!("list containers failed: {err}");
            for result in err.request_results() {
                println!("  {result:?}");
            }
        }
    }

    Ok(())
}
