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

//! Azure Storage support for reqretry.
//!
//! This crate knows how Azure Storage accounts are addressed and how their
//! requests are authenticated:
//!
//! - [`StorageAccount`] derives the primary and secondary endpoint of every
//!   service from an account name, or points at the local emulator.
//! - [`RequestSigner`] signs requests with a Shared Key or a SAS token.
//! - [`Config`] loads account settings from the environment.
//!
//! ## Example
//!
//! ```no_run
//! use reqretry_azure_storage::{Config, StorageAccount, StorageService};
//! use reqretry_core::{
//!     Body, LocationMode, NoopHttpSend, OperationContext, OsEnv, RequestOptions, Result,
//!     StorageRequest,
//! };
//!
//! fn main() -> Result<()> {
//!     let account = StorageAccount::from_config(Config::default().from_env(&OsEnv))?;
//!     // Plug a real transport here, for example `reqretry-http-send-reqwest`.
//!     let client = account.service_client(StorageService::Blob, NoopHttpSend)?;
//!
//!     let request = StorageRequest::new(
//!         (),
//!         |_, uri, _, _| {
//!             let uri = format!("{uri}?comp=list");
//!             Ok(http::Request::get(uri).body(Body::Empty)?)
//!         },
//!         |resp, _, _, _| Ok(resp.into_body()),
//!     );
//!
//!     let options = RequestOptions::new().with_location_mode(LocationMode::PrimaryThenSecondary);
//!     let containers = client.execute(request, Some(&options), &OperationContext::new())?;
//!     println!("{}", String::from_utf8_lossy(&containers));
//!
//!     Ok(())
//! }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

mod constants;
mod signing;

mod config;
pub use config::Config;

mod credential;
pub use credential::Credential;

mod sign_request;
pub use sign_request::RequestSigner;

mod account;
pub use account::{StorageAccount, StorageService};
