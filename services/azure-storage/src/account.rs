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

use std::fmt;

use log::debug;
use reqretry_core::{Error, HttpSend, Result, ServiceClient, StorageUri};

use crate::constants::*;
use crate::{Config, Credential, RequestSigner};

/// The services a storage account exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageService {
    /// Blob service.
    Blob,
    /// Queue service.
    Queue,
    /// Table service.
    Table,
    /// File service.
    File,
}

impl StorageService {
    /// Name of the service in endpoint host names.
    pub fn endpoint_name(self) -> &'static str {
        match self {
            StorageService::Blob => "blob",
            StorageService::Queue => "queue",
            StorageService::Table => "table",
            StorageService::File => "file",
        }
    }

    fn index(self) -> usize {
        match self {
            StorageService::Blob => 0,
            StorageService::Queue => 1,
            StorageService::Table => 2,
            StorageService::File => 3,
        }
    }
}

impl fmt::Display for StorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint_name())
    }
}

const SERVICES: [StorageService; 4] = [
    StorageService::Blob,
    StorageService::Queue,
    StorageService::Table,
    StorageService::File,
];

/// StorageAccount is a storage account together with the credential used to
/// access it and the address of each of its services.
///
/// ```
/// use reqretry_azure_storage::{Credential, StorageAccount, StorageService};
///
/// let account = StorageAccount::new("acct", Credential::Anonymous).unwrap();
/// let blob = account.endpoint(StorageService::Blob).unwrap();
/// assert_eq!(blob.primary(), "https://acct.blob.core.windows.net/");
/// assert_eq!(
///     blob.secondary().unwrap(),
///     "https://acct-secondary.blob.core.windows.net/"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct StorageAccount {
    name: String,
    credential: Credential,
    endpoints: [Option<StorageUri>; 4],
}

impl StorageAccount {
    /// Create an account with the default public cloud endpoints.
    pub fn new(name: &str, credential: Credential) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("account name must not be empty"));
        }

        let mut endpoints: [Option<StorageUri>; 4] = Default::default();
        for service in SERVICES {
            let svc = service.endpoint_name();
            endpoints[service.index()] = Some(StorageUri::parse(
                &format!("https://{name}.{svc}.core.windows.net"),
                Some(&format!("https://{name}-secondary.{svc}.core.windows.net")),
            )?);
        }

        Ok(Self {
            name: name.to_string(),
            credential,
            endpoints,
        })
    }

    /// Account of the local storage emulator.
    ///
    /// Only blob, queue and table are emulated, on ports 10000 to 10002.
    /// The emulator reaches its secondary under a different path, so no
    /// secondary uri is configured.
    pub fn development_storage() -> Self {
        let mut endpoints: [Option<StorageUri>; 4] = Default::default();
        for (service, port) in [
            (StorageService::Blob, 10000),
            (StorageService::Queue, 10001),
            (StorageService::Table, 10002),
        ] {
            let primary = format!("http://127.0.0.1:{port}/{DEVSTORE_ACCOUNT_NAME}")
                .parse()
                .ok();
            endpoints[service.index()] = primary.and_then(|uri| StorageUri::from_primary(uri).ok());
        }

        Self {
            name: DEVSTORE_ACCOUNT_NAME.to_string(),
            credential: Credential::with_shared_key(DEVSTORE_ACCOUNT_NAME, DEVSTORE_ACCOUNT_KEY),
            endpoints,
        }
    }

    /// Build an account from config.
    ///
    /// The credential is a shared key when both account name and key are
    /// set, a SAS token when one is set, and anonymous otherwise. A
    /// configured endpoint replaces the derived blob endpoint.
    pub fn from_config(config: Config) -> Result<Self> {
        let name = config.account_name.as_deref().ok_or_else(|| {
            Error::invalid_argument(format!("{AZBLOB_ACCOUNT_NAME} is required"))
        })?;

        let credential = match (&config.account_key, &config.sas_token) {
            (Some(key), _) => Credential::with_shared_key(name, key),
            (None, Some(token)) => Credential::with_sas_token(token),
            (None, None) => Credential::Anonymous,
        };

        let mut account = Self::new(name, credential)?;
        if let Some(endpoint) = &config.endpoint {
            let uri = StorageUri::parse(endpoint, config.secondary_endpoint.as_deref())?;
            account = account.with_endpoint(StorageService::Blob, uri);
        } else if config.secondary_endpoint.is_some() {
            return Err(Error::invalid_argument(format!(
                "{AZBLOB_SECONDARY_ENDPOINT} requires {AZBLOB_ENDPOINT}"
            )));
        }

        debug!("loaded storage account {name} with {:?}", account.credential);
        Ok(account)
    }

    /// Replace the address of `service`.
    pub fn with_endpoint(mut self, service: StorageService, uri: StorageUri) -> Self {
        self.endpoints[service.index()] = Some(uri);
        self
    }

    /// Account name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Credential requests are signed with.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Address of `service`.
    pub fn endpoint(&self, service: StorageService) -> Result<&StorageUri> {
        self.endpoints[service.index()].as_ref().ok_or_else(|| {
            Error::invalid_argument(format!("account {} has no {service} endpoint", self.name))
        })
    }

    /// Signer for requests against this account.
    pub fn signer(&self) -> RequestSigner {
        RequestSigner::new(self.credential.clone())
    }

    /// Client for `service`, sending through `http` and signing with this
    /// account's credential.
    pub fn service_client(
        &self,
        service: StorageService,
        http: impl HttpSend,
    ) -> Result<ServiceClient> {
        Ok(ServiceClient::new(self.endpoint(service)?.clone())
            .with_http_send(http)
            .with_signer(self.signer()))
    }
}
