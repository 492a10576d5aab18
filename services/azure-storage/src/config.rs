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

use reqretry_core::Env;

use crate::constants::*;

/// Config carries all the configuration for Azure Storage services.
#[derive(Clone, Default)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Config {
    /// `account_name` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZBLOB_ACCOUNT_NAME`]
    pub account_name: Option<String>,
    /// `account_key` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZBLOB_ACCOUNT_KEY`]
    pub account_key: Option<String>,
    /// `sas_token` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_STORAGE_SAS_TOKEN`]
    pub sas_token: Option<String>,
    /// Blob endpoint of the primary location, derived from the account name
    /// if unset.
    ///
    /// - env value: [`AZBLOB_ENDPOINT`]
    pub endpoint: Option<String>,
    /// Blob endpoint of the secondary location.
    ///
    /// - env value: [`AZBLOB_SECONDARY_ENDPOINT`]
    pub secondary_endpoint: Option<String>,
}

impl Config {
    /// Load config from env.
    ///
    /// Values already set on the config are kept.
    pub fn from_env(mut self, env: &dyn Env) -> Self {
        fn fill(field: &mut Option<String>, env: &dyn Env, key: &str) {
            if field.is_none() {
                *field = env.var(key).filter(|v| !v.is_empty());
            }
        }

        fill(&mut self.account_name, env, AZBLOB_ACCOUNT_NAME);
        fill(&mut self.account_key, env, AZBLOB_ACCOUNT_KEY);
        fill(&mut self.sas_token, env, AZURE_STORAGE_SAS_TOKEN);
        fill(&mut self.endpoint, env, AZBLOB_ENDPOINT);
        fill(&mut self.secondary_endpoint, env, AZBLOB_SECONDARY_ENDPOINT);

        self
    }
}
