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

use http::uri::PathAndQuery;
use http::Uri;

use crate::{Error, LocationMode, Result, StorageLocation};

/// StorageUri addresses one logical resource on both endpoints of an account.
///
/// The secondary, when present, must point at the same path and query as the
/// primary; only the host differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageUri {
    primary: Uri,
    secondary: Option<Uri>,
}

impl StorageUri {
    /// Create a new StorageUri.
    pub fn new(primary: Uri, secondary: Option<Uri>) -> Result<Self> {
        ensure_absolute(&primary)?;

        if let Some(secondary) = &secondary {
            ensure_absolute(secondary)?;

            if primary.path() != secondary.path() || primary.query() != secondary.query() {
                return Err(Error::invalid_argument(format!(
                    "primary and secondary uri must address the same resource, got {primary} and {secondary}"
                )));
            }
        }

        Ok(Self { primary, secondary })
    }

    /// Create a StorageUri that only has a primary endpoint.
    pub fn from_primary(primary: Uri) -> Result<Self> {
        Self::new(primary, None)
    }

    /// Parse both endpoints from strings.
    pub fn parse(primary: &str, secondary: Option<&str>) -> Result<Self> {
        let primary = primary.parse::<Uri>()?;
        let secondary = secondary.map(str::parse::<Uri>).transpose()?;
        Self::new(primary, secondary)
    }

    /// The primary uri.
    pub fn primary(&self) -> &Uri {
        &self.primary
    }

    /// The secondary uri, if the account has one.
    pub fn secondary(&self) -> Option<&Uri> {
        self.secondary.as_ref()
    }

    /// Uri for the given location.
    pub fn uri_for(&self, location: StorageLocation) -> Result<&Uri> {
        match location {
            StorageLocation::Primary => Ok(&self.primary),
            StorageLocation::Secondary => self.secondary.as_ref().ok_or_else(|| {
                Error::invalid_argument(format!(
                    "secondary location requested but no secondary uri configured for {}",
                    self.primary
                ))
            }),
        }
    }

    /// Check whether this address has every uri the given mode may target.
    pub fn is_valid_for(&self, mode: LocationMode) -> bool {
        // The primary is always present; only the secondary can be missing.
        !mode.uses_secondary() || self.secondary.is_some()
    }

    /// Address a child resource, appending `path` on both endpoints.
    ///
    /// ```
    /// use reqretry_core::StorageUri;
    ///
    /// let account = StorageUri::parse(
    ///     "https://acct.blob.core.windows.net",
    ///     Some("https://acct-secondary.blob.core.windows.net"),
    /// )
    /// .unwrap();
    /// let blob = account.append_path("container/blob.txt").unwrap();
    /// assert_eq!(blob.primary().path(), "/container/blob.txt");
    /// ```
    pub fn append_path(&self, path: &str) -> Result<Self> {
        let primary = append_to_uri(&self.primary, path)?;
        let secondary = self
            .secondary
            .as_ref()
            .map(|v| append_to_uri(v, path))
            .transpose()?;

        Self::new(primary, secondary)
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Primary = '{}'", self.primary)?;
        if let Some(secondary) = &self.secondary {
            write!(f, "; Secondary = '{secondary}'")?;
        }
        Ok(())
    }
}

fn ensure_absolute(uri: &Uri) -> Result<()> {
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(Error::invalid_argument(format!(
            "uri must be absolute: {uri}"
        )));
    }
    Ok(())
}

fn append_to_uri(uri: &Uri, path: &str) -> Result<Uri> {
    let base = uri.path().trim_end_matches('/');
    let child = path.trim_start_matches('/');

    let mut paq = String::with_capacity(base.len() + child.len() + 1);
    paq.push_str(base);
    paq.push('/');
    paq.push_str(child);
    if let Some(query) = uri.query() {
        paq.push('?');
        paq.push_str(query);
    }

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(paq)?);
    Ok(Uri::from_parts(parts)?)
}
