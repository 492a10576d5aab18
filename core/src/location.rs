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
use std::str::FromStr;

use crate::{Error, Result};

/// One of the two geo-replicated endpoints of a storage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageLocation {
    /// The primary, writable endpoint.
    Primary,
    /// The secondary endpoint, read-only and eventually consistent.
    Secondary,
}

impl StorageLocation {
    /// The other location.
    pub fn other(self) -> Self {
        match self {
            StorageLocation::Primary => StorageLocation::Secondary,
            StorageLocation::Secondary => StorageLocation::Primary,
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Primary => write!(f, "primary"),
            StorageLocation::Secondary => write!(f, "secondary"),
        }
    }
}

/// Which endpoint(s) a client or a single operation may use, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocationMode {
    /// Only the primary endpoint.
    #[default]
    PrimaryOnly,
    /// Only the secondary endpoint.
    SecondaryOnly,
    /// Start at the primary, fall back to the secondary.
    PrimaryThenSecondary,
    /// Start at the secondary, fall back to the primary.
    SecondaryThenPrimary,
}

impl LocationMode {
    /// Location the first attempt of an operation targets.
    pub fn initial_location(self) -> StorageLocation {
        match self {
            LocationMode::PrimaryOnly | LocationMode::PrimaryThenSecondary => {
                StorageLocation::Primary
            }
            LocationMode::SecondaryOnly | LocationMode::SecondaryThenPrimary => {
                StorageLocation::Secondary
            }
        }
    }

    /// Location to try after an attempt against `last` failed.
    ///
    /// Single-location modes never leave their location, fallback modes
    /// alternate.
    pub fn next_location(self, last: StorageLocation) -> StorageLocation {
        match self {
            LocationMode::PrimaryOnly => StorageLocation::Primary,
            LocationMode::SecondaryOnly => StorageLocation::Secondary,
            LocationMode::PrimaryThenSecondary | LocationMode::SecondaryThenPrimary => {
                last.other()
            }
        }
    }

    /// Whether this mode ever targets the secondary endpoint.
    pub fn uses_secondary(self) -> bool {
        !matches!(self, LocationMode::PrimaryOnly)
    }

    /// Whether this mode ever targets the primary endpoint.
    pub fn uses_primary(self) -> bool {
        !matches!(self, LocationMode::SecondaryOnly)
    }
}

impl fmt::Display for LocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LocationMode::PrimaryOnly => "primary_only",
            LocationMode::SecondaryOnly => "secondary_only",
            LocationMode::PrimaryThenSecondary => "primary_then_secondary",
            LocationMode::SecondaryThenPrimary => "secondary_then_primary",
        };
        f.write_str(s)
    }
}

impl FromStr for LocationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary_only" => Ok(LocationMode::PrimaryOnly),
            "secondary_only" => Ok(LocationMode::SecondaryOnly),
            "primary_then_secondary" => Ok(LocationMode::PrimaryThenSecondary),
            "secondary_then_primary" => Ok(LocationMode::SecondaryThenPrimary),
            _ => Err(Error::invalid_argument(format!(
                "unknown location mode: {s}"
            ))),
        }
    }
}

/// Which endpoints a single request template is allowed to target.
///
/// This is a property of the operation (writes only go to the primary),
/// independent of the client-wide [`LocationMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestLocationMode {
    /// The operation must go to the primary.
    PrimaryOnly,
    /// The operation must go to the secondary.
    SecondaryOnly,
    /// The operation may go to either endpoint.
    #[default]
    PrimaryOrSecondary,
}

impl RequestLocationMode {
    /// Narrow the effective location mode for one operation.
    ///
    /// Fails when the operation and the configured mode exclude each other,
    /// for example a write under a secondary-only client.
    pub fn apply(self, mode: LocationMode) -> Result<LocationMode> {
        match self {
            RequestLocationMode::PrimaryOnly => {
                if mode == LocationMode::SecondaryOnly {
                    return Err(Error::invalid_argument(
                        "operation can only be sent to the primary location, but location mode is secondary_only",
                    ));
                }
                Ok(LocationMode::PrimaryOnly)
            }
            RequestLocationMode::SecondaryOnly => {
                if mode == LocationMode::PrimaryOnly {
                    return Err(Error::invalid_argument(
                        "operation can only be sent to the secondary location, but location mode is primary_only",
                    ));
                }
                Ok(LocationMode::SecondaryOnly)
            }
            RequestLocationMode::PrimaryOrSecondary => Ok(mode),
        }
    }
}
