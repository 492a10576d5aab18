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

use std::fmt::Debug;

use crate::{OperationContext, Result};

/// SignRequest authenticates an outgoing request.
///
/// The engine calls it once per attempt, after the request has been built
/// for its target location, so signatures always cover the host actually
/// being contacted.
pub trait SignRequest: Debug + Send + Sync + 'static {
    /// Sign the request in place.
    ///
    /// Implementations usually add an `Authorization` header or extend the
    /// query string.
    fn sign_request(&self, req: &mut http::request::Parts, ctx: &OperationContext) -> Result<()>;
}

/// NoopSigner leaves requests untouched, for anonymous access.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSigner;

impl SignRequest for NoopSigner {
    fn sign_request(&self, _: &mut http::request::Parts, _: &OperationContext) -> Result<()> {
        Ok(())
    }
}
