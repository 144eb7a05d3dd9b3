// Copyright (c) 2026 the anopa contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Environment variable access: a handful of named accessors rather
//! than scattered `std::env::var` calls.

use std::path::PathBuf;

pub const AA_REPO: &str = "AA_REPO";
pub const AA_SECS_TIMEOUT: &str = "AA_SECS_TIMEOUT";
pub const AA_DOUBLE_OUTPUT: &str = "AA_DOUBLE_OUTPUT";

/// Default per-service timeout when neither `<name>/timeout` nor
/// `AA_SECS_TIMEOUT` is set.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub fn repo_path() -> Option<PathBuf> {
    std::env::var_os(AA_REPO).map(PathBuf::from)
}

pub fn default_timeout_secs() -> u64 {
    std::env::var(AA_SECS_TIMEOUT)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Whether oneshot stdout should be mirrored to the terminal *and*
/// appended to `output_buffer`, or only the latter.
pub fn double_output() -> bool {
    std::env::var_os(AA_DOUBLE_OUTPUT).is_some()
}
