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

//! Process-start configuration, read once from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Grace period before the "waiting" overlay is drawn for an
/// in-flight service, so a fast oneshot produces no flicker.
pub const SECS_BEFORE_WAITING: Duration = Duration::from_secs(2);

pub struct Config {
    pub repo_root: PathBuf,
    pub default_timeout_secs: u64,
    pub double_output: bool,
}

impl Config {
    pub fn from_env() -> anopa_core::Result<Self> {
        let repo_root = anopa_core::env::repo_path().ok_or_else(|| anopa_core::Error::InvalidName {
            name: anopa_core::env::AA_REPO.to_string(),
            reason: "not set",
        })?;
        Ok(Config {
            repo_root,
            default_timeout_secs: anopa_core::env::default_timeout_secs(),
            double_output: anopa_core::env::double_output(),
        })
    }
}
