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

//! The error taxonomy. Every variant is a value, never an unwind: the
//! scheduler captures these on the affected service's status record
//! and keeps going.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// A child's raw wait status, as returned by `libc::waitpid`.
pub type WaitStatus = i32;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid service name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("service {name:?} not found in the repository")]
    Unknown { name: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dependency of {name:?} failed or was not found")]
    Dependency { name: String },

    #[error("service {name:?} is already up")]
    AlreadyUp { name: String },

    #[error("service {name:?} is not up")]
    NotUp { name: String },

    #[error("service {name:?} timed out after {secs}s")]
    Timedout { name: String, secs: u64 },

    #[error("dependency cycle detected, anchored at {anchor:?}")]
    Cycle { anchor: String },

    #[error("service {name:?} exited with status {wstat}")]
    ExitCode { name: String, wstat: WaitStatus },

    #[error("service {name:?} was killed by signal {signal}")]
    Signal { name: String, signal: i32 },
}

impl Error {
    /// The numeric error tag persisted in the status record's `code`
    /// field.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidName { .. } => 1,
            Error::Unknown { .. } => 2,
            Error::Io { source, .. } => source.raw_os_error().unwrap_or(-1),
            Error::Dependency { .. } => 3,
            Error::AlreadyUp { .. } => 4,
            Error::NotUp { .. } => 5,
            Error::Timedout { .. } => 6,
            Error::Cycle { .. } => 7,
            Error::ExitCode { wstat, .. } => *wstat,
            Error::Signal { signal, .. } => *signal,
        }
    }

    /// The exit code a thin CLI wrapper should return.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidName { .. } => 2,
            Error::Unknown { .. } => 2,
            Error::Io { .. } => 111,
            Error::Dependency { .. } => 111,
            Error::AlreadyUp { .. } | Error::NotUp { .. } => 0,
            Error::Timedout { .. } => 111,
            Error::Cycle { .. } => 2,
            Error::ExitCode { .. } | Error::Signal { .. } => 111,
        }
    }
}
