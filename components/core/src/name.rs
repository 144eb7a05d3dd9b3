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

//! Service name validation: alphanumerics, dash, underscore, and a
//! `/log` two-segment suffix for a logger of a long-running service.

use crate::error::{Error, Result};

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Validate a service name, allowing the `<base>/log` logger suffix.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "empty name",
        });
    }

    let (base, rest) = match name.split_once('/') {
        Some((base, rest)) => (base, Some(rest)),
        None => (name, None),
    };

    if base.is_empty() || !base.chars().all(is_name_char) {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "base segment must be non-empty alphanumerics/dash/underscore",
        });
    }

    match rest {
        None => Ok(()),
        Some("log") => Ok(()),
        Some(_) => Err(Error::InvalidName {
            name: name.to_string(),
            reason: "only a trailing '/log' suffix is permitted",
        }),
    }
}

/// `true` if `name` is the logger of some base service (`<base>/log`).
pub fn is_logger(name: &str) -> bool {
    name.ends_with("/log")
}

/// The logger name for a given base service name (`<base>/log`).
pub fn logger_name(base: &str) -> String {
    format!("{base}/log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate("nginx").is_ok());
        assert!(validate("my-service_1").is_ok());
    }

    #[test]
    fn accepts_log_suffix() {
        assert!(validate("nginx/log").is_ok());
    }

    #[test]
    fn rejects_other_suffixes_and_bad_chars() {
        assert!(validate("nginx/other").is_err());
        assert!(validate("bad name").is_err());
        assert!(validate("").is_err());
    }
}
