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

//! Shared foundation for the anopa service orchestration core: the
//! error taxonomy, the `Tain` monotonic+wall timestamp, service-name
//! validation, and environment variable access.

pub mod env;
pub mod error;
pub mod mode;
pub mod name;
pub mod tain;

pub use error::{Error, Result};
pub use mode::Mode;
pub use tain::Tain;
