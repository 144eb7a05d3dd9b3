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

//! The operation mode threaded through the loader, graph engine and
//! scheduler.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    Start,
    Stop,
    StopAll,
    /// "dry full listing": suppresses the loader's
    /// `AlreadyUp`/`NotUp` short-circuits and always reports
    /// `service_is_ok` as `true`.
    DryFull,
}

impl Mode {
    pub fn is_start(self) -> bool {
        matches!(self, Mode::Start)
    }

    pub fn is_stop_like(self) -> bool {
        matches!(self, Mode::Stop | Mode::StopAll)
    }

    pub fn suppresses_short_circuit(self) -> bool {
        matches!(self, Mode::DryFull)
    }

    /// `service_is_ok` is unconditionally `true` in dry mode and
    /// stop-all mode.
    pub fn always_ok(self) -> bool {
        matches!(self, Mode::DryFull | Mode::StopAll)
    }
}
