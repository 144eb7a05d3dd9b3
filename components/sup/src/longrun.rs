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

//! Longrun execution: sending the supervisor an up/down command,
//! subscribing to its event channel, and mapping the one-byte event
//! alphabet onto status-record transitions.

use anopa_core::{Mode, Result};
use anopa_status::Event as StatusEvent;
use anopa_supervisor_client::{Command, Event, SubscriptionId, SupervisorClient};

/// Send the up/down command appropriate for `mode` and subscribe to
/// this longrun's event stream.
pub fn initiate(supervisor: &mut dyn SupervisorClient, name: &str, mode: Mode) -> Result<SubscriptionId> {
    let cmd = if mode.is_start() { Command::Up } else { Command::Down };
    supervisor.send_command(name, cmd)?;
    supervisor.subscribe(name)
}

/// The in-flight stage a longrun transition is waiting in, tracked so
/// an `Up` event can be told apart from a terminal `UpReady`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    WaitingForUp,
    WaitingForReady,
    WaitingForDown,
}

pub fn initial_stage(mode: Mode, readiness_capable: bool) -> Stage {
    if mode.is_start() {
        if readiness_capable {
            Stage::WaitingForReady
        } else {
            Stage::WaitingForUp
        }
    } else {
        Stage::WaitingForDown
    }
}

/// The outcome of dispatching one supervisor event against a longrun
/// currently in `stage`. `None` means the event didn't resolve
/// anything yet (e.g. a bare `Up` while still waiting for readiness).
pub fn dispatch(stage: Stage, event: Event) -> Option<(StatusEvent, Stage)> {
    match (stage, event) {
        (Stage::WaitingForUp, Event::Up) => Some((StatusEvent::Started, Stage::WaitingForUp)),
        (Stage::WaitingForReady, Event::Up) => None,
        (Stage::WaitingForReady, Event::UpReady) => Some((StatusEvent::Started, Stage::WaitingForReady)),
        (Stage::WaitingForUp | Stage::WaitingForReady, Event::Exited) => {
            Some((StatusEvent::StartFailed, stage))
        }
        (Stage::WaitingForDown, Event::Down | Event::DownFailed) => {
            Some((StatusEvent::Stopped, Stage::WaitingForDown))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_capable_start_waits_for_uppercase_event() {
        let stage = initial_stage(Mode::Start, true);
        assert_eq!(stage, Stage::WaitingForReady);
        assert_eq!(dispatch(stage, Event::Up), None);
        assert_eq!(dispatch(stage, Event::UpReady), Some((StatusEvent::Started, stage)));
    }

    #[test]
    fn non_readiness_start_resolves_on_lowercase_up() {
        let stage = initial_stage(Mode::Start, false);
        assert_eq!(dispatch(stage, Event::Up), Some((StatusEvent::Started, stage)));
    }

    #[test]
    fn disappearing_while_starting_is_a_start_failure() {
        let stage = initial_stage(Mode::Start, false);
        assert_eq!(dispatch(stage, Event::Exited), Some((StatusEvent::StartFailed, stage)));
    }

    #[test]
    fn stop_resolves_on_down_or_down_failed() {
        let stage = initial_stage(Mode::Stop, false);
        assert_eq!(dispatch(stage, Event::Down), Some((StatusEvent::Stopped, stage)));
        assert_eq!(dispatch(stage, Event::DownFailed), Some((StatusEvent::Stopped, stage)));
    }
}
