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

//! The one-byte wire protocol. Commands flow to the supervisor's
//! control FIFO; events flow back on its event channel, uppercase for
//! readiness transitions.

/// A command byte written to the supervisor's control FIFO.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Up,
    Down,
    Exit,
    /// Abort the in-flight transition.
    Abort,
}

impl Command {
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Up => b'u',
            Command::Down => b'd',
            Command::Exit => b'x',
            Command::Abort => b'a',
        }
    }
}

/// An event byte read from the supervisor's event channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// `u` — came up.
    Up,
    /// `U` — came up and signaled ready.
    UpReady,
    /// `d` — went down cleanly.
    Down,
    /// `D` — went down after a failed bring-up.
    DownFailed,
    /// `x` — disappeared unexpectedly.
    Exited,
}

impl Event {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'u' => Some(Event::Up),
            b'U' => Some(Event::UpReady),
            b'd' => Some(Event::Down),
            b'D' => Some(Event::DownFailed),
            b'x' => Some(Event::Exited),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes() {
        assert_eq!(Command::Up.to_byte(), b'u');
        assert_eq!(Command::Down.to_byte(), b'd');
        assert_eq!(Command::Exit.to_byte(), b'x');
        assert_eq!(Command::Abort.to_byte(), b'a');
    }

    #[test]
    fn event_bytes() {
        assert_eq!(Event::from_byte(b'u'), Some(Event::Up));
        assert_eq!(Event::from_byte(b'U'), Some(Event::UpReady));
        assert_eq!(Event::from_byte(b'd'), Some(Event::Down));
        assert_eq!(Event::from_byte(b'D'), Some(Event::DownFailed));
        assert_eq!(Event::from_byte(b'x'), Some(Event::Exited));
        assert_eq!(Event::from_byte(b'?'), None);
    }
}
