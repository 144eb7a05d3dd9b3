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

//! Boundary to the external supervisor: a one-byte command protocol
//! over a control FIFO, and an event-channel subscription shared by
//! all long-runs.
//!
//! The wire format (`protocol`) and the connection that speaks it
//! (`fifo`) are kept as separate modules so the wire format can be
//! unit tested without a live FIFO.

mod fifo;
pub mod protocol;

pub use fifo::FifoSupervisorClient;
pub use protocol::{Command, Event};

use anopa_core::tain::Tain;
use anopa_core::Result;

/// A subscription token for a single longrun's event stream, stored
/// in its record as `notify_handle`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(pub u64);

/// What the supervisor currently reports for a longrun.
#[derive(Clone, Copy, Debug)]
pub struct SupervisorStatus {
    pub pid: i32,
    pub finishing: bool,
    pub ready: bool,
    pub stamp: Tain,
}

impl SupervisorStatus {
    /// Up iff the supervisor reports a non-zero pid and not finishing.
    pub fn is_up(&self) -> bool {
        self.pid != 0 && !self.finishing
    }
}

/// The core's view of the external supervisor. A trait so the
/// scheduler and loader can be exercised against an in-memory double
/// in tests without a real supervisor process.
pub trait SupervisorClient {
    fn send_command(&mut self, name: &str, cmd: Command) -> Result<()>;

    /// Best-effort point query, used by the loader to determine
    /// current "up" state and by `service_is_ok`. `None` if the
    /// supervisor has no record at all.
    fn query_status(&mut self, name: &str) -> Result<Option<SupervisorStatus>>;

    fn subscribe(&mut self, name: &str) -> Result<SubscriptionId>;

    fn unsubscribe_for(&mut self, id: SubscriptionId);

    /// Drain whatever events are currently available without
    /// blocking. The scheduler calls this after its multiplexed wait
    /// returns readable on the supervisor's event channel fd.
    fn poll_events(&mut self) -> Result<Vec<(SubscriptionId, Event)>>;

    /// The fd to register with the event loop's multiplexer.
    fn event_fd(&self) -> std::os::unix::io::RawFd;
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use std::collections::{HashMap, VecDeque};

    /// An in-memory double for `SupervisorClient`, used by
    /// `anopa-loader` and `anopa-sup`'s own test suites, neither of
    /// which needs a real supervisor binary running.
    #[derive(Default)]
    pub struct FakeSupervisorClient {
        pub commands: Vec<(String, Command)>,
        statuses: HashMap<String, SupervisorStatus>,
        next_id: u64,
        subscriptions: HashMap<u64, String>,
        pending_events: VecDeque<(SubscriptionId, Event)>,
    }

    impl FakeSupervisorClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_status(&mut self, name: &str, status: SupervisorStatus) {
            self.statuses.insert(name.to_string(), status);
        }

        pub fn push_event(&mut self, name: &str, event: Event) {
            if let Some((&id, _)) = self
                .subscriptions
                .iter()
                .find(|(_, sub_name)| sub_name.as_str() == name)
            {
                self.pending_events.push_back((SubscriptionId(id), event));
            }
        }
    }

    impl SupervisorClient for FakeSupervisorClient {
        fn send_command(&mut self, name: &str, cmd: Command) -> Result<()> {
            self.commands.push((name.to_string(), cmd));
            Ok(())
        }

        fn query_status(&mut self, name: &str) -> Result<Option<SupervisorStatus>> {
            Ok(self.statuses.get(name).copied())
        }

        fn subscribe(&mut self, name: &str) -> Result<SubscriptionId> {
            let id = self.next_id;
            self.next_id += 1;
            self.subscriptions.insert(id, name.to_string());
            Ok(SubscriptionId(id))
        }

        fn unsubscribe_for(&mut self, id: SubscriptionId) {
            self.subscriptions.remove(&id.0);
        }

        fn poll_events(&mut self) -> Result<Vec<(SubscriptionId, Event)>> {
            Ok(self.pending_events.drain(..).collect())
        }

        fn event_fd(&self) -> std::os::unix::io::RawFd {
            -1
        }
    }
}
