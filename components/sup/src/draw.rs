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

//! The terminal drawing discipline: a small bitmask describing what
//! overlay is currently on screen (`cur`) and what ought to be there
//! (`need`), so a log line can clear the overlay, print, and redraw it
//! without interleaving with child output.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DrawState: u8 {
        const WAITING  = 0b001;
        const PROGRESS = 0b010;
        const PASSWORD = 0b100;
    }
}

/// Tracks the currently-drawn overlay (`cur`) against the
/// just-computed desired overlay (`need`), redrawing only the delta.
#[derive(Default)]
pub struct Drawer {
    cur: DrawState,
    need: DrawState,
    dirty: bool,
}

impl Drawer {
    pub fn new() -> Self {
        Drawer::default()
    }

    pub fn set_needed(&mut self, need: DrawState) {
        if need != self.need {
            self.need = need;
            self.dirty = true;
        }
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// The overlay bits currently wanted, so a caller can add or
    /// remove a single bit without clobbering the others.
    pub fn needed(&self) -> DrawState {
        self.need
    }

    /// Clear whatever overlay is currently drawn, run `emit` to print a
    /// log line, then redraw the desired overlay.
    pub fn around_log<F: FnOnce()>(&mut self, emit: F) {
        self.clear();
        emit();
        self.redraw();
    }

    fn clear(&mut self) {
        if self.cur.is_empty() {
            return;
        }
        print!("\x1b[2K\r");
        self.cur = DrawState::empty();
    }

    fn redraw(&mut self) {
        if self.need.is_empty() {
            return;
        }
        if self.need.contains(DrawState::WAITING) {
            print!("waiting...");
        }
        self.cur = self.need;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_needed_marks_dirty_only_on_change() {
        let mut d = Drawer::new();
        d.set_needed(DrawState::WAITING);
        assert!(d.take_dirty());
        d.set_needed(DrawState::WAITING);
        assert!(!d.take_dirty());
    }
}
