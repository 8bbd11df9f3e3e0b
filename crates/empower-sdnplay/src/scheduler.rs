//! DMS/LEGACY phase wheel.
//!
//! One cycle is `dms_slots` DMS entries followed by `legacy_slots` LEGACY
//! entries. Every group walks the same cycle with its own cursor; group `k`
//! (its registration index) is offset by `k * dms_slots` so that the DMS
//! windows of different groups never overlap while `G * dms_slots <= L`.
//!
//! ```text
//! position:   0  1  2  3  4  5  6  7  8  9
//! group 0:    D  L  L  L  L  L  L  L  L  L
//! group 1:    L  D  L  L  L  L  L  L  L  L
//! group 2:    L  L  D  L  L  L  L  L  L  L
//! ```
//!
//! Callers advance every group once per tick, so all groups agree on the
//! shared position and a newly registered group joins at that position.

use std::collections::BTreeMap;
use std::fmt;

use empower_core::{Address, McastMode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DemoMode;

/// What a group transmits as during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Dms,
    Legacy,
}

impl Phase {
    pub fn mcast_mode(self) -> McastMode {
        match self {
            Self::Dms => McastMode::Dms,
            Self::Legacy => McastMode::Legacy,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dms => "DMS",
            Self::Legacy => "LEGACY",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GroupCursor {
    /// Registration index.
    index: u32,
    /// Position in the schedule for the next call.
    cursor: u32,
}

/// Per-group phase rotation.
#[derive(Debug, Clone)]
pub struct GroupScheduler {
    dms_slots: u32,
    schedule: Vec<Phase>,
    demo_mode: DemoMode,
    groups: BTreeMap<Address, GroupCursor>,
}

impl GroupScheduler {
    /// `dms_slots` must be at least 1 (see [`crate::EngineConfig::validate`]).
    pub fn new(dms_slots: u32, legacy_slots: u32, demo_mode: DemoMode) -> Self {
        let dms_slots = dms_slots.max(1);
        let mut schedule = vec![Phase::Dms; dms_slots as usize];
        schedule.extend(std::iter::repeat(Phase::Legacy).take(legacy_slots as usize));
        Self {
            dms_slots,
            schedule,
            demo_mode,
            groups: BTreeMap::new(),
        }
    }

    pub fn schedule(&self) -> &[Phase] {
        &self.schedule
    }

    pub fn cycle_len(&self) -> u32 {
        self.schedule.len() as u32
    }

    pub fn demo_mode(&self) -> DemoMode {
        self.demo_mode
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn is_registered(&self, addr: Address) -> bool {
        self.groups.contains_key(&addr)
    }

    /// Registration index of a group.
    pub fn index_of(&self, addr: Address) -> Option<u32> {
        self.groups.get(&addr).map(|g| g.index)
    }

    /// Cycle position all groups currently agree on.
    fn position(&self) -> u32 {
        let len = self.cycle_len();
        self.groups
            .values()
            .next()
            .map(|g| (g.cursor + self.offset(g.index)) % len)
            .unwrap_or(0)
    }

    fn offset(&self, index: u32) -> u32 {
        let len = u64::from(self.cycle_len());
        ((u64::from(index) * u64::from(self.dms_slots)) % len) as u32
    }

    fn cursor_for(&self, index: u32, position: u32) -> u32 {
        let len = self.cycle_len();
        (position + len - self.offset(index)) % len
    }

    /// Register a group under the lowest free index. Idempotent.
    pub fn register(&mut self, addr: Address) -> u32 {
        if let Some(g) = self.groups.get(&addr) {
            return g.index;
        }
        let mut index = 0;
        while self.groups.values().any(|g| g.index == index) {
            index += 1;
        }
        let cursor = self.cursor_for(index, self.position());
        self.groups.insert(addr, GroupCursor { index, cursor });
        debug!(group = %addr, index, cursor, "group scheduled");
        index
    }

    pub fn unregister(&mut self, addr: Address) -> bool {
        self.groups.remove(&addr).is_some()
    }

    /// Drop every group `keep` rejects.
    pub fn retain(&mut self, mut keep: impl FnMut(Address) -> bool) {
        self.groups.retain(|addr, _| keep(*addr));
    }

    /// Phase the group would get next, without advancing.
    pub fn peek_phase(&self, addr: Address) -> Option<Phase> {
        match self.demo_mode {
            DemoMode::Dms => Some(Phase::Dms),
            DemoMode::Legacy => Some(Phase::Legacy),
            DemoMode::SdnPlay => self
                .groups
                .get(&addr)
                .map(|g| self.schedule[g.cursor as usize]),
        }
    }

    /// Phase at the group's cursor, then advance the cursor. Unknown groups
    /// are registered first. Forced demo modes return their phase and leave
    /// cursors alone.
    pub fn next_phase(&mut self, addr: Address) -> Phase {
        match self.demo_mode {
            DemoMode::Dms => return Phase::Dms,
            DemoMode::Legacy => return Phase::Legacy,
            DemoMode::SdnPlay => {}
        }
        self.register(addr);
        let len = self.cycle_len();
        let schedule = &self.schedule;
        match self.groups.get_mut(&addr) {
            Some(g) => {
                let phase = schedule[g.cursor as usize];
                g.cursor = (g.cursor + 1) % len;
                phase
            }
            None => Phase::Dms,
        }
    }

    /// Switch demo mode. A change restarts every group at position 0.
    pub fn set_demo_mode(&mut self, mode: DemoMode) {
        if mode == self.demo_mode {
            return;
        }
        debug!(from = %self.demo_mode, to = %mode, "demo mode changed, cursors reset");
        self.demo_mode = mode;
        self.reset();
    }

    /// Restart every group at cycle position 0.
    pub fn reset(&mut self) {
        let indices: Vec<(Address, u32)> = self.groups.iter().map(|(a, g)| (*a, g.index)).collect();
        for (addr, index) in indices {
            let cursor = self.cursor_for(index, 0);
            if let Some(g) = self.groups.get_mut(&addr) {
                g.cursor = cursor;
            }
        }
    }
}
