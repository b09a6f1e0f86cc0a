// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named clock domains.
//!
//! A clock domain has a fixed tick period in simulated picoseconds.
//! Conversion between a cycle count and absolute time is exact integer
//! multiplication by the period, so domains never accumulate drift.

use std::cell::RefCell;

use crate::{Cycle, Time};

/// The clock domain used for channel-paced work (injection pacing,
/// message delivery).
pub const CHANNEL_CLOCK: &str = "channel";

/// The clock domain used for terminal-paced timeouts.
pub const TERMINAL_CLOCK: &str = "terminal";

/// Handle to a registered clock domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockId(usize);

struct ClockDomain {
    name: String,
    period: Time,
}

/// All clock domains of one simulation, registered by name.
pub struct ClockRegistry {
    domains: RefCell<Vec<ClockDomain>>,
}

impl ClockRegistry {
    pub fn new() -> Self {
        Self {
            domains: RefCell::new(Vec::new()),
        }
    }

    /// Register a clock domain with a tick period in picoseconds.
    pub fn register(&self, name: &str, period: Time) -> ClockId {
        assert!(period > 0, "clock '{}' must have a nonzero period", name);
        let mut domains = self.domains.borrow_mut();
        assert!(
            domains.iter().all(|d| d.name != name),
            "clock '{}' registered twice",
            name
        );
        domains.push(ClockDomain {
            name: name.to_string(),
            period,
        });
        ClockId(domains.len() - 1)
    }

    pub fn lookup(&self, name: &str) -> Option<ClockId> {
        self.domains
            .borrow()
            .iter()
            .position(|d| d.name == name)
            .map(ClockId)
    }

    pub fn name(&self, clock: ClockId) -> String {
        self.domains.borrow()[clock.0].name.clone()
    }

    pub fn period(&self, clock: ClockId) -> Time {
        self.domains.borrow()[clock.0].period
    }

    /// The cycle count of the domain at absolute time `now`.
    pub fn cycle(&self, clock: ClockId, now: Time) -> Cycle {
        now / self.period(clock)
    }

    /// The absolute time of the given cycle edge.
    pub fn cycle_time(&self, clock: ClockId, cycle: Cycle) -> Time {
        cycle * self.period(clock)
    }

    /// The smallest edge-aligned time t with t >= now + cycles * period.
    ///
    /// When `now` is already on an edge and `cycles` is zero this returns
    /// `now`, which lets callers coalesce same-cycle work.
    pub fn future_cycle(&self, clock: ClockId, now: Time, cycles: Cycle) -> Time {
        let period = self.period(clock);
        let target = now + cycles * period;
        target.div_ceil(period) * period
    }

    pub fn len(&self) -> usize {
        self.domains.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.borrow().is_empty()
    }
}

impl Default for ClockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let clocks = ClockRegistry::new();
        let channel = clocks.register(CHANNEL_CLOCK, 1_000);
        let terminal = clocks.register(TERMINAL_CLOCK, 1_500);

        assert_eq!(clocks.lookup(CHANNEL_CLOCK), Some(channel));
        assert_eq!(clocks.lookup(TERMINAL_CLOCK), Some(terminal));
        assert_eq!(clocks.lookup("router"), None);
        assert_eq!(clocks.period(channel), 1_000);
        assert_eq!(clocks.name(terminal), TERMINAL_CLOCK);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_name() {
        let clocks = ClockRegistry::new();
        clocks.register(CHANNEL_CLOCK, 1_000);
        clocks.register(CHANNEL_CLOCK, 2_000);
    }

    #[test]
    fn cycle_conversions() {
        let clocks = ClockRegistry::new();
        let clk = clocks.register(CHANNEL_CLOCK, 250);

        assert_eq!(clocks.cycle(clk, 0), 0);
        assert_eq!(clocks.cycle(clk, 249), 0);
        assert_eq!(clocks.cycle(clk, 250), 1);
        assert_eq!(clocks.cycle_time(clk, 4), 1_000);
    }

    #[test]
    fn future_cycle_alignment() {
        let clocks = ClockRegistry::new();
        let clk = clocks.register(CHANNEL_CLOCK, 100);

        // On an edge with zero cycles the current time is returned.
        assert_eq!(clocks.future_cycle(clk, 300, 0), 300);
        // Off-edge times round up to the next edge.
        assert_eq!(clocks.future_cycle(clk, 301, 0), 400);
        assert_eq!(clocks.future_cycle(clk, 301, 1), 500);
        // On-edge times step by exactly the period.
        assert_eq!(clocks.future_cycle(clk, 300, 2), 500);
    }
}
