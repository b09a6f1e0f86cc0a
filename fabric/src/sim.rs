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

//! The event scheduler and simulation context.
//!
//! A [`Simulator`] carries the event queue, the clock registry, the
//! random number service, and the component name registry. It is passed
//! explicitly to every component at construction; there is no global
//! simulator handle.
//!
//! Dispatch is single-threaded and cooperative: the earliest pending
//! event is popped and its target's handler runs to completion. Handlers
//! may schedule further events, including at the current time.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::{Rc, Weak};

use log::trace;

use crate::clock::{ClockId, ClockRegistry};
use crate::component::Component;
use crate::event::Event;
use crate::random::Random;
use crate::{Cycle, Time};

pub struct Simulator {
    queue: RefCell<BinaryHeap<Reverse<Event>>>,
    next_seq: Cell<u64>,
    now: Cell<Time>,
    executed: Cell<u64>,
    exit: Cell<bool>,
    clocks: ClockRegistry,
    components: RefCell<HashMap<String, Weak<RefCell<dyn Component>>>>,
    pub random: Random,
}

impl Simulator {
    pub fn new(seed: u64) -> Rc<Self> {
        Rc::new(Self {
            queue: RefCell::new(BinaryHeap::new()),
            next_seq: Cell::new(0),
            now: Cell::new(0),
            executed: Cell::new(0),
            exit: Cell::new(false),
            clocks: ClockRegistry::new(),
            components: RefCell::new(HashMap::new()),
            random: Random::from_seed(seed),
        })
    }

    pub fn current_time(&self) -> Time {
        self.now.get()
    }

    /// Insert an event. Scheduling in the past is a programming bug.
    pub fn schedule(
        &self,
        time: Time,
        epsilon: u8,
        target: Rc<RefCell<dyn Component>>,
        payload: Option<Box<dyn Any>>,
        kind: i32,
    ) {
        assert!(
            time >= self.now.get(),
            "event scheduled in the past ({} < {})",
            time,
            self.now.get()
        );
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.queue.borrow_mut().push(Reverse(Event {
            time,
            epsilon,
            seq,
            target,
            payload,
            kind,
        }));
    }

    /// Dispatch until the queue is empty or a component calls [`exit`].
    ///
    /// Returns the number of events executed. Events left behind after an
    /// exit are dropped.
    ///
    /// [`exit`]: Simulator::exit
    pub fn run(&self) -> u64 {
        while !self.exit.get() {
            let event = match self.queue.borrow_mut().pop() {
                Some(Reverse(event)) => event,
                None => break,
            };
            assert!(
                event.time >= self.now.get(),
                "time moving backwards ({} < {})",
                event.time,
                self.now.get()
            );
            self.now.set(event.time);
            self.executed.set(self.executed.get() + 1);
            if log::log_enabled!(log::Level::Trace) {
                trace!(
                    "@{}ps dispatch kind {:#x} to {}",
                    event.time,
                    event.kind,
                    event.target.borrow().scope()
                );
            }
            event.target.borrow_mut().process_event(event.payload, event.kind);
        }
        self.queue.borrow_mut().clear();
        self.executed.get()
    }

    /// Stop the dispatch loop before the queue is empty.
    pub fn exit(&self) {
        self.exit.set(true);
    }

    pub fn exited(&self) -> bool {
        self.exit.get()
    }

    pub fn events_executed(&self) -> u64 {
        self.executed.get()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.borrow().len()
    }

    // Clock registry.

    pub fn register_clock(&self, name: &str, period: Time) -> ClockId {
        self.clocks.register(name, period)
    }

    pub fn clock(&self, name: &str) -> Option<ClockId> {
        self.clocks.lookup(name)
    }

    pub fn clock_period(&self, clock: ClockId) -> Time {
        self.clocks.period(clock)
    }

    /// The current cycle count of the domain.
    pub fn cycle(&self, clock: ClockId) -> Cycle {
        self.clocks.cycle(clock, self.now.get())
    }

    /// The absolute time of the nth future tick edge in the domain.
    pub fn future_cycle(&self, clock: ClockId, cycles: Cycle) -> Time {
        self.clocks.future_cycle(clock, self.now.get(), cycles)
    }

    // Component name registry.

    /// Record a component under its scope path. Paths must be unique:
    /// two siblings with the same name are a construction bug.
    pub fn register_component<T: Component + 'static>(&self, component: &Rc<RefCell<T>>) {
        let path = component.borrow().scope().path();
        let handle: Rc<RefCell<dyn Component>> = component.clone();
        let previous = self
            .components
            .borrow_mut()
            .insert(path.clone(), Rc::downgrade(&handle));
        assert!(
            previous.is_none(),
            "component '{}' registered twice",
            path
        );
    }

    pub fn lookup_component(&self, path: &str) -> Option<Rc<RefCell<dyn Component>>> {
        self.components
            .borrow()
            .get(path)
            .and_then(|weak| weak.upgrade())
    }
}
