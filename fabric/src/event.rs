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

//! Pending events.
//!
//! Events are ordered lexicographically by `(time, epsilon, seq)`.
//! `epsilon` breaks ties among same-time events whose relative order is
//! semantically required; `seq` is the insertion counter, so events with
//! equal `(time, epsilon)` dispatch in FIFO order.

use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::component::Component;
use crate::Time;

pub struct Event {
    pub(crate) time: Time,
    pub(crate) epsilon: u8,
    pub(crate) seq: u64,
    pub(crate) target: Rc<RefCell<dyn Component>>,
    pub(crate) payload: Option<Box<dyn Any>>,
    pub(crate) kind: i32,
}

impl Event {
    fn key(&self) -> (Time, u8, u64) {
        (self.time, self.epsilon, self.seq)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Scope;

    struct Sink {
        scope: Scope,
    }

    impl Component for Sink {
        fn scope(&self) -> &Scope {
            &self.scope
        }
        fn process_event(&mut self, _payload: Option<Box<dyn Any>>, _kind: i32) {}
    }

    fn event(time: Time, epsilon: u8, seq: u64) -> Event {
        Event {
            time,
            epsilon,
            seq,
            target: Rc::new(RefCell::new(Sink {
                scope: Scope::root("sink"),
            })),
            payload: None,
            kind: 0,
        }
    }

    #[test]
    fn ordering_is_time_epsilon_seq() {
        assert!(event(10, 0, 5) < event(11, 0, 0));
        assert!(event(10, 0, 5) < event(10, 1, 0));
        assert!(event(10, 1, 3) < event(10, 1, 4));
        assert!(event(10, 2, 0) > event(10, 1, 9));
    }
}
