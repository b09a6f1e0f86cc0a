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

//! Per-terminal destination generators.
//!
//! Two families share one trait: permutation patterns are total
//! functions of the terminal id and return the same destination on
//! every call, while continuous patterns may be stateful and draw from
//! the simulation's random stream.
//!
//! Variants are selected by name through a registry of constructor
//! functions; each constructor deserializes its own settings from the
//! configuration subtree.

mod continuous;
mod dimension;
mod permutation;

use crate::error::Error;
use crate::random::Random;

pub trait TrafficPattern {
    /// The next destination terminal id, in `[0, num_terminals)`.
    fn next_destination(&mut self) -> u32;
}

/// Construction inputs common to every pattern.
pub struct PatternContext<'a> {
    pub num_terminals: u32,
    pub self_id: u32,
    pub random: &'a Random,
}

type Constructor = fn(&PatternContext, &serde_yaml::Value) -> Result<Box<dyn TrafficPattern>, Error>;

const CONSTRUCTORS: &[(&str, Constructor)] = &[
    ("bit_complement", permutation::bit_complement),
    ("bit_reverse", permutation::bit_reverse),
    ("dim_transpose", dimension::dim_transpose),
    ("hot_spot", continuous::hot_spot),
    ("random_permutation", continuous::random_permutation),
    ("shuffle", permutation::shuffle),
    ("tornado", permutation::tornado),
    ("transpose", permutation::transpose),
    ("uniform_random", continuous::uniform_random),
];

/// Build the pattern registered under `name`.
pub fn create(
    name: &str,
    context: &PatternContext,
    settings: &serde_yaml::Value,
) -> Result<Box<dyn TrafficPattern>, Error> {
    assert!(
        context.self_id < context.num_terminals,
        "terminal {} outside [0, {})",
        context.self_id,
        context.num_terminals
    );
    let constructor = CONSTRUCTORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| c)
        .ok_or_else(|| Error::UnknownVariant {
            family: "traffic pattern",
            name: name.to_string(),
        })?;
    constructor(context, settings)
}

/// A pattern that maps this terminal to one precomputed destination.
///
/// All permutation patterns reduce to this after evaluating their
/// mapping at construction time.
pub(crate) struct Fixed {
    destination: u32,
}

impl Fixed {
    pub(crate) fn boxed(destination: u32, num_terminals: u32) -> Box<dyn TrafficPattern> {
        assert!(destination < num_terminals);
        Box::new(Self { destination })
    }
}

impl TrafficPattern for Fixed {
    fn next_destination(&mut self) -> u32 {
        self.destination
    }
}
