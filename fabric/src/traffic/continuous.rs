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

//! Stochastic destination generators.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::{PatternContext, TrafficPattern};
use crate::error::Error;
use crate::random::Random;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
struct UniformRandomSettings {
    send_to_self: bool,
}

impl Default for UniformRandomSettings {
    fn default() -> Self {
        Self { send_to_self: true }
    }
}

struct UniformRandom {
    num_terminals: u32,
    self_id: u32,
    send_to_self: bool,
    random: Random,
}

impl TrafficPattern for UniformRandom {
    fn next_destination(&mut self) -> u32 {
        loop {
            let destination = self.random.next_u64(0, self.num_terminals as u64 - 1) as u32;
            if self.send_to_self || destination != self.self_id {
                return destination;
            }
        }
    }
}

pub(super) fn uniform_random(
    context: &PatternContext,
    settings: &Value,
) -> Result<Box<dyn TrafficPattern>, Error> {
    let settings: UniformRandomSettings = crate::config::from_settings(settings)?;
    if !settings.send_to_self && context.num_terminals < 2 {
        return Err(Error::InvalidSetting(
            "uniform_random without self-sends needs at least two terminals".to_string(),
        ));
    }
    Ok(Box::new(UniformRandom {
        num_terminals: context.num_terminals,
        self_id: context.self_id,
        send_to_self: settings.send_to_self,
        random: context.random.clone(),
    }))
}

/// Deals the terminals out in a random order, reshuffling each time the
/// deck runs dry.
struct RandomPermutation {
    deck: Vec<u32>,
    next: usize,
    random: Random,
}

impl TrafficPattern for RandomPermutation {
    fn next_destination(&mut self) -> u32 {
        if self.next == self.deck.len() {
            self.random.shuffle(&mut self.deck);
            self.next = 0;
        }
        let destination = self.deck[self.next];
        self.next += 1;
        destination
    }
}

pub(super) fn random_permutation(
    context: &PatternContext,
    _settings: &Value,
) -> Result<Box<dyn TrafficPattern>, Error> {
    Ok(Box::new(RandomPermutation {
        deck: (0..context.num_terminals).collect(),
        next: context.num_terminals as usize,
        random: context.random.clone(),
    }))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct HotSpotSettings {
    hotspots: Vec<u32>,
    hot_probability: f64,
}

struct HotSpot {
    num_terminals: u32,
    hotspots: Vec<u32>,
    hot_probability: f64,
    random: Random,
}

impl TrafficPattern for HotSpot {
    fn next_destination(&mut self) -> u32 {
        if self.random.gen_bool(self.hot_probability) {
            let pick = self.random.next_u64(0, self.hotspots.len() as u64 - 1);
            self.hotspots[pick as usize]
        } else {
            self.random.next_u64(0, self.num_terminals as u64 - 1) as u32
        }
    }
}

pub(super) fn hot_spot(
    context: &PatternContext,
    settings: &Value,
) -> Result<Box<dyn TrafficPattern>, Error> {
    let settings: HotSpotSettings = crate::config::from_settings(settings)?;
    if settings.hotspots.is_empty() {
        return Err(Error::InvalidSetting(
            "hot_spot requires at least one hotspot".to_string(),
        ));
    }
    if let Some(&out) = settings
        .hotspots
        .iter()
        .find(|&&h| h >= context.num_terminals)
    {
        return Err(Error::InvalidSetting(format!(
            "hotspot {} outside [0, {})",
            out, context.num_terminals
        )));
    }
    if !(0.0..=1.0).contains(&settings.hot_probability) {
        return Err(Error::InvalidSetting(format!(
            "hot_probability {} outside [0, 1]",
            settings.hot_probability
        )));
    }
    Ok(Box::new(HotSpot {
        num_terminals: context.num_terminals,
        hotspots: settings.hotspots,
        hot_probability: settings.hot_probability,
        random: context.random.clone(),
    }))
}
