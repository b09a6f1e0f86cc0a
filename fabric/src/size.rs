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

//! Message-size distributions.
//!
//! A distribution samples request sizes in flits and, when a terminal
//! turns a request into a response, may condition the response size on
//! the request. `max_message_size` bounds the samples and feeds the
//! injection pacing law.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::config::from_settings;
use crate::error::Error;
use crate::message::Message;
use crate::random::Random;

pub trait MessageSizeDistribution {
    /// Sample a request size in flits.
    fn next_message_size(&mut self) -> u32;
    /// Sample the size of the response to `request`.
    fn next_response_size(&mut self, request: &Message) -> u32;
    /// Upper bound of the samples.
    fn max_message_size(&self) -> u32;
}

type Constructor = fn(&Random, &Value) -> Result<Box<dyn MessageSizeDistribution>, Error>;

const CONSTRUCTORS: &[(&str, Constructor)] = &[
    ("probability", probability),
    ("random", random),
    ("single", single),
];

pub fn create(
    name: &str,
    random: &Random,
    settings: &Value,
) -> Result<Box<dyn MessageSizeDistribution>, Error> {
    let constructor = CONSTRUCTORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| c)
        .ok_or_else(|| Error::UnknownVariant {
            family: "message size distribution",
            name: name.to_string(),
        })?;
    constructor(random, settings)
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct SingleSettings {
    message_size: u32,
}

/// Every message has the same size.
struct Single {
    size: u32,
}

impl MessageSizeDistribution for Single {
    fn next_message_size(&mut self) -> u32 {
        self.size
    }

    fn next_response_size(&mut self, _request: &Message) -> u32 {
        self.size
    }

    fn max_message_size(&self) -> u32 {
        self.size
    }
}

fn single(_random: &Random, settings: &Value) -> Result<Box<dyn MessageSizeDistribution>, Error> {
    let settings: SingleSettings = from_settings(settings)?;
    if settings.message_size == 0 {
        return Err(Error::InvalidSetting(
            "message_size must be at least one flit".to_string(),
        ));
    }
    Ok(Box::new(Single {
        size: settings.message_size,
    }))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct UniformRandomSettings {
    min_message_size: u32,
    max_message_size: u32,
    #[serde(default)]
    dependent_response: bool,
}

/// Sizes drawn uniformly from an inclusive range.
struct UniformRandom {
    min: u32,
    max: u32,
    dependent_response: bool,
    random: Random,
}

impl MessageSizeDistribution for UniformRandom {
    fn next_message_size(&mut self) -> u32 {
        self.random.next_u64(self.min as u64, self.max as u64) as u32
    }

    fn next_response_size(&mut self, request: &Message) -> u32 {
        if self.dependent_response {
            request.num_flits()
        } else {
            self.next_message_size()
        }
    }

    fn max_message_size(&self) -> u32 {
        self.max
    }
}

fn random(random: &Random, settings: &Value) -> Result<Box<dyn MessageSizeDistribution>, Error> {
    let settings: UniformRandomSettings = from_settings(settings)?;
    if settings.min_message_size == 0 || settings.min_message_size > settings.max_message_size {
        return Err(Error::InvalidSetting(format!(
            "bad message size range [{}, {}]",
            settings.min_message_size, settings.max_message_size
        )));
    }
    Ok(Box::new(UniformRandom {
        min: settings.min_message_size,
        max: settings.max_message_size,
        dependent_response: settings.dependent_response,
        random: random.clone(),
    }))
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct ProbabilitySettings {
    message_sizes: Vec<u32>,
    probabilities: Vec<f64>,
    #[serde(default)]
    dependent_response: bool,
}

/// Sizes drawn from an explicit weighted list.
struct Probability {
    sizes: Vec<u32>,
    cumulative: Vec<f64>,
    dependent_response: bool,
    random: Random,
}

impl MessageSizeDistribution for Probability {
    fn next_message_size(&mut self) -> u32 {
        let total = *self.cumulative.last().expect("empty distribution");
        let draw = self.random.next_f64() * total;
        let index = self
            .cumulative
            .iter()
            .position(|&c| draw < c)
            .unwrap_or(self.sizes.len() - 1);
        self.sizes[index]
    }

    fn next_response_size(&mut self, request: &Message) -> u32 {
        if self.dependent_response {
            request.num_flits()
        } else {
            self.next_message_size()
        }
    }

    fn max_message_size(&self) -> u32 {
        *self.sizes.iter().max().expect("empty distribution")
    }
}

fn probability(
    random: &Random,
    settings: &Value,
) -> Result<Box<dyn MessageSizeDistribution>, Error> {
    let settings: ProbabilitySettings = from_settings(settings)?;
    if settings.message_sizes.is_empty()
        || settings.message_sizes.len() != settings.probabilities.len()
    {
        return Err(Error::InvalidSetting(format!(
            "{} message sizes with {} probabilities",
            settings.message_sizes.len(),
            settings.probabilities.len()
        )));
    }
    if settings.message_sizes.iter().any(|&s| s == 0) {
        return Err(Error::InvalidSetting(
            "message sizes must be at least one flit".to_string(),
        ));
    }
    if settings.probabilities.iter().any(|&p| p < 0.0) || settings.probabilities.iter().sum::<f64>() <= 0.0 {
        return Err(Error::InvalidSetting(
            "probabilities must be non-negative with a positive sum".to_string(),
        ));
    }
    let mut cumulative = Vec::with_capacity(settings.probabilities.len());
    let mut sum = 0.0;
    for p in &settings.probabilities {
        sum += p;
        cumulative.push(sum);
    }
    Ok(Box::new(Probability {
        sizes: settings.message_sizes,
        cumulative,
        dependent_response: settings.dependent_response,
        random: random.clone(),
    }))
}
