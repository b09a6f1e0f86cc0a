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

//! Simulation configuration.
//!
//! A configuration is a tree of named values read from YAML. Unknown
//! keys are ignored; missing required keys fail deserialization; range
//! constraints are checked by the constructors that consume the values.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Time;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Clock domain name to tick period in picoseconds.
    pub clocks: BTreeMap<String, Time>,
    pub network: NetworkConfig,
    pub application: ApplicationConfig,
    /// CSV message log path; absent means discard.
    #[serde(default)]
    pub message_log: Option<PathBuf>,
    /// CSV traffic log path; absent means discard.
    #[serde(default)]
    pub traffic_log: Option<PathBuf>,
}

fn default_seed() -> u64 {
    0x8765_4321_FEDC_BA09
}

impl SimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn from_str(config: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(config)?)
    }
}

/// Shape and timing of the behavioral network model.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Router-grid widths per dimension (torus connectivity).
    pub dimensions: Vec<u32>,
    /// Terminals attached to each router.
    pub concentration: u32,
    #[serde(default = "default_interface_ports")]
    pub interface_ports: u32,
    /// Delivery latency per router-to-router hop, in channel cycles.
    pub hop_latency: u64,
}

fn default_interface_ports() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ApplicationConfig {
    pub kill_on_saturation: bool,
    pub log_during_saturation: bool,
    /// Required when logging through saturation.
    #[serde(default)]
    pub max_saturation_cycles: Option<u64>,
    pub warmup_threshold: f64,
    pub blast_terminal: TerminalConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TerminalConfig {
    pub request_injection_rate: f64,
    /// CSV of per-terminal injection-rate multipliers.
    #[serde(default)]
    pub relative_injection: Option<PathBuf>,
    pub num_transactions: u32,
    pub max_packet_size: u32,
    pub transaction_size: u32,
    pub traffic_pattern: PatternConfig,
    pub message_size_distribution: DistributionConfig,
    pub request_protocol_class: u32,
    pub enable_responses: bool,
    /// Required when responses are enabled.
    #[serde(default)]
    pub request_processing_latency: Option<u64>,
    /// Required when responses are enabled.
    #[serde(default)]
    pub response_protocol_class: Option<u32>,
    pub warmup_interval: u32,
    pub warmup_window: u32,
    pub warmup_attempts: u32,
}

/// A traffic-pattern selection: the registry tag plus whatever settings
/// the selected variant wants to read.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PatternConfig {
    pub pattern: String,
    #[serde(flatten)]
    pub settings: serde_yaml::Value,
}

/// A message-size-distribution selection, same shape as [`PatternConfig`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DistributionConfig {
    pub distribution: String,
    #[serde(flatten)]
    pub settings: serde_yaml::Value,
}

/// Deserialize a variant's settings subtree. An absent subtree reads as
/// an empty mapping so variants without required settings accept it.
pub(crate) fn from_settings<T: DeserializeOwned>(settings: &serde_yaml::Value) -> Result<T, Error> {
    let value = match settings {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
        other => other.clone(),
    };
    Ok(serde_yaml::from_value(value)?)
}
