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

//! Cycle-approximate discrete-event simulation of interconnection-network
//! workloads: a deterministic event scheduler with named clock domains, a
//! synthetic-traffic ("blast") workload with warmup and saturation
//! detection, and the traffic-pattern and message-size machinery that
//! feeds it. Routers and routing live behind the [`network::Network`]
//! boundary.

mod clock;
mod component;
mod config;
mod error;
mod event;
mod message;
pub mod network;
mod random;
mod sim;
mod size;
mod stats;
pub mod traffic;
pub mod workload;

// Public types
// simulated time in picoseconds
pub type Time = u64;
// cycle count within a clock domain
pub type Cycle = u64;

pub use crate::clock::{ClockId, ClockRegistry, CHANNEL_CLOCK, TERMINAL_CLOCK};
pub use crate::component::{Component, Scope};
pub use crate::config::{
    ApplicationConfig, DistributionConfig, NetworkConfig, PatternConfig, SimulationConfig,
    TerminalConfig,
};
pub use crate::error::Error;
pub use crate::message::{Flit, Message, Packet};
pub use crate::network::{Endpoint, EnrouteTally, LatencyNetwork, Network};
pub use crate::random::Random;
pub use crate::sim::Simulator;
pub use crate::size::MessageSizeDistribution;
pub use crate::stats::{
    CsvMessageLog, CsvTrafficLog, MemoryMessageLog, MessageLog, NullMessageLog, NullTrafficLog,
    TrafficLog,
};
pub use crate::traffic::TrafficPattern;
pub use crate::workload::{
    build_simulation, build_simulation_with_logs, run_workload, Application, ApplicationPhase,
    BasicWorkload, BlastTerminal, RunSummary, TerminalPhase, TerminateReason, TransactionRegistry,
    Workload,
};
