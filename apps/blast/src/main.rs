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

//! Run a blast workload over the behavioral latency network.
//!
//! Without a config file a small uniform-random demo configuration is
//! used, so `blast` runs out of the box.

use std::path::PathBuf;

use env_logger::Target;
use structopt::StructOpt;

use fabric::{build_simulation, run_workload, SimulationConfig, TerminateReason};

const DEFAULT_CONFIG: &str = "---
seed: 12345
clocks:
  channel: 1000
  terminal: 1000
network:
  dimensions: [3, 3]
  concentration: 2
  hop_latency: 3
application:
  kill_on_saturation: false
  log_during_saturation: false
  warmup_threshold: 0.8
  blast_terminal:
    request_injection_rate: 0.2
    num_transactions: 200
    max_packet_size: 8
    transaction_size: 1
    traffic_pattern:
      pattern: uniform_random
    message_size_distribution:
      distribution: random
      min_message_size: 2
      max_message_size: 16
    request_protocol_class: 0
    enable_responses: false
    warmup_interval: 100
    warmup_window: 10
    warmup_attempts: 30
";

#[derive(StructOpt)]
#[structopt(name = "blast", about = "Synthetic-traffic interconnection-network simulation")]
struct Arguments {
    /// YAML simulation configuration; omit for the built-in demo
    #[structopt(short, long)]
    config: Option<PathBuf>,
    /// Print the effective configuration and exit
    #[structopt(long)]
    dump_config: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::from_args();

    env_logger::builder().target(Target::Stderr).init();

    let config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::from_str(DEFAULT_CONFIG)?,
    };
    if args.dump_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let (sim, network, workload) = build_simulation(&config)?;
    log::info!(
        "simulating {} terminals over {} routers",
        network.num_interfaces(),
        network.num_routers()
    );

    let summary = run_workload(&sim, &workload)?;
    println!(
        "done at {}ps: {} events, {:.1}% of logged transactions complete",
        summary.end_time,
        summary.events_executed,
        summary.percent_complete * 100.0
    );

    if summary.terminated == Some(TerminateReason::Saturated) {
        println!("network saturated; terminating");
        std::process::exit(0);
    }
    Ok(())
}
