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

//! End-to-end blast scenarios: a low-load uniform-random run that
//! completes every phase, the forced-warmup path for idle terminals,
//! and the steady-state injection pacing law.

use std::cell::RefCell;
use std::rc::Rc;

use fabric::{
    build_simulation_with_logs, run_workload, ApplicationPhase, Error, MemoryMessageLog,
    NullTrafficLog, SimulationConfig, TerminalPhase,
};

const COMPLETE_CONFIG: &str = "---
seed: 12345
clocks:
  channel: 1000
  terminal: 1000
network:
  dimensions: [2, 2]
  concentration: 1
  hop_latency: 2
application:
  kill_on_saturation: false
  log_during_saturation: false
  warmup_threshold: 1.0
  blast_terminal:
    request_injection_rate: 0.25
    num_transactions: 5
    max_packet_size: 2
    transaction_size: 2
    traffic_pattern:
      pattern: uniform_random
    message_size_distribution:
      distribution: single
      message_size: 4
    request_protocol_class: 0
    enable_responses: false
    warmup_interval: 0
    warmup_window: 5
    warmup_attempts: 10
";

fn run_to_completion(config: &str) -> (fabric::RunSummary, Rc<RefCell<MemoryMessageLog>>) {
    let _logger = env_logger::builder().is_test(true).try_init();
    let config = SimulationConfig::from_str(config).unwrap();
    let message_log = Rc::new(RefCell::new(MemoryMessageLog::default()));
    let traffic_log = Rc::new(RefCell::new(NullTrafficLog));
    let (sim, _network, workload) =
        build_simulation_with_logs(&config, message_log.clone(), traffic_log).unwrap();

    let summary = run_workload(&sim, &workload).unwrap();
    assert!(workload.borrow().is_done());
    assert_eq!(
        workload.borrow().application(0).borrow().phase(),
        ApplicationPhase::Draining
    );
    (summary, message_log)
}

fn main() {
    let config = SimulationConfig::from_str(COMPLETE_CONFIG).unwrap();
    let message_log = Rc::new(RefCell::new(MemoryMessageLog::default()));
    let traffic_log = Rc::new(RefCell::new(NullTrafficLog));
    env_logger::init();
    let (sim, _network, workload) =
        build_simulation_with_logs(&config, message_log, traffic_log).unwrap();
    let summary = run_workload(&sim, &workload).expect("run failed");
    log::info!("finished at {}ps", summary.end_time);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_all_phases() {
        let (summary, message_log) = run_to_completion(COMPLETE_CONFIG);

        assert_eq!(summary.terminated, None);
        assert_eq!(summary.percent_complete, 1.0);
        assert!(summary.end_time > 0);

        // Four active terminals each logged at least five transactions;
        // transactions tagged between a terminal's completion and the
        // application-wide stop also finish in the log.
        let log = message_log.borrow();
        assert!(log.ended.len() >= 4 * 5);
        assert!(log.started.len() >= log.ended.len());
        for transaction in &log.ended {
            assert!(log.started.contains(transaction));
        }
        // Transaction ids are unique across the run.
        let mut ended = log.ended.clone();
        ended.sort_unstable();
        ended.dedup();
        assert_eq!(ended.len(), log.ended.len());
    }

    #[test]
    fn responses_complete_transactions_at_the_requester() {
        let config = COMPLETE_CONFIG
            .replace(
                "    enable_responses: false\n",
                "    enable_responses: true\n    request_processing_latency: 3\n    response_protocol_class: 1\n",
            )
            .replace("  warmup_threshold: 1.0", "  warmup_threshold: 0.5");
        let (summary, message_log) = run_to_completion(&config);

        assert_eq!(summary.terminated, None);
        assert_eq!(summary.percent_complete, 1.0);
        assert!(message_log.borrow().ended.len() >= 4 * 5);
    }

    #[test]
    fn idle_terminals_need_a_forced_warmup() {
        let _logger = env_logger::builder().is_test(true).try_init();
        let config = COMPLETE_CONFIG
            .replace("request_injection_rate: 0.25", "request_injection_rate: 0.0")
            .replace("warmup_threshold: 1.0", "warmup_threshold: 0.0");
        let config = SimulationConfig::from_str(&config).unwrap();
        let message_log = Rc::new(RefCell::new(MemoryMessageLog::default()));
        let traffic_log = Rc::new(RefCell::new(NullTrafficLog));
        let (sim, _network, workload) =
            build_simulation_with_logs(&config, message_log, traffic_log).unwrap();

        // Nothing injects, so the queue drains while the workload is
        // still waiting on its terminals.
        let result = run_workload(&sim, &workload);
        assert!(matches!(result, Err(Error::PrematureQuiescence)));

        // The ForceWarmed event at t=0 still moved the application and
        // its terminals into the logging phase.
        assert_eq!(sim.current_time(), 0);
        let workload = workload.borrow();
        let application = workload.application(0).borrow();
        assert_eq!(application.phase(), ApplicationPhase::Logging);
        for t in 0..application.num_terminals() {
            let terminal = application.terminal(t).borrow();
            assert_eq!(terminal.phase(), TerminalPhase::Logging);
            assert_eq!(terminal.percent_complete(), 0.0);
        }
        assert_eq!(application.percent_complete(), 1.0);
    }
}
