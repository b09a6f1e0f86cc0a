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

//! Saturation-detection and pacing scenarios.
//!
//! The network here is scripted: deliveries take one channel cycle and
//! the enroute-flit samples the warmup detector reads come from a fixed
//! list, so warmed/saturated outcomes are forced deterministically.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use fabric::{
    Application, ApplicationConfig, BasicWorkload, ClockId, Component, Endpoint, EnrouteTally,
    MemoryMessageLog, Message, Network, Scope, Simulator, Time, Workload, CHANNEL_CLOCK,
    TERMINAL_CLOCK,
};

const DELIVER_EVT: i32 = 0xD1;

struct Pump {
    scope: Scope,
    network: Weak<ScriptedNetwork>,
}

impl Component for Pump {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn process_event(&mut self, payload: Option<Box<dyn Any>>, kind: i32) {
        assert_eq!(kind, DELIVER_EVT);
        let message = payload.unwrap().downcast::<Message>().unwrap();
        let network = self.network.upgrade().unwrap();
        network.deliver(*message);
    }
}

/// Flat network: ids are addresses, every delivery takes one channel
/// cycle, and enroute counts replay a scripted list of flit values.
struct ScriptedNetwork {
    sim: Rc<Simulator>,
    channel_clock: ClockId,
    num_interfaces: u32,
    endpoints: RefCell<HashMap<u32, Rc<RefCell<dyn Endpoint>>>>,
    pump: RefCell<Option<Rc<RefCell<Pump>>>>,
    enroute_script: Vec<u32>,
    script_pos: Cell<usize>,
    next_message_id: Cell<u64>,
    send_times: RefCell<Vec<Time>>,
}

impl ScriptedNetwork {
    fn new(sim: &Rc<Simulator>, num_interfaces: u32, enroute_script: Vec<u32>) -> Rc<Self> {
        let network = Rc::new(Self {
            sim: sim.clone(),
            channel_clock: sim.clock(CHANNEL_CLOCK).unwrap(),
            num_interfaces,
            endpoints: RefCell::new(HashMap::new()),
            pump: RefCell::new(None),
            enroute_script,
            script_pos: Cell::new(0),
            next_message_id: Cell::new(0),
            send_times: RefCell::new(Vec::new()),
        });
        let pump = Rc::new(RefCell::new(Pump {
            scope: Scope::root("scripted_network"),
            network: Rc::downgrade(&network),
        }));
        *network.pump.borrow_mut() = Some(pump);
        network
    }

    fn deliver(&self, message: Message) {
        let source = self.endpoints.borrow().get(&message.source).cloned().unwrap();
        let destination = self
            .endpoints
            .borrow()
            .get(&message.destination)
            .cloned()
            .unwrap();
        source.borrow_mut().handle_delivered_message(&message);
        destination.borrow_mut().handle_received_message(message);
    }
}

impl Network for ScriptedNetwork {
    fn num_interfaces(&self) -> u32 {
        self.num_interfaces
    }

    fn num_routers(&self) -> u32 {
        1
    }

    fn translate_interface_id_to_address(&self, id: u32) -> Vec<u32> {
        vec![id]
    }

    fn translate_interface_address_to_id(&self, address: &[u32]) -> u32 {
        address[0]
    }

    fn compute_minimal_hops(&self, _source: &[u32], _destination: &[u32]) -> u32 {
        0
    }

    fn register_endpoint(&self, id: u32, endpoint: Rc<RefCell<dyn Endpoint>>) {
        self.endpoints.borrow_mut().insert(id, endpoint);
    }

    fn send_message(&self, mut message: Message, destination: u32) -> u64 {
        let id = self.next_message_id.get();
        self.next_message_id.set(id + 1);
        message.id = id;
        message.destination = destination;
        self.send_times.borrow_mut().push(self.sim.current_time());

        let arrival = self.sim.future_cycle(self.channel_clock, 1);
        let pump = self.pump.borrow().clone().unwrap();
        self.sim
            .schedule(arrival, 0, pump, Some(Box::new(message)), DELIVER_EVT);
        id
    }

    fn enroute_count(&self) -> EnrouteTally {
        if self.enroute_script.is_empty() {
            return EnrouteTally::default();
        }
        let pos = self.script_pos.get();
        self.script_pos.set(pos + 1);
        let flits = self.enroute_script[pos.min(self.enroute_script.len() - 1)];
        EnrouteTally {
            messages: 1,
            packets: 1,
            flits,
        }
    }
}

struct Exiter {
    scope: Scope,
    sim: Rc<Simulator>,
}

impl Component for Exiter {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn process_event(&mut self, _payload: Option<Box<dyn Any>>, _kind: i32) {
        self.sim.exit();
    }
}

#[allow(clippy::type_complexity)]
fn build(
    app_yaml: &str,
    enroute_script: Vec<u32>,
) -> (
    Rc<Simulator>,
    Rc<ScriptedNetwork>,
    Rc<RefCell<BasicWorkload>>,
    Rc<RefCell<MemoryMessageLog>>,
) {
    let _logger = env_logger::builder().is_test(true).try_init();
    let config: ApplicationConfig = serde_yaml::from_str(app_yaml).unwrap();

    let sim = Simulator::new(0xBAAD_F00D);
    sim.register_clock(CHANNEL_CLOCK, 1_000);
    sim.register_clock(TERMINAL_CLOCK, 1_000);

    let network = ScriptedNetwork::new(&sim, 1, enroute_script);
    let network_dyn: Rc<dyn Network> = network.clone();
    let top = Scope::root("sim");
    let workload = BasicWorkload::build(&sim, top.child("workload"));
    let workload_dyn: Rc<RefCell<dyn Workload>> = workload.clone();
    let workload_ref: Weak<RefCell<dyn Workload>> = Rc::downgrade(&workload_dyn);
    let message_log = Rc::new(RefCell::new(MemoryMessageLog::default()));
    let application = Application::build(
        &sim,
        &network_dyn,
        workload_ref,
        message_log.clone(),
        &config,
        0,
        top.child("application_0"),
    )
    .unwrap();
    workload.borrow_mut().add_application(application);
    (sim, network, workload, message_log)
}

fn app_yaml(policies: &str, terminal: &str) -> String {
    format!(
        "---
{policies}
warmup_threshold: 1.0
blast_terminal:
  request_injection_rate: 1.0
  num_transactions: 100
  max_packet_size: 16
  transaction_size: 1
  traffic_pattern:
    pattern: uniform_random
  message_size_distribution:
    distribution: single
    message_size: 50
  request_protocol_class: 0
  enable_responses: false
{terminal}
"
    )
}

fn main() {
    env_logger::init();
    let yaml = app_yaml(
        "kill_on_saturation: true\nlog_during_saturation: false",
        "  warmup_interval: 100\n  warmup_window: 5\n  warmup_attempts: 50",
    );
    let (sim, _network, workload, _log) =
        build(&yaml, vec![100, 110, 120, 130, 140, 500]);
    let summary = fabric::run_workload(&sim, &workload).expect("run failed");
    log::info!("terminated: {:?}", summary.terminated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric::{run_workload, ApplicationPhase, TerminateReason};

    #[test]
    fn fast_fail_spike_kills_through_the_terminate_hook() {
        // Window fills at samples 100..140, so the fast-fail reference is
        // 140; the 500 sample exceeds three times that on the next
        // interval.
        let yaml = app_yaml(
            "kill_on_saturation: true\nlog_during_saturation: false",
            "  warmup_interval: 100\n  warmup_window: 5\n  warmup_attempts: 50",
        );
        let (sim, _network, workload, _log) =
            build(&yaml, vec![100, 110, 120, 130, 140, 500]);

        let summary = run_workload(&sim, &workload).unwrap();
        assert_eq!(summary.terminated, Some(TerminateReason::Saturated));
        assert!(sim.exited());
    }

    #[test]
    fn exhausted_warmup_attempts_drain_the_network() {
        // Enroute flits keep growing but never spike past the fast-fail
        // bound, so saturation comes from the attempt limit instead.
        let yaml = app_yaml(
            "kill_on_saturation: false\nlog_during_saturation: false",
            "  warmup_interval: 100\n  warmup_window: 5\n  warmup_attempts: 3",
        );
        let (sim, _network, workload, log) = build(
            &yaml,
            vec![100, 110, 120, 130, 140, 150, 160, 170, 180, 190],
        );

        let summary = run_workload(&sim, &workload).unwrap();
        assert_eq!(summary.terminated, None);
        let workload = workload.borrow();
        assert!(workload.is_done());
        assert_eq!(
            workload.application(0).borrow().phase(),
            ApplicationPhase::Draining
        );
        // The drain policy never reaches the logging phase.
        assert_eq!(summary.percent_complete, 0.0);
        assert!(log.borrow().started.is_empty());
    }

    #[test]
    fn log_during_saturation_logs_until_the_cutoff() {
        let yaml = app_yaml(
            "kill_on_saturation: false\nlog_during_saturation: true\nmax_saturation_cycles: 2000",
            "  warmup_interval: 100\n  warmup_window: 5\n  warmup_attempts: 50",
        );
        let (sim, _network, workload, log) =
            build(&yaml, vec![100, 110, 120, 130, 140, 500]);

        let summary = run_workload(&sim, &workload).unwrap();
        assert_eq!(summary.terminated, None);
        let workload = workload.borrow();
        assert!(workload.is_done());
        assert_eq!(
            workload.application(0).borrow().phase(),
            ApplicationPhase::Draining
        );
        // Logging ran between the saturation cutover and the cutoff.
        let log = log.borrow();
        assert!(!log.started.is_empty());
        assert!(!log.ended.is_empty());
        assert!(log.ended.len() <= log.started.len());
    }

    #[test]
    fn steady_state_pacing_spaces_requests_evenly() {
        // rate 0.5 and 10-flit messages: ceil(10 / 0.5) = 20 channel
        // cycles between consecutive requests.
        let yaml = "---
kill_on_saturation: false
log_during_saturation: false
warmup_threshold: 1.0
blast_terminal:
  request_injection_rate: 0.5
  num_transactions: 1000
  max_packet_size: 16
  transaction_size: 1
  traffic_pattern:
    pattern: uniform_random
  message_size_distribution:
    distribution: single
    message_size: 10
  request_protocol_class: 0
  enable_responses: false
  warmup_interval: 0
  warmup_window: 5
  warmup_attempts: 10
";
        let (sim, network, _workload, _log) = build(yaml, Vec::new());

        let exiter = Rc::new(RefCell::new(Exiter {
            scope: Scope::root("exiter"),
            sim: sim.clone(),
        }));
        sim.schedule(400_000, 0, exiter, None, 0);
        sim.run();

        let times = network.send_times.borrow();
        assert!(times.len() >= 5, "only {} sends before the exit", times.len());
        for gap in times.windows(2).map(|w| w[1] - w[0]) {
            assert_eq!(gap, 20_000);
        }
    }
}
