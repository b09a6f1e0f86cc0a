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

//! The blast terminal.
//!
//! Each terminal paces request injection against the channel clock,
//! tracks its outstanding transactions, optionally turns requests into
//! responses, and runs warmup/saturation detection over the network's
//! enroute-flit counts. Lifecycle:
//!
//! `Warming -> WarmBlabbing -> Logging -> LogBlabbing -> Draining`
//!
//! `stop_sending` forces `Draining` from any state.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::rc::{Rc, Weak};

use log::{debug, trace};

use crate::clock::{ClockId, CHANNEL_CLOCK};
use crate::component::{Component, Scope};
use crate::config::TerminalConfig;
use crate::error::Error;
use crate::message::Message;
use crate::network::{Endpoint, Network};
use crate::sim::Simulator;
use crate::size::{self, MessageSizeDistribution};
use crate::stats::MessageLog;
use crate::traffic::{self, PatternContext, TrafficPattern};
use crate::workload::application::{
    Application, TERMINAL_COMPLETE_EVT, TERMINAL_DONE_EVT, TERMINAL_SATURATED_EVT,
    TERMINAL_WARMED_EVT,
};
use crate::workload::TransactionRegistry;
use crate::Time;

/// Message opcodes, also used as the terminal's event kinds.
pub const REQUEST_MSG: u32 = 0xFA;
pub const RESPONSE_MSG: u32 = 0x82;

const REQUEST_EVT: i32 = REQUEST_MSG as i32;
const RESPONSE_EVT: i32 = RESPONSE_MSG as i32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TerminalPhase {
    Warming,
    WarmBlabbing,
    Logging,
    LogBlabbing,
    Draining,
}

/// Channel cycles needed to offer `flits` flits at `rate` flits/cycle.
pub fn cycles_to_send(rate: f64, flits: u64) -> u64 {
    assert!(rate > 0.0, "cannot pace a zero injection rate");
    (flits as f64 / rate).ceil() as u64
}

/// Least-squares slope of `values` over `times`.
fn slope(times: &[Time], values: &[u32]) -> f64 {
    assert_eq!(times.len(), values.len());
    let n = times.len() as f64;
    let mean_t = times.iter().map(|&t| t as f64).sum::<f64>() / n;
    let mean_v = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (&t, &v) in times.iter().zip(values) {
        let dt = t as f64 - mean_t;
        numerator += dt * (v as f64 - mean_v);
        denominator += dt * dt;
    }
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Line `id` (0-indexed over non-empty lines) of the CSV is this
/// terminal's injection-rate multiplier.
fn relative_injection(path: &Path, id: u32) -> Result<f64, Error> {
    let file = File::open(path)?;
    let mut line_num = 0u32;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if line_num == id {
            let value: f64 = line.trim().parse().map_err(|_| {
                Error::InvalidSetting(format!("bad relative injection entry '{}'", line))
            })?;
            if value < 0.0 {
                return Err(Error::InvalidSetting(format!(
                    "negative relative injection {} for terminal {}",
                    value, id
                )));
            }
            return Ok(value);
        }
        line_num += 1;
    }
    Err(Error::RelativeInjectionMissing(id))
}

pub struct BlastTerminal {
    scope: Scope,
    sim: Rc<Simulator>,
    network: Rc<dyn Network>,
    message_log: Rc<RefCell<dyn MessageLog>>,
    registry: Rc<RefCell<TransactionRegistry>>,
    app: Weak<RefCell<Application>>,
    self_ref: Weak<RefCell<BlastTerminal>>,
    channel_clock: ClockId,

    id: u32,
    address: Vec<u32>,

    request_injection_rate: f64,
    num_transactions: u32,
    max_packet_size: u32,
    transaction_size: u32,
    request_protocol_class: u32,
    enable_responses: bool,
    request_processing_latency: u64,
    response_protocol_class: u32,
    warmup_interval: u32,
    warmup_window: u32,
    max_warmup_attempts: u32,

    traffic_pattern: Box<dyn TrafficPattern>,
    message_size: Box<dyn MessageSizeDistribution>,

    phase: TerminalPhase,
    outstanding: HashMap<u64, u32>,
    transactions_to_log: HashSet<u64>,
    loggable_complete: u32,
    notified_done: bool,

    warmup_flits_received: u32,
    warmup_attempts: u32,
    enroute_sample_times: Vec<Time>,
    enroute_sample_values: Vec<u32>,
    enroute_sample_pos: usize,
    fast_fail_sample: Option<u32>,
}

impl BlastTerminal {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        sim: &Rc<Simulator>,
        network: &Rc<dyn Network>,
        message_log: Rc<RefCell<dyn MessageLog>>,
        registry: Rc<RefCell<TransactionRegistry>>,
        app: Weak<RefCell<Application>>,
        id: u32,
        config: &TerminalConfig,
        scope: Scope,
    ) -> Result<Rc<RefCell<Self>>, Error> {
        if !(0.0..=1.0).contains(&config.request_injection_rate) {
            return Err(Error::InvalidSetting(format!(
                "request_injection_rate {} outside [0, 1]",
                config.request_injection_rate
            )));
        }
        let mut rate = config.request_injection_rate;
        if let Some(path) = &config.relative_injection {
            rate *= relative_injection(path, id)?;
        }

        if config.max_packet_size == 0 {
            return Err(Error::InvalidSetting("max_packet_size must be nonzero".into()));
        }
        if config.transaction_size == 0 {
            return Err(Error::InvalidSetting("transaction_size must be nonzero".into()));
        }
        if config.warmup_window < 5 {
            return Err(Error::InvalidSetting(format!(
                "warmup_window {} below the minimum of 5",
                config.warmup_window
            )));
        }
        if config.warmup_attempts == 0 {
            return Err(Error::InvalidSetting("warmup_attempts must be nonzero".into()));
        }

        let (request_processing_latency, response_protocol_class) = if config.enable_responses {
            let latency = config.request_processing_latency.ok_or_else(|| {
                Error::InvalidSetting("responses need request_processing_latency".into())
            })?;
            let class = config.response_protocol_class.ok_or_else(|| {
                Error::InvalidSetting("responses need response_protocol_class".into())
            })?;
            (latency, class)
        } else {
            (0, 0)
        };

        let num_terminals = network.num_interfaces();
        let context = PatternContext {
            num_terminals,
            self_id: id,
            random: &sim.random,
        };
        let traffic_pattern = traffic::create(
            &config.traffic_pattern.pattern,
            &context,
            &config.traffic_pattern.settings,
        )?;
        let message_size = size::create(
            &config.message_size_distribution.distribution,
            &sim.random,
            &config.message_size_distribution.settings,
        )?;

        // The warmup interval must cover at least two of the largest
        // messages so a single delivery cannot span a whole window.
        if config.warmup_interval > 0 {
            if config.warmup_interval < 100 {
                return Err(Error::InvalidSetting(format!(
                    "warmup_interval {} below the minimum of 100",
                    config.warmup_interval
                )));
            }
            if config.warmup_interval < 2 * message_size.max_message_size() {
                return Err(Error::InvalidSetting(format!(
                    "warmup_interval {} below twice the max message size {}",
                    config.warmup_interval,
                    message_size.max_message_size()
                )));
            }
        }

        let channel_clock = sim.clock(CHANNEL_CLOCK).ok_or_else(|| {
            Error::InvalidSetting(format!("no '{}' clock registered", CHANNEL_CLOCK))
        })?;

        let terminal = Rc::new(RefCell::new(Self {
            scope,
            sim: sim.clone(),
            network: network.clone(),
            message_log,
            registry,
            app,
            self_ref: Weak::new(),
            channel_clock,
            id,
            address: network.translate_interface_id_to_address(id),
            request_injection_rate: rate,
            num_transactions: config.num_transactions,
            max_packet_size: config.max_packet_size,
            transaction_size: config.transaction_size,
            request_protocol_class: config.request_protocol_class,
            enable_responses: config.enable_responses,
            request_processing_latency,
            response_protocol_class,
            warmup_interval: config.warmup_interval,
            warmup_window: config.warmup_window,
            max_warmup_attempts: config.warmup_attempts,
            traffic_pattern,
            message_size,
            phase: TerminalPhase::Warming,
            outstanding: HashMap::new(),
            transactions_to_log: HashSet::new(),
            loggable_complete: 0,
            notified_done: false,
            warmup_flits_received: 0,
            warmup_attempts: 0,
            enroute_sample_times: Vec::new(),
            enroute_sample_values: Vec::new(),
            enroute_sample_pos: 0,
            fast_fail_sample: None,
        }));
        terminal.borrow_mut().self_ref = Rc::downgrade(&terminal);
        sim.register_component(&terminal);

        // Schedule the first request at a jittered channel cycle so the
        // terminals do not all burst at t=0.
        {
            let this = terminal.borrow();
            if this.request_injection_rate > 0.0 {
                let max_transaction =
                    this.message_size.max_message_size() as u64 * this.transaction_size as u64;
                let cycles = cycles_to_send(this.request_injection_rate, max_transaction);
                let cycles = sim.random.next_u64(1, 1 + cycles * 3);
                let time = sim.future_cycle(this.channel_clock, 1)
                    + (cycles - 1) * sim.clock_period(this.channel_clock);
                debug!("{}: start time is {}ps", this.scope, time);
                sim.schedule(time, 0, terminal.clone(), None, REQUEST_EVT);
            } else {
                debug!("{}: not running", this.scope);
            }
        }

        Ok(terminal)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn address(&self) -> &[u32] {
        &self.address
    }

    pub fn phase(&self) -> TerminalPhase {
        self.phase
    }

    pub fn request_injection_rate(&self) -> f64 {
        self.request_injection_rate
    }

    /// Defined once logging has begun; zero before that.
    pub fn percent_complete(&self) -> f64 {
        if self.phase >= TerminalPhase::Logging && self.request_injection_rate > 0.0 {
            if self.num_transactions == 0 {
                1.0
            } else {
                let count = self.loggable_complete.min(self.num_transactions);
                count as f64 / self.num_transactions as f64
            }
        } else {
            0.0
        }
    }

    pub fn stop_warming(&mut self) {
        self.phase = TerminalPhase::WarmBlabbing;
    }

    pub fn start_logging(&mut self) {
        // Clear the samples in case warmup never consumed them.
        self.enroute_sample_times.clear();
        self.enroute_sample_values.clear();

        self.phase = TerminalPhase::Logging;
        if self.request_injection_rate > 0.0 && self.num_transactions == 0 {
            self.complete();
        }
    }

    pub fn stop_logging(&mut self) {
        self.phase = TerminalPhase::LogBlabbing;
        if self.request_injection_rate > 0.0
            && (self.num_transactions == 0 || self.transactions_to_log.is_empty())
        {
            self.done();
        }
    }

    pub fn stop_sending(&mut self) {
        self.phase = TerminalPhase::Draining;
    }

    fn start_transaction(&mut self) {
        assert!(self.phase != TerminalPhase::Draining);

        let destination = self.traffic_pattern.next_destination();
        let message_size = self.message_size.next_message_size();
        let transaction = self
            .registry
            .borrow_mut()
            .create(self.id, self.sim.current_time());

        let inserted = self
            .outstanding
            .insert(transaction, self.transaction_size)
            .is_none();
        assert!(inserted, "transaction id {:#x} reused", transaction);

        if self.phase == TerminalPhase::Logging {
            let tagged = self.transactions_to_log.insert(transaction);
            assert!(tagged);
            self.message_log.borrow_mut().start_transaction(transaction);
        }

        trace!(
            "{}: transaction {:#x} -> {} ({} messages of {} flits)",
            self.scope,
            transaction,
            destination,
            self.transaction_size,
            message_size
        );
        for _ in 0..self.transaction_size {
            let message = Message::new(
                REQUEST_MSG,
                self.request_protocol_class,
                transaction,
                message_size,
                self.max_packet_size,
            );
            self.send_message(message, destination);
        }

        // Pace the next request; a same-cycle follow-up injects
        // immediately instead of going back through the queue.
        let transaction_flits = message_size as u64 * self.transaction_size as u64;
        let cycles = cycles_to_send(self.request_injection_rate, transaction_flits);
        let time = self.sim.future_cycle(self.channel_clock, cycles);
        if time == self.sim.current_time() {
            self.start_transaction();
        } else {
            let target = self.self_ref.upgrade().expect("terminal dropped");
            self.sim.schedule(time, 0, target, None, REQUEST_EVT);
        }
    }

    fn send_response(&mut self, request: Message) {
        assert!(self.enable_responses);

        let destination = request.source;
        let message_size = self.message_size.next_response_size(&request);
        let transaction = request.transaction;
        drop(request);

        let message = Message::new(
            RESPONSE_MSG,
            self.response_protocol_class,
            transaction,
            message_size,
            self.max_packet_size,
        );
        self.send_message(message, destination);
    }

    fn send_message(&mut self, mut message: Message, destination: u32) {
        message.source = self.id;
        self.network.send_message(message, destination);
    }

    /// Decrement the outstanding count; at zero the transaction ends.
    /// Returns whether this was the last message of the transaction.
    fn complete_tracking(&mut self, transaction: u64) -> bool {
        let remaining = self
            .outstanding
            .get_mut(&transaction)
            .unwrap_or_else(|| panic!("transaction {:#x} is not outstanding", transaction));
        assert!(*remaining > 0);
        *remaining -= 1;
        if *remaining == 0 {
            self.outstanding.remove(&transaction);
            self.registry.borrow_mut().end(transaction);
            return true;
        }
        false
    }

    fn complete_loggable(&mut self, transaction: u64) {
        assert!(!self.outstanding.contains_key(&transaction));
        let removed = self.transactions_to_log.remove(&transaction);
        assert!(removed, "transaction {:#x} was not tagged", transaction);

        self.message_log.borrow_mut().end_transaction(transaction);
        self.loggable_complete += 1;

        if self.loggable_complete == self.num_transactions {
            self.complete();
            // Return here so a complete cannot recurse into done.
            return;
        }

        if self.phase == TerminalPhase::LogBlabbing && self.transactions_to_log.is_empty() {
            self.done();
        }
    }

    fn warm_detector(&mut self, message: &Message) {
        if self.warmup_interval == 0 {
            self.warm(false);
            return;
        }

        assert!(self.warmup_interval >= 2 * message.num_flits());
        self.warmup_flits_received += message.num_flits();
        if self.warmup_flits_received < self.warmup_interval {
            return;
        }
        self.warmup_flits_received %= self.warmup_interval;

        let tally = self.network.enroute_count();
        trace!(
            "{}: enroute msgs={} pkts={} flits={}",
            self.scope,
            tally.messages,
            tally.packets,
            tally.flits
        );

        let window = self.warmup_window as usize;
        if self.enroute_sample_times.len() < window {
            self.enroute_sample_times.push(self.sim.current_time());
            self.enroute_sample_values.push(tally.flits);
        } else {
            self.enroute_sample_times[self.enroute_sample_pos] = self.sim.current_time();
            self.enroute_sample_values[self.enroute_sample_pos] = tally.flits;
            self.enroute_sample_pos = (self.enroute_sample_pos + 1) % window;
        }

        let mut warmed = false;
        let mut saturated = false;

        if self.enroute_sample_times.len() == window {
            // Fast fail: a sample spiking past three times the max of the
            // first full window means the network is saturating.
            match self.fast_fail_sample {
                None => {
                    let max = *self.enroute_sample_values.iter().max().expect("empty window");
                    debug!("{}: fast fail sample = {}", self.scope, max);
                    self.fast_fail_sample = Some(max);
                }
                Some(fast_fail) => {
                    if tally.flits > fast_fail * 3 {
                        debug!("{}: fast fail detected", self.scope);
                        saturated = true;
                    }
                }
            }

            self.warmup_attempts += 1;
            debug!(
                "{}: warmup attempt {} of {}",
                self.scope, self.warmup_attempts, self.max_warmup_attempts
            );
            let growth_rate = slope(&self.enroute_sample_times, &self.enroute_sample_values);
            debug!("{}: growth rate {:e}", self.scope, growth_rate);
            if growth_rate <= 0.0 {
                warmed = true;
            } else if self.warmup_attempts == self.max_warmup_attempts {
                saturated = true;
            }
        }

        if warmed || saturated {
            self.warm(saturated);
        }
    }

    fn warm(&mut self, saturated: bool) {
        self.phase = TerminalPhase::WarmBlabbing;
        if saturated {
            debug!("{}: saturated", self.scope);
            self.notify_application(TERMINAL_SATURATED_EVT);
        } else {
            debug!("{}: warmed", self.scope);
            self.notify_application(TERMINAL_WARMED_EVT);
        }
        self.enroute_sample_times.clear();
        self.enroute_sample_values.clear();
        self.enroute_sample_pos = 0;
    }

    fn complete(&mut self) {
        self.notify_application(TERMINAL_COMPLETE_EVT);
    }

    fn done(&mut self) {
        if !self.notified_done {
            self.notified_done = true;
            self.notify_application(TERMINAL_DONE_EVT);
        }
    }

    /// Aggregation runs in the application's own event frame, so the
    /// notification goes through the queue at the current time.
    fn notify_application(&self, kind: i32) {
        let app = self.app.upgrade().expect("application dropped");
        self.sim
            .schedule(self.sim.current_time(), 0, app, Some(Box::new(self.id)), kind);
    }
}

impl Component for BlastTerminal {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn process_event(&mut self, payload: Option<Box<dyn Any>>, kind: i32) {
        match kind {
            REQUEST_EVT => {
                assert!(payload.is_none());
                if self.phase != TerminalPhase::Draining {
                    self.start_transaction();
                }
            }
            RESPONSE_EVT => {
                let request = payload
                    .expect("response event without the request")
                    .downcast::<Message>()
                    .expect("response payload is not a message");
                self.send_response(*request);
            }
            _ => panic!("{}: unknown event kind {:#x}", self.scope, kind),
        }
    }
}

impl Endpoint for BlastTerminal {
    fn handle_delivered_message(&mut self, message: &Message) {
        if self.phase == TerminalPhase::Warming {
            self.warm_detector(message);
        }

        if message.opcode == REQUEST_MSG {
            // Without responses a delivered request finishes tracking.
            let mut last_of_transaction = false;
            if !self.enable_responses {
                last_of_transaction = self.complete_tracking(message.transaction);
            }

            if self.transactions_to_log.contains(&message.transaction) {
                self.message_log.borrow_mut().log_message(message);
                if !self.enable_responses && last_of_transaction {
                    self.complete_loggable(message.transaction);
                }
            }
        }
    }

    fn handle_received_message(&mut self, message: Message) {
        match message.opcode {
            RESPONSE_MSG => {
                assert!(self.enable_responses);
                let last_of_transaction = self.complete_tracking(message.transaction);
                if self.transactions_to_log.contains(&message.transaction) {
                    self.message_log.borrow_mut().log_message(&message);
                    if last_of_transaction {
                        self.complete_loggable(message.transaction);
                    }
                }
            }
            REQUEST_MSG if self.enable_responses => {
                if self.request_processing_latency == 0 {
                    self.send_response(message);
                } else {
                    let time = self
                        .sim
                        .future_cycle(self.channel_clock, self.request_processing_latency);
                    let target = self.self_ref.upgrade().expect("terminal dropped");
                    self.sim
                        .schedule(time, 0, target, Some(Box::new(message)), RESPONSE_EVT);
                }
            }
            REQUEST_MSG => {
                // Tracking happened on the sender's delivery callback.
            }
            opcode => panic!("{}: unexpected opcode {:#x}", self.scope, opcode),
        }
    }
}

impl BlastTerminal {
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }
}
