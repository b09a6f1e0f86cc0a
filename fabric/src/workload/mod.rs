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

//! Workload coordination.
//!
//! The [`Workload`] trait is what applications report into:
//! `application_ready` once warmup resolves, `application_complete`
//! once logging finishes, `application_done` once everything drains.
//! [`BasicWorkload`] relays those into `start`/`stop`/`kill` calls on
//! the applications and decides global termination. Saturation kills
//! route through [`Workload::terminate`] so the decision is observable
//! without tearing down the process.

pub mod application;
pub mod blast;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::{debug, info};

use crate::component::{Component, Scope};
use crate::config::SimulationConfig;
use crate::error::Error;
use crate::network::{LatencyNetwork, Network};
use crate::sim::Simulator;
use crate::stats::{
    CsvMessageLog, CsvTrafficLog, MessageLog, NullMessageLog, NullTrafficLog, TrafficLog,
};
use crate::Time;

pub use application::{Application, ApplicationPhase};
pub use blast::{BlastTerminal, TerminalPhase};

const APP_START_EVT: i32 = 0x601;
const APP_STOP_EVT: i32 = 0x602;
const APP_KILL_EVT: i32 = 0x603;

/// Why a run was cut short.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminateReason {
    Saturated,
}

pub trait Workload {
    fn application_ready(&mut self, app_id: u32);
    fn application_complete(&mut self, app_id: u32);
    fn application_done(&mut self, app_id: u32);
    /// Stop the run immediately, recording why. Must not call back into
    /// the notifying application.
    fn terminate(&mut self, reason: TerminateReason);
}

/// Monotonic transaction-id allocator and live-transaction table.
///
/// Ids compose the application id, the terminal id, and a per-terminal
/// counter, so an id is never reused within a run.
pub struct TransactionRegistry {
    app_id: u32,
    counts: Vec<u32>,
    active: HashMap<u64, Time>,
}

impl TransactionRegistry {
    pub fn new(app_id: u32, num_terminals: u32) -> Self {
        assert!(app_id < (1 << 8));
        Self {
            app_id,
            counts: vec![0; num_terminals as usize],
            active: HashMap::new(),
        }
    }

    pub fn create(&mut self, terminal: u32, now: Time) -> u64 {
        let count = self.counts[terminal as usize];
        assert!(count < (1 << 24), "terminal {} transaction counter overflow", terminal);
        self.counts[terminal as usize] = count + 1;
        let id =
            ((self.app_id as u64) << 56) | ((terminal as u64) << 24) | (count as u64);
        let previous = self.active.insert(id, now);
        assert!(previous.is_none());
        id
    }

    pub fn end(&mut self, id: u64) {
        let started = self.active.remove(&id);
        assert!(started.is_some(), "transaction {:#x} ended twice", id);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// The standard coordinator: runs its applications to completion and
/// stops the scheduler when every one of them reports done.
pub struct BasicWorkload {
    scope: Scope,
    sim: Rc<Simulator>,
    self_ref: Weak<RefCell<BasicWorkload>>,
    applications: Vec<Rc<RefCell<Application>>>,
    done_applications: u32,
    terminate_reason: Option<TerminateReason>,
}

impl BasicWorkload {
    pub fn build(sim: &Rc<Simulator>, scope: Scope) -> Rc<RefCell<Self>> {
        let workload = Rc::new(RefCell::new(Self {
            scope,
            sim: sim.clone(),
            self_ref: Weak::new(),
            applications: Vec::new(),
            done_applications: 0,
            terminate_reason: None,
        }));
        workload.borrow_mut().self_ref = Rc::downgrade(&workload);
        sim.register_component(&workload);
        workload
    }

    pub fn add_application(&mut self, application: Rc<RefCell<Application>>) {
        self.applications.push(application);
    }

    pub fn num_applications(&self) -> u32 {
        self.applications.len() as u32
    }

    pub fn application(&self, id: u32) -> &Rc<RefCell<Application>> {
        &self.applications[id as usize]
    }

    pub fn is_done(&self) -> bool {
        !self.applications.is_empty()
            && self.done_applications == self.applications.len() as u32
    }

    pub fn terminate_reason(&self) -> Option<TerminateReason> {
        self.terminate_reason
    }

    pub fn percent_complete(&self) -> f64 {
        if self.applications.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .applications
            .iter()
            .map(|a| a.borrow().percent_complete())
            .sum();
        sum / self.applications.len() as f64
    }

    /// Notifications arrive in an application's event frame, so the
    /// matching start/stop/kill call goes through the queue.
    fn schedule_for(&self, app_id: u32, kind: i32) {
        let target = self.self_ref.upgrade().expect("workload dropped");
        self.sim.schedule(
            self.sim.current_time(),
            0,
            target,
            Some(Box::new(app_id)),
            kind,
        );
    }
}

impl Workload for BasicWorkload {
    fn application_ready(&mut self, app_id: u32) {
        info!("{}: application {} is ready", self.scope, app_id);
        self.schedule_for(app_id, APP_START_EVT);
    }

    fn application_complete(&mut self, app_id: u32) {
        info!("{}: application {} is complete", self.scope, app_id);
        self.schedule_for(app_id, APP_STOP_EVT);
    }

    fn application_done(&mut self, app_id: u32) {
        info!("{}: application {} is done", self.scope, app_id);
        self.done_applications += 1;
        assert!(self.done_applications <= self.applications.len() as u32);
        if self.is_done() {
            // Stop all injection; the scheduler finishes once the last
            // in-flight messages drain.
            for id in 0..self.applications.len() as u32 {
                self.schedule_for(id, APP_KILL_EVT);
            }
        }
    }

    fn terminate(&mut self, reason: TerminateReason) {
        info!("{}: terminating ({:?})", self.scope, reason);
        self.terminate_reason = Some(reason);
        self.sim.exit();
    }
}

impl Component for BasicWorkload {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn process_event(&mut self, payload: Option<Box<dyn Any>>, kind: i32) {
        let app_id = *payload
            .expect("workload event without an application id")
            .downcast::<u32>()
            .expect("workload payload is not an application id");
        let application = self.applications[app_id as usize].clone();
        match kind {
            APP_START_EVT => {
                let already_complete = application.borrow_mut().start();
                if already_complete {
                    self.application_complete(app_id);
                }
            }
            APP_STOP_EVT => {
                let already_done = application.borrow_mut().stop();
                if already_done {
                    self.application_done(app_id);
                }
            }
            APP_KILL_EVT => {
                application.borrow_mut().kill();
            }
            _ => panic!("{}: unknown event kind {:#x}", self.scope, kind),
        }
    }
}

/// What a finished run looked like.
#[derive(Debug)]
pub struct RunSummary {
    pub events_executed: u64,
    pub end_time: Time,
    pub percent_complete: f64,
    pub terminated: Option<TerminateReason>,
}

/// Drive the scheduler until the workload resolves.
///
/// A queue that drains while the workload is still active is premature
/// quiescence and reported as an error.
pub fn run_workload(
    sim: &Rc<Simulator>,
    workload: &Rc<RefCell<BasicWorkload>>,
) -> Result<RunSummary, Error> {
    let events_executed = sim.run();
    let workload = workload.borrow();
    let summary = RunSummary {
        events_executed,
        end_time: sim.current_time(),
        percent_complete: workload.percent_complete(),
        terminated: workload.terminate_reason(),
    };
    if summary.terminated.is_none() {
        if !workload.is_done() {
            return Err(Error::PrematureQuiescence);
        }
        for application in &workload.applications {
            application.borrow().assert_drained();
        }
    }
    debug!(
        "run finished at {}ps after {} events",
        summary.end_time, summary.events_executed
    );
    Ok(summary)
}

/// Assemble a full simulation from configuration: clocks, network,
/// workload, and one application with a terminal per interface.
pub fn build_simulation(
    config: &SimulationConfig,
) -> Result<(Rc<Simulator>, Rc<dyn Network>, Rc<RefCell<BasicWorkload>>), Error> {
    let message_log: Rc<RefCell<dyn MessageLog>> = match &config.message_log {
        Some(path) => Rc::new(RefCell::new(CsvMessageLog::create(path)?)),
        None => Rc::new(RefCell::new(NullMessageLog)),
    };
    let traffic_log: Rc<RefCell<dyn TrafficLog>> = match &config.traffic_log {
        Some(path) => Rc::new(RefCell::new(CsvTrafficLog::create(path)?)),
        None => Rc::new(RefCell::new(NullTrafficLog)),
    };
    build_simulation_with_logs(config, message_log, traffic_log)
}

/// [`build_simulation`] with caller-supplied statistics sinks, which is
/// how tests observe a run.
pub fn build_simulation_with_logs(
    config: &SimulationConfig,
    message_log: Rc<RefCell<dyn MessageLog>>,
    traffic_log: Rc<RefCell<dyn TrafficLog>>,
) -> Result<(Rc<Simulator>, Rc<dyn Network>, Rc<RefCell<BasicWorkload>>), Error> {
    let sim = Simulator::new(config.seed);
    if config.clocks.is_empty() {
        return Err(Error::InvalidSetting("no clock domains configured".into()));
    }
    for (name, period) in &config.clocks {
        if *period == 0 {
            return Err(Error::InvalidSetting(format!(
                "clock '{}' must have a nonzero period",
                name
            )));
        }
        sim.register_clock(name, *period);
    }

    let top = Scope::root("sim");
    let network: Rc<dyn Network> =
        LatencyNetwork::new(&sim, &config.network, traffic_log, &top.child("network"))?;
    let workload = BasicWorkload::build(&sim, top.child("workload"));
    let workload_dyn: Rc<RefCell<dyn Workload>> = workload.clone();
    let workload_ref: Weak<RefCell<dyn Workload>> = Rc::downgrade(&workload_dyn);
    let application = Application::build(
        &sim,
        &network,
        workload_ref,
        message_log,
        &config.application,
        0,
        top.child("application_0"),
    )?;
    workload.borrow_mut().add_application(application);

    Ok((sim, network, workload))
}
