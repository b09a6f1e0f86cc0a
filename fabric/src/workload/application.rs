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

//! Cluster-wide workload aggregation.
//!
//! One application owns a blast terminal per network interface and
//! folds their warm/saturate/complete/done notifications into a single
//! phase machine:
//!
//! `Warming -> Logging -> Blabbing -> Draining`
//!
//! Saturation may bypass `Logging` (drain policy) or cut logging short
//! (`MaxSaturation` timeout). Terminal notifications arrive through the
//! event queue at the current time, so an application handler is free
//! to fan out to every terminal, including the notifier.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::clock::{ClockId, TERMINAL_CLOCK};
use crate::component::{Component, Scope};
use crate::config::ApplicationConfig;
use crate::error::Error;
use crate::network::Network;
use crate::sim::Simulator;
use crate::stats::MessageLog;
use crate::workload::blast::BlastTerminal;
use crate::workload::{TerminateReason, TransactionRegistry, Workload};

pub(crate) const FORCE_WARMED_EVT: i32 = 0x123;
pub(crate) const MAX_SATURATION_EVT: i32 = 0x456;
pub(crate) const TERMINAL_WARMED_EVT: i32 = 0x501;
pub(crate) const TERMINAL_SATURATED_EVT: i32 = 0x502;
pub(crate) const TERMINAL_COMPLETE_EVT: i32 = 0x503;
pub(crate) const TERMINAL_DONE_EVT: i32 = 0x504;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApplicationPhase {
    Warming,
    Logging,
    Blabbing,
    Draining,
}

pub struct Application {
    scope: Scope,
    sim: Rc<Simulator>,
    workload: Weak<RefCell<dyn Workload>>,
    self_ref: Weak<RefCell<Application>>,
    terminal_clock: ClockId,

    id: u32,
    kill_on_saturation: bool,
    log_during_saturation: bool,
    max_saturation_cycles: u64,
    warmup_threshold: f64,

    terminals: Vec<Rc<RefCell<BlastTerminal>>>,
    registry: Rc<RefCell<TransactionRegistry>>,

    phase: ApplicationPhase,
    do_logging: bool,
    active_terminals: u32,
    warmed_terminals: u32,
    saturated_terminals: u32,
    completed_terminals: u32,
    done_terminals: u32,
}

impl Application {
    pub fn build(
        sim: &Rc<Simulator>,
        network: &Rc<dyn Network>,
        workload: Weak<RefCell<dyn Workload>>,
        message_log: Rc<RefCell<dyn MessageLog>>,
        config: &ApplicationConfig,
        id: u32,
        scope: Scope,
    ) -> Result<Rc<RefCell<Self>>, Error> {
        if !(0.0..=1.0).contains(&config.warmup_threshold) {
            return Err(Error::InvalidSetting(format!(
                "warmup_threshold {} outside [0, 1]",
                config.warmup_threshold
            )));
        }
        let max_saturation_cycles = if config.log_during_saturation {
            config.max_saturation_cycles.ok_or_else(|| {
                Error::InvalidSetting(
                    "log_during_saturation needs max_saturation_cycles".to_string(),
                )
            })?
        } else {
            config.max_saturation_cycles.unwrap_or(0)
        };
        let terminal_clock = sim.clock(TERMINAL_CLOCK).ok_or_else(|| {
            Error::InvalidSetting(format!("no '{}' clock registered", TERMINAL_CLOCK))
        })?;

        let num_terminals = network.num_interfaces();
        let registry = Rc::new(RefCell::new(TransactionRegistry::new(id, num_terminals)));

        let app = Rc::new(RefCell::new(Self {
            scope: scope.clone(),
            sim: sim.clone(),
            workload,
            self_ref: Weak::new(),
            terminal_clock,
            id,
            kill_on_saturation: config.kill_on_saturation,
            log_during_saturation: config.log_during_saturation,
            max_saturation_cycles,
            warmup_threshold: config.warmup_threshold,
            terminals: Vec::with_capacity(num_terminals as usize),
            registry: registry.clone(),
            phase: ApplicationPhase::Warming,
            do_logging: false,
            active_terminals: num_terminals,
            warmed_terminals: 0,
            saturated_terminals: 0,
            completed_terminals: 0,
            done_terminals: 0,
        }));
        app.borrow_mut().self_ref = Rc::downgrade(&app);
        sim.register_component(&app);

        for t in 0..num_terminals {
            let terminal = BlastTerminal::build(
                sim,
                network,
                message_log.clone(),
                registry.clone(),
                Rc::downgrade(&app),
                t,
                &config.blast_terminal,
                scope.child(format!("terminal_{}", t)),
            )?;
            network.register_endpoint(t, terminal.clone());
            if terminal.borrow().request_injection_rate() == 0.0 {
                app.borrow_mut().active_terminals -= 1;
            }
            app.borrow_mut().terminals.push(terminal);
        }
        debug!(
            "{}: {} active terminals",
            scope,
            app.borrow().active_terminals
        );

        // With no warmup requirement, logging starts at t=0.
        if config.warmup_threshold == 0.0 {
            sim.schedule(0, 0, app.clone(), None, FORCE_WARMED_EVT);
        }

        Ok(app)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn phase(&self) -> ApplicationPhase {
        self.phase
    }

    pub fn num_terminals(&self) -> u32 {
        self.terminals.len() as u32
    }

    pub fn terminal(&self, id: u32) -> &Rc<RefCell<BlastTerminal>> {
        &self.terminals[id as usize]
    }

    /// Mean progress over the active terminals.
    pub fn percent_complete(&self) -> f64 {
        if self.active_terminals == 0 {
            return 1.0;
        }
        let sum: f64 = self
            .terminals
            .iter()
            .map(|t| t.borrow().percent_complete())
            .sum();
        sum / self.active_terminals as f64
    }

    /// The workload turns `application_ready` into this call.
    /// Returns true when there is nothing to log and the application is
    /// complete straight away.
    pub fn start(&mut self) -> bool {
        for terminal in &self.terminals {
            let mut terminal = terminal.borrow_mut();
            if self.do_logging {
                terminal.start_logging();
            } else {
                terminal.stop_sending();
            }
        }
        !self.do_logging
    }

    /// The workload turns `application_complete` into this call.
    /// Returns true when the application is already done.
    pub fn stop(&mut self) -> bool {
        if self.phase == ApplicationPhase::Warming {
            // Stopping an application that never started logging has
            // nothing to wind down.
            warn!("{}: stop() while still warming ignored", self.scope);
            return false;
        }
        if self.do_logging {
            for terminal in &self.terminals {
                terminal.borrow_mut().stop_logging();
            }
            false
        } else {
            true
        }
    }

    /// Force every terminal to stop sending so the network drains.
    pub fn kill(&mut self) {
        if self.do_logging {
            for terminal in &self.terminals {
                terminal.borrow_mut().stop_sending();
            }
        }
    }

    fn terminal_warmed(&mut self, id: Option<u32>) {
        if self.phase != ApplicationPhase::Warming {
            // A notification queued before the phase changed.
            return;
        }
        if let Some(id) = id {
            self.warmed_terminals += 1;
            debug!(
                "{}: terminal {} is warmed ({} of {})",
                self.scope, id, self.warmed_terminals, self.active_terminals
            );
        }
        assert!(self.warmed_terminals + self.saturated_terminals <= self.active_terminals);
        if self.warmed_terminals as f64 >= self.warmup_threshold * self.active_terminals as f64 {
            debug!("{}: warmup threshold {} reached", self.scope, self.warmup_threshold);
            self.phase = ApplicationPhase::Logging;
            self.do_logging = true;
            for terminal in &self.terminals {
                terminal.borrow_mut().stop_warming();
            }
            self.notify_ready();
        }
    }

    fn terminal_saturated(&mut self, id: u32) {
        if self.phase != ApplicationPhase::Warming {
            return;
        }
        self.saturated_terminals += 1;
        debug!(
            "{}: terminal {} is saturated ({} of {})",
            self.scope, id, self.saturated_terminals, self.active_terminals
        );
        assert!(self.warmed_terminals + self.saturated_terminals <= self.active_terminals);

        // Saturation must strictly exceed the complement of the warmup
        // threshold.
        let saturation_threshold = 1.0 - self.warmup_threshold;
        if self.saturated_terminals as f64 > saturation_threshold * self.active_terminals as f64 {
            if self.kill_on_saturation {
                debug!(
                    "{}: saturation threshold {} reached, terminating",
                    self.scope, saturation_threshold
                );
                let workload = self.workload.upgrade().expect("workload dropped");
                workload.borrow_mut().terminate(TerminateReason::Saturated);
            } else if self.log_during_saturation {
                debug!(
                    "{}: saturation threshold {} reached, logging anyway",
                    self.scope, saturation_threshold
                );
                self.phase = ApplicationPhase::Logging;
                self.do_logging = true;
                for terminal in &self.terminals {
                    terminal.borrow_mut().stop_warming();
                }
                self.notify_ready();

                // Bound how long the logging phase may run saturated.
                let timeout = self
                    .sim
                    .future_cycle(self.terminal_clock, self.max_saturation_cycles);
                debug!(
                    "{}: saturation cutoff at {}ps (now {}ps)",
                    self.scope,
                    timeout,
                    self.sim.current_time()
                );
                let target = self.self_ref.upgrade().expect("application dropped");
                self.sim.schedule(timeout, 0, target, None, MAX_SATURATION_EVT);
            } else {
                debug!(
                    "{}: saturation threshold {} reached, draining",
                    self.scope, saturation_threshold
                );
                self.phase = ApplicationPhase::Draining;
                self.do_logging = false;
                for terminal in &self.terminals {
                    terminal.borrow_mut().stop_warming();
                }
                self.notify_ready();
            }
        }
    }

    fn terminal_complete(&mut self, id: u32) {
        self.completed_terminals += 1;
        debug!(
            "{}: terminal {} is done logging ({} of {})",
            self.scope, id, self.completed_terminals, self.active_terminals
        );
        assert!(self.completed_terminals <= self.active_terminals);
        if self.completed_terminals == self.active_terminals
            && self.phase == ApplicationPhase::Logging
        {
            debug!("{}: all terminals are done logging", self.scope);
            self.phase = ApplicationPhase::Blabbing;
            let workload = self.workload.upgrade().expect("workload dropped");
            workload.borrow_mut().application_complete(self.id);
        }
    }

    fn terminal_done(&mut self, id: u32) {
        self.done_terminals += 1;
        debug!(
            "{}: terminal {} is done sending ({} of {})",
            self.scope, id, self.done_terminals, self.active_terminals
        );
        assert!(self.done_terminals <= self.active_terminals);
        if self.done_terminals == self.active_terminals {
            debug!("{}: all terminals are done sending", self.scope);
            self.phase = ApplicationPhase::Draining;
            let workload = self.workload.upgrade().expect("workload dropped");
            workload.borrow_mut().application_done(self.id);
        }
    }

    fn notify_ready(&self) {
        let workload = self.workload.upgrade().expect("workload dropped");
        workload.borrow_mut().application_ready(self.id);
    }

    /// A cleanly finished run leaves no transaction outstanding.
    pub fn assert_drained(&self) {
        for terminal in &self.terminals {
            let terminal = terminal.borrow();
            assert_eq!(
                terminal.outstanding_count(),
                0,
                "{}: outstanding transactions after drain",
                terminal.scope()
            );
        }
        assert_eq!(self.registry.borrow().active_count(), 0);
    }
}

impl Component for Application {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn process_event(&mut self, payload: Option<Box<dyn Any>>, kind: i32) {
        let terminal_id = |payload: Option<Box<dyn Any>>| -> u32 {
            *payload
                .expect("terminal notification without an id")
                .downcast::<u32>()
                .expect("notification payload is not a terminal id")
        };
        match kind {
            FORCE_WARMED_EVT => self.terminal_warmed(None),
            MAX_SATURATION_EVT => {
                if self.phase == ApplicationPhase::Logging {
                    debug!("{}: max saturation time reached", self.scope);
                    self.phase = ApplicationPhase::Blabbing;
                    let workload = self.workload.upgrade().expect("workload dropped");
                    workload.borrow_mut().application_complete(self.id);
                }
            }
            TERMINAL_WARMED_EVT => {
                let id = terminal_id(payload);
                self.terminal_warmed(Some(id));
            }
            TERMINAL_SATURATED_EVT => {
                let id = terminal_id(payload);
                self.terminal_saturated(id);
            }
            TERMINAL_COMPLETE_EVT => {
                let id = terminal_id(payload);
                self.terminal_complete(id);
            }
            TERMINAL_DONE_EVT => {
                let id = terminal_id(payload);
                self.terminal_done(id);
            }
            _ => panic!("{}: unknown event kind {:#x}", self.scope, kind),
        }
    }
}
