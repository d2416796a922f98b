//! Cortex: the per-agent tick coordinator.
//!
//! The cortex starts every tick by syncing all sensors and closes it once each
//! actuator has reported exactly once. A closed tick with any non-continue
//! halt tag ends the episode; the cortex then goes quiet until reactivated.
//!
//! Fitness and cycle counts are cumulative since the last activation.

use crate::genotype::{OpMode, UnitId};
use crate::message::{
    ActuatorMsg, ActuatorReport, CortexEvent, CortexMsg, CortexStatus, Endpoint, EpisodeSummary,
    HaltSignal, SensorMsg,
};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CortexState {
    Uninitialized,
    Active,
    /// Episode finished; waiting for reactivation
    Inactive,
    Terminated,
}

pub struct Cortex {
    agent: u64,
    op_mode: OpMode,
    state: CortexState,
    sensors: Vec<(UnitId, Sender<SensorMsg>)>,
    actuators: Vec<(UnitId, Sender<ActuatorMsg>)>,
    /// Neurons or the substrate; only addressed on stop
    units: Vec<Endpoint>,
    controller: Sender<CortexEvent>,
    reports: HashMap<UnitId, ActuatorReport>,
    /// Ticks closed since activation
    cycle: u64,
    fitness: Vec<f64>,
    started: Instant,
}

impl Cortex {
    pub fn new(
        agent: u64,
        op_mode: OpMode,
        sensors: Vec<(UnitId, Sender<SensorMsg>)>,
        actuators: Vec<(UnitId, Sender<ActuatorMsg>)>,
        units: Vec<Endpoint>,
        controller: Sender<CortexEvent>,
    ) -> Self {
        Self {
            agent,
            op_mode,
            state: CortexState::Uninitialized,
            sensors,
            actuators,
            units,
            controller,
            reports: HashMap::new(),
            cycle: 0,
            fitness: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> CortexState {
        self.state
    }

    pub fn status(&self) -> CortexStatus {
        CortexStatus {
            state: self.state,
            cycles: self.cycle,
            pending_reports: self.reports.len(),
        }
    }

    /// Enter `Active` from `Uninitialized` or `Inactive` and start tick 1.
    pub fn activate(&mut self) {
        if !matches!(self.state, CortexState::Uninitialized | CortexState::Inactive) {
            log::warn!("cortex {}: activation ignored while {:?}", self.agent, self.state);
            return;
        }
        self.cycle = 0;
        self.fitness.clear();
        self.reports.clear();
        self.started = Instant::now();
        self.state = CortexState::Active;

        // Actuators restart their count before any tick-1 output can reach them
        for (_, tx) in &self.actuators {
            let _ = tx.send(ActuatorMsg::Rewind);
        }
        log::debug!("cortex {}: active ({:?})", self.agent, self.op_mode);
        self.sync();
    }

    pub fn reactivate(&mut self, controller: Option<Sender<CortexEvent>>) {
        if self.state != CortexState::Inactive {
            log::warn!("cortex {}: reactivate ignored while {:?}", self.agent, self.state);
            return;
        }
        if let Some(controller) = controller {
            self.controller = controller;
        }
        self.activate();
    }

    fn sync(&self) {
        let cycle = self.cycle + 1;
        for (id, tx) in &self.sensors {
            if tx.send(SensorMsg::Sync { cycle }).is_err() {
                log::debug!("cortex {}: sensor {} is gone", self.agent, id);
            }
        }
    }

    pub fn report(&mut self, report: ActuatorReport) {
        if self.state != CortexState::Active {
            log::warn!(
                "cortex {}: report from {} ignored while {:?}",
                self.agent,
                report.from,
                self.state
            );
            return;
        }
        if !self.actuators.iter().any(|(id, _)| *id == report.from) {
            log::warn!("cortex {}: report from unknown unit {}", self.agent, report.from);
            return;
        }
        if report.cycle != self.cycle + 1 {
            log::warn!(
                "cortex {}: stale report from {} for cycle {} (open cycle {})",
                self.agent,
                report.from,
                report.cycle,
                self.cycle + 1
            );
            return;
        }
        if self.reports.contains_key(&report.from) {
            log::warn!("cortex {}: duplicate report from {}", self.agent, report.from);
            return;
        }

        self.reports.insert(report.from, report);
        if self.reports.len() == self.actuators.len() {
            self.close_tick();
        }
    }

    fn close_tick(&mut self) {
        let mut halted = false;
        let mut goal = false;
        for (id, _) in &self.actuators {
            let Some(report) = self.reports.get(id) else {
                continue;
            };
            if self.fitness.len() < report.fitness.len() {
                self.fitness.resize(report.fitness.len(), 0.0);
            }
            for (total, f) in self.fitness.iter_mut().zip(&report.fitness) {
                *total += f;
            }
            halted |= !report.halt.is_continue();
            goal |= report.halt == HaltSignal::Goal;
        }
        self.reports.clear();
        self.cycle += 1;
        log::trace!("cortex {}: closed cycle {}", self.agent, self.cycle);

        if !halted {
            self.sync();
            return;
        }

        self.state = CortexState::Inactive;
        let summary = EpisodeSummary {
            agent: self.agent,
            op_mode: self.op_mode,
            fitness: self.fitness.clone(),
            cycles: self.cycle,
            elapsed: self.started.elapsed(),
            goal_reached: goal,
        };
        log::debug!(
            "cortex {}: episode complete after {} cycles, fitness {:?}",
            self.agent,
            summary.cycles,
            summary.fitness
        );
        if self.controller.send(CortexEvent::EpisodeComplete(summary)).is_err() {
            log::debug!("cortex {}: controller is gone", self.agent);
        }
    }

    /// Stop every owned unit and terminate; valid from any state.
    pub fn stop(&mut self) {
        if self.state == CortexState::Terminated {
            return;
        }
        for (_, tx) in &self.sensors {
            let _ = tx.send(SensorMsg::Stop);
        }
        for unit in &self.units {
            unit.stop();
        }
        for (_, tx) in &self.actuators {
            let _ = tx.send(ActuatorMsg::Stop);
        }
        self.state = CortexState::Terminated;
        self.reports.clear();
        let _ = self.controller.send(CortexEvent::Terminated { agent: self.agent });
        log::debug!("cortex {}: terminated", self.agent);
    }

    /// Returns false once the cortex has terminated.
    pub fn handle(&mut self, msg: CortexMsg) -> bool {
        match msg {
            CortexMsg::Report(report) => self.report(report),
            CortexMsg::Reactivate(controller) => self.reactivate(controller),
            CortexMsg::Status(reply) => {
                let _ = reply.send(self.status());
            }
            CortexMsg::Stop => self.stop(),
        }
        self.state != CortexState::Terminated
    }

    /// Activate, then serve the inbox until stopped.
    pub fn run(mut self, inbox: Receiver<CortexMsg>) {
        self.activate();
        while let Ok(msg) = inbox.recv() {
            if !self.handle(msg) {
                break;
            }
        }
        // Every handle dropped without an explicit stop
        self.stop();
    }
}
