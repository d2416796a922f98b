//! Hosting an environment for sensors and actuators.
//!
//! The environment itself is a plain trait object. [`EnvironmentHost`] owns it
//! on a dedicated thread, and sensors and actuators reach it through cloneable
//! [`EnvironmentRef`]s with a request/response exchange per call.

use crate::error::RuntimeError;
use crate::genotype::UnitId;
use crate::message::Feedback;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// What an agent senses and acts upon
pub trait Environment: Send {
    /// Produce `vl` values for `sensor`.
    fn sense(&mut self, sensor: UnitId, name: &str, vl: usize) -> Vec<f64>;

    /// Apply `output` and return the fitness contribution and halt tag.
    fn act(&mut self, actuator: UnitId, name: &str, output: &[f64]) -> Feedback;
}

#[derive(Debug)]
enum EnvRequest {
    Sense {
        sensor: UnitId,
        name: String,
        vl: usize,
        reply: Sender<Vec<f64>>,
    },
    Act {
        actuator: UnitId,
        name: String,
        output: Vec<f64>,
        reply: Sender<Feedback>,
    },
    Shutdown,
}

/// Handle sensors and actuators use to call the environment
#[derive(Debug, Clone)]
pub struct EnvironmentRef {
    tx: Sender<EnvRequest>,
}

impl EnvironmentRef {
    pub fn sense(&self, sensor: UnitId, name: &str, vl: usize) -> Result<Vec<f64>, RuntimeError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(EnvRequest::Sense {
                sensor,
                name: name.to_string(),
                vl,
                reply,
            })
            .map_err(|_| RuntimeError::EnvironmentGone)?;
        rx.recv().map_err(|_| RuntimeError::EnvironmentGone)
    }

    pub fn act(&self, actuator: UnitId, name: &str, output: Vec<f64>) -> Result<Feedback, RuntimeError> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(EnvRequest::Act {
                actuator,
                name: name.to_string(),
                output,
                reply,
            })
            .map_err(|_| RuntimeError::EnvironmentGone)?;
        rx.recv().map_err(|_| RuntimeError::EnvironmentGone)
    }
}

/// Owns an environment on its own thread
pub struct EnvironmentHost {
    thread: Option<JoinHandle<()>>,
    tx: Sender<EnvRequest>,
}

impl EnvironmentHost {
    pub fn spawn<E: Environment + 'static>(environment: E) -> Result<Self, RuntimeError> {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("environment".to_string())
            .spawn(move || serve(Box::new(environment), rx))
            .map_err(|source| RuntimeError::Spawn {
                unit: "environment".to_string(),
                source,
            })?;
        Ok(Self {
            thread: Some(thread),
            tx,
        })
    }

    pub fn handle(&self) -> EnvironmentRef {
        EnvironmentRef { tx: self.tx.clone() }
    }

    /// Stop serving requests and join the thread.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(EnvRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("environment thread panicked");
            }
        }
    }
}

impl Drop for EnvironmentHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(mut environment: Box<dyn Environment>, rx: Receiver<EnvRequest>) {
    while let Ok(request) = rx.recv() {
        match request {
            EnvRequest::Sense {
                sensor,
                name,
                vl,
                reply,
            } => {
                let _ = reply.send(environment.sense(sensor, &name, vl));
            }
            EnvRequest::Act {
                actuator,
                name,
                output,
                reply,
            } => {
                let _ = reply.send(environment.act(actuator, &name, &output));
            }
            EnvRequest::Shutdown => break,
        }
    }
    log::debug!("environment host stopped");
}
