//! Integration tests for TWEANN

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use tweann::agent::{AgentNetwork, CortexState, Environment, EnvironmentHost};
use tweann::genotype::{ActuatorGene, Body, InputGene, NeuronGene, SensorGene};
use tweann::message::{CortexEvent, EpisodeSummary, Feedback, HaltSignal};
use tweann::substrate::{CepExpression, CppEncoding, Density, Format, LinkTopology, PlasticityMode, SubstrateGene};
use tweann::{Activation, Aggregator, Config, Genotype, Plasticity, Tuner, TuningDuration, TuningSelection, UnitId};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Constant input; every actuator halts after `length` actions with `halt`
struct Scripted {
    input: f64,
    length: u64,
    halt: HaltSignal,
    acted: HashMap<UnitId, u64>,
    outputs: Arc<Mutex<Vec<f64>>>,
}

impl Scripted {
    fn new(length: u64, halt: HaltSignal) -> Self {
        Self {
            input: 0.5,
            length,
            halt,
            acted: HashMap::new(),
            outputs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Environment for Scripted {
    fn sense(&mut self, _sensor: UnitId, _name: &str, vl: usize) -> Vec<f64> {
        vec![self.input; vl]
    }

    fn act(&mut self, actuator: UnitId, _name: &str, output: &[f64]) -> Feedback {
        self.outputs.lock().unwrap().extend_from_slice(output);
        let acted = self.acted.entry(actuator).or_insert(0);
        *acted += 1;
        let halt = if *acted % self.length == 0 {
            self.halt
        } else {
            HaltSignal::Continue
        };
        Feedback::new(1.0 + output.iter().sum::<f64>(), halt)
    }
}

fn seeded_config(seed: u64) -> Config {
    let mut config = Config::default();
    config.runtime.seed = Some(seed);
    config
}

fn dense(agent: u64, actuators: &[(&str, usize)]) -> Genotype {
    let mut rng = ChaCha8Rng::seed_from_u64(agent);
    Genotype::dense(agent, &[("in", 3)], &[4], actuators, Activation::Tanh, &mut rng)
}

fn episode(events: &Receiver<CortexEvent>) -> EpisodeSummary {
    match events.recv().expect("cortex hung up") {
        CortexEvent::EpisodeComplete(summary) => summary,
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_full_episode() {
    init_logging();
    let host = EnvironmentHost::spawn(Scripted::new(5, HaltSignal::Goal)).unwrap();
    let (mut network, events) =
        AgentNetwork::spawn(dense(1, &[("out", 1)]), host.handle(), &seeded_config(1)).unwrap();

    let summary = episode(&events);
    assert_eq!(summary.agent, 1);
    assert_eq!(summary.cycles, 5);
    assert!(summary.goal_reached);
    assert_eq!(summary.fitness.len(), 1);

    let status = network.status().unwrap();
    assert_eq!(status.state, CortexState::Inactive);
    assert_eq!(status.cycles, 5);
    assert_eq!(status.pending_reports, 0);

    network.stop().unwrap();
    assert!(matches!(events.recv(), Ok(CortexEvent::Terminated { agent: 1 })));
}

#[test]
fn test_multiple_actuators_close_ticks_together() {
    init_logging();
    let env = Scripted::new(4, HaltSignal::Timeout);
    let outputs = env.outputs.clone();
    let host = EnvironmentHost::spawn(env).unwrap();
    let (mut network, events) = AgentNetwork::spawn(
        dense(2, &[("left", 1), ("right", 2)]),
        host.handle(),
        &seeded_config(2),
    )
    .unwrap();

    let summary = episode(&events);
    assert_eq!(summary.cycles, 4);
    assert!(!summary.goal_reached);

    // Both actuators acted on every tick; fitness adds up across them
    let acted = outputs.lock().unwrap().clone();
    assert_eq!(acted.len(), 4 * 3);
    let expected: f64 = 8.0 + acted.iter().sum::<f64>();
    assert!((summary.total_fitness() - expected).abs() < 1e-9);
    network.stop().unwrap();
}

#[test]
fn test_reactivate_restarts_counts() {
    init_logging();
    let host = EnvironmentHost::spawn(Scripted::new(3, HaltSignal::Failure)).unwrap();
    let (network, events) =
        AgentNetwork::spawn(dense(3, &[("out", 1)]), host.handle(), &seeded_config(3)).unwrap();

    let first = episode(&events);
    network.reset().unwrap();
    network.reactivate().unwrap();
    let second = episode(&events);

    assert_eq!(first.cycles, 3);
    assert_eq!(second.cycles, 3);
    assert_eq!(first.fitness, second.fitness);
}

#[test]
fn test_reactivate_with_new_controller() {
    init_logging();
    let host = EnvironmentHost::spawn(Scripted::new(2, HaltSignal::Goal)).unwrap();
    let (network, events) =
        AgentNetwork::spawn(dense(4, &[("out", 1)]), host.handle(), &seeded_config(4)).unwrap();
    episode(&events);

    let (tx, rx) = std::sync::mpsc::channel();
    network.reset().unwrap();
    network.reactivate_with(tx).unwrap();
    assert_eq!(episode(&rx).cycles, 2);
    assert!(events.try_recv().is_err());
}

/// One neuron reading a sensor and its own previous output
fn self_recurrent() -> Genotype {
    let neuron = NeuronGene {
        id: UnitId::Neuron(1),
        generation: 0,
        activation: Activation::Tanh,
        aggregation: Aggregator::DotProduct,
        plasticity: Plasticity::None,
        inputs: vec![
            InputGene::new(UnitId::Sensor(1), vec![1.0]),
            InputGene::new(UnitId::Neuron(1), vec![1.0]).recurrent(),
        ],
        bias: None,
        modulatory: Vec::new(),
        outputs: vec![UnitId::Actuator(1)],
        recurrent_outputs: vec![UnitId::Neuron(1)],
    };
    Genotype {
        agent: 5,
        generation: 0,
        heredity: Default::default(),
        op_mode: Default::default(),
        sensors: vec![SensorGene {
            id: UnitId::Sensor(1),
            name: "in".to_string(),
            vl: 1,
            format: Format::Unstructured,
            fanout: vec![UnitId::Neuron(1)],
        }],
        actuators: vec![ActuatorGene {
            id: UnitId::Actuator(1),
            name: "out".to_string(),
            vl: 1,
            format: Format::Unstructured,
            fanin: vec![UnitId::Neuron(1)],
        }],
        body: Body::Neural {
            neurons: vec![neuron],
        },
    }
}

#[test]
fn test_recurrent_state_cleared_by_reset() {
    init_logging();
    let env = Scripted::new(3, HaltSignal::Timeout);
    let outputs = env.outputs.clone();
    let host = EnvironmentHost::spawn(env).unwrap();
    let (network, events) = AgentNetwork::spawn(self_recurrent(), host.handle(), &seeded_config(5)).unwrap();

    episode(&events);
    let o1 = 0.5f64.tanh();
    let o2 = (0.5 + o1).tanh();
    let o3 = (0.5 + o2).tanh();
    {
        let seen = outputs.lock().unwrap();
        assert_eq!(seen.len(), 3);
        for (got, want) in seen.iter().zip([o1, o2, o3]) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    network.reset().unwrap();
    network.reactivate().unwrap();
    episode(&events);
    let seen = outputs.lock().unwrap();
    assert_eq!(seen.len(), 6);
    assert!((seen[3] - o1).abs() < 1e-12);
}

#[test]
fn test_plastic_weights_roll_back() {
    init_logging();
    let mut genotype = dense(6, &[("out", 1)]);
    if let Body::Neural { neurons } = &mut genotype.body {
        for neuron in neurons.iter_mut() {
            neuron.plasticity = Plasticity::Hebbian { eta: 0.2 };
        }
    }
    let host = EnvironmentHost::spawn(Scripted::new(3, HaltSignal::Timeout)).unwrap();
    let (network, events) = AgentNetwork::spawn(genotype, host.handle(), &seeded_config(6)).unwrap();
    let ids = network.tunable_ids();

    let first = episode(&events);
    let learned = network.weights(ids[0]).unwrap();
    // The snapshot holds the weights the scored episode started from
    network.backup(&ids).unwrap();
    network.restore(&ids).unwrap();
    let start = network.weights(ids[0]).unwrap();
    assert_ne!(start, learned);

    network.reset().unwrap();
    network.reactivate().unwrap();
    let second = episode(&events);
    assert_eq!(first.fitness, second.fitness);
    assert_eq!(network.weights(ids[0]).unwrap(), learned);

    network.restore(&ids).unwrap();
    assert_eq!(network.weights(ids[0]).unwrap(), start);
    network.reset().unwrap();
    network.reactivate().unwrap();
    let third = episode(&events);
    assert_eq!(first.fitness, third.fitness);
}

#[test]
fn test_stop_mid_episode() {
    init_logging();
    let host = EnvironmentHost::spawn(Scripted::new(u64::MAX, HaltSignal::Goal)).unwrap();
    let (mut network, events) =
        AgentNetwork::spawn(dense(7, &[("out", 1)]), host.handle(), &seeded_config(7)).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    network.stop().unwrap();
    let terminated = events
        .iter()
        .any(|event| matches!(event, CortexEvent::Terminated { agent: 7 }));
    assert!(terminated);
    assert!(network.status().is_err());
}

fn substrate_genotype() -> Genotype {
    let encoding = CppEncoding::Cartesian;
    let weights: Vec<f64> = (0..encoding.width(false))
        .map(|i| if i % 2 == 0 { 1.2 } else { -0.9 })
        .collect();
    let cppn = vec![NeuronGene {
        id: UnitId::Neuron(1),
        generation: 0,
        activation: Activation::Tanh,
        aggregation: Aggregator::DotProduct,
        plasticity: Plasticity::None,
        inputs: vec![InputGene::new(UnitId::Cpp, weights)],
        bias: Some(tweann::genotype::WeightGene::new(0.2)),
        modulatory: Vec::new(),
        outputs: Vec::new(),
        recurrent_outputs: Vec::new(),
    }];
    Genotype {
        agent: 8,
        generation: 0,
        heredity: Default::default(),
        op_mode: Default::default(),
        sensors: vec![SensorGene {
            id: UnitId::Sensor(1),
            name: "retina".to_string(),
            vl: 4,
            format: Format::Grid { width: 2, height: 2 },
            fanout: vec![UnitId::Substrate],
        }],
        actuators: vec![ActuatorGene {
            id: UnitId::Actuator(1),
            name: "motor".to_string(),
            vl: 2,
            format: Format::Unstructured,
            fanin: vec![UnitId::Substrate],
        }],
        body: Body::Substrate(SubstrateGene {
            density: Density {
                depth: 1,
                width: 3,
                height: 2,
            },
            encoding,
            expression: CepExpression::SetWeight,
            plasticity: PlasticityMode::None,
            topology: LinkTopology::L2lFeedforward,
            cppn,
            cppn_outputs: vec![UnitId::Neuron(1)],
        }),
    }
}

#[test]
fn test_substrate_agent_lifecycle() {
    init_logging();
    let host = EnvironmentHost::spawn(Scripted::new(4, HaltSignal::Goal)).unwrap();
    let (network, events) =
        AgentNetwork::spawn(substrate_genotype(), host.handle(), &seeded_config(8)).unwrap();

    let first = episode(&events);
    assert_eq!(first.cycles, 4);
    let derived = network.derived().unwrap().expect("derived after an episode");
    assert!(!derived.projections.is_empty());

    let ids = network.tunable_ids();
    assert_eq!(ids, vec![UnitId::Neuron(1)]);
    let before = network.weights(ids[0]).unwrap();
    network.backup(&ids).unwrap();
    network.perturb(&[(ids[0], 3.0)]).unwrap();
    assert_ne!(network.weights(ids[0]).unwrap(), before);
    network.restore(&ids).unwrap();
    assert_eq!(network.weights(ids[0]).unwrap(), before);

    network.reset().unwrap();
    network.reactivate().unwrap();
    let replay = episode(&events);
    assert_eq!(replay.fitness, first.fitness);
}

#[test]
fn test_tuning_substrate_agent() {
    init_logging();
    let mut config = seeded_config(9);
    config.tuning.selection = TuningSelection::AllRandom;
    config.tuning.duration = TuningDuration::Const;
    config.tuning.duration_parameter = 5.0;

    let host = EnvironmentHost::spawn(Scripted::new(2, HaltSignal::Timeout)).unwrap();
    let (network, events) = AgentNetwork::spawn(substrate_genotype(), host.handle(), &config).unwrap();
    let outcome = Tuner::from_config(&config).run(&network, &events).unwrap();

    assert!(outcome.evaluations >= 6);
    assert!(outcome.best_fitness >= outcome.initial_fitness);

    network.reset().unwrap();
    network.reactivate().unwrap();
    let replay = episode(&events);
    assert!((replay.total_fitness() - outcome.best_fitness).abs() < 1e-9);
}

#[test]
fn test_harvested_genotype_respawns() {
    init_logging();
    let mut genotype = dense(10, &[("out", 1)]);
    genotype.heredity = tweann::Heredity::Lamarckian;
    let host = EnvironmentHost::spawn(Scripted::new(2, HaltSignal::Goal)).unwrap();
    let (network, events) = AgentNetwork::spawn(genotype, host.handle(), &seeded_config(10)).unwrap();
    episode(&events);

    let targets: Vec<(UnitId, f64)> = network.tunable_ids().into_iter().map(|id| (id, 1.0)).collect();
    network.perturb(&targets).unwrap();
    network.reset().unwrap();
    network.reactivate().unwrap();
    let tuned = episode(&events);

    let child = network.harvest().unwrap();
    let (_respawned, child_events) = AgentNetwork::spawn(child, host.handle(), &seeded_config(11)).unwrap();
    assert_eq!(episode(&child_events).fitness, tuned.fitness);
}

#[test]
fn test_config_file_roundtrip() {
    let path = std::env::temp_dir().join("tweann_test_config.yaml");
    let mut config = Config::default();
    config.tuning.selection = TuningSelection::Active;
    config.save(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.tuning.selection, TuningSelection::Active);
    std::fs::remove_file(&path).ok();
}
