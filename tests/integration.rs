//! End-to-end tests for the deliberation loop.
//!
//! These drive an agent through whole heartbeats from a knowledge pack:
//! impasses spawning subgoals, effector jobs completing and releasing,
//! third-party steps finished by perceived events, and evergreen goals
//! re-injected while their condition fails.

use std::sync::Arc;

use deliberator::agent::{Agenda, Agent, Effector, GoalStatus, QueuedOutput, StepId, StepStatus};
use deliberator::config::AgentConfig;
use deliberator::graph::{Filler, FrameGraph, PHASE_END, Scope, slot};

const PACK: &str = r#"
    [concepts]
    HAND = ["EFFECTOR"]
    WHEEL = ["EFFECTOR"]
    CUP = ["OBJECT"]
    HUMAN = ["AGENT"]
    BATTERY = ["OBJECT"]
    HOLD = ["EVENT"]
    MOVE = ["EVENT"]
    POUR = ["EVENT"]
    CHARGE = ["EVENT"]

    [[goals]]
    name = "TAKE"
    priority = 0.8
    variables = ["object"]

    [[goals.plans]]
    concept = "HOLD"
    cost = 0.2
    roles = { THEME = "$object" }

    [[goals.plans.impasses]]
    name = "TOO-FAR-AWAY"
    detector = "far"
    resolutions = [{ goal = "APPROACH", bindings = { object = "target" } }]

    [[goals]]
    name = "APPROACH"
    priority = 0.9
    variables = ["target"]

    [[goals.plans]]
    concept = "MOVE"
    roles = { DESTINATION = "$target" }

    [[goals]]
    name = "SERVE"
    variables = ["drink"]

    [[goals.plans]]
    concept = "POUR"
    roles = { AGENT = "HUMAN", THEME = "$drink" }

    [[goals]]
    name = "RECHARGE"
    priority = 1.0

    [[goals.plans]]
    concept = "CHARGE"

    [[operations]]
    concept = "HOLD"
    kind = "trace"
    requires = "HAND"

    [[operations]]
    concept = "MOVE"
    kind = "trace"
    requires = "WHEEL"

    [[effectors]]
    name = "LEFT-HAND"
    type = "HAND"
    action = "trace"

    [[effectors]]
    name = "BASE"
    type = "WHEEL"
    action = "trace"

    [[evergreens]]
    name = "KEEP-CHARGED"
    subject = "BATTERY"
    slot = "LEVEL"
    comparator = "GTE"
    values = [0.5]
    resolution = "RECHARGE"
"#;

fn test_agent() -> (Agent, Arc<QueuedOutput>) {
    let mut agent = Agent::new("ROBOT-1", AgentConfig::default()).unwrap();
    let queue = Arc::new(QueuedOutput::new());
    agent.set_output(queue.clone());
    agent.load_pack_str(PACK).unwrap();
    // Far from the cup until some APPROACH goal has been satisfied.
    agent.register_detector("far", |_: &FrameGraph, agenda: &Agenda, _: StepId| {
        !agenda.goals().iter().any(|id| {
            agenda
                .goal(*id)
                .is_some_and(|g| g.label.starts_with("APPROACH") && g.status == GoalStatus::Satisfied)
        })
    });
    (agent, queue)
}

fn charge_battery(agent: &mut Agent, level: f64) {
    let battery = agent.graph().lookup_concept("BATTERY").unwrap();
    agent.graph_mut().set_one(battery, "LEVEL", level).unwrap();
}

/// Tick and drain effector jobs `n` times.
fn run(agent: &mut Agent, queue: &QueuedOutput, n: usize) {
    for _ in 0..n {
        agent.tick().unwrap();
        let jobs = queue.take();
        agent.run_effector_jobs(jobs).unwrap();
    }
}

#[test]
fn impasse_is_resolved_by_subgoal_then_goal_is_satisfied() {
    let (mut agent, queue) = test_agent();
    charge_battery(&mut agent, 0.9);
    let cup = agent.graph().lookup_concept("CUP").unwrap();
    let goal = agent
        .add_goal_instance("TAKE", &[("object".into(), Filler::Frame(cup))])
        .unwrap();
    let hold = agent.agenda().goal_plans(goal)[0];

    agent.tick().unwrap();
    let step = agent.agenda().step(hold).unwrap();
    assert_eq!(step.status, StepStatus::Impassed);
    assert_eq!(step.subgoals.len(), 1);
    let approach = step.subgoals[0];
    let subgoal = agent.agenda().goal(approach).unwrap();
    assert_eq!(subgoal.subgoal_of, Some(hold));
    let move_step = agent.agenda().goal_plans(approach)[0];
    assert_eq!(agent.graph().first_frame(move_step, "DESTINATION"), Some(cup));

    let jobs = queue.take();
    assert_eq!(jobs.len(), 1, "only the MOVE step can run");
    assert_eq!(jobs[0].effector_label, "BASE");
    agent.run_effector_jobs(jobs).unwrap();
    assert_eq!(agent.graph().text(move_step, slot::PHASE), Some(PHASE_END));

    run(&mut agent, &queue, 4);

    assert_eq!(agent.agenda().goal(approach).unwrap().status, GoalStatus::Satisfied);
    assert_eq!(agent.agenda().goal(goal).unwrap().status, GoalStatus::Satisfied);
    assert_eq!(agent.agenda().step(hold).unwrap().status, StepStatus::Finished);
    assert!(agent.effectors().iter().all(Effector::is_available));
    assert_eq!(agent.summary().faults, 0);
}

#[test]
fn deferred_step_finishes_when_the_other_agent_acts() {
    let (mut agent, queue) = test_agent();
    charge_battery(&mut agent, 0.9);
    let cup = agent.graph().lookup_concept("CUP").unwrap();
    let goal = agent
        .add_goal_instance("SERVE", &[("drink".into(), Filler::Frame(cup))])
        .unwrap();
    let pour = agent.agenda().goal_plans(goal)[0];

    run(&mut agent, &queue, 2);
    assert_eq!(agent.agenda().step(pour).unwrap().status, StepStatus::Deferred);
    assert_eq!(agent.agenda().goal(goal).unwrap().status, GoalStatus::Active);

    // Perceive a human pouring the cup.
    let graph = agent.graph_mut();
    let human = graph.lookup_concept("HUMAN").unwrap();
    let pour_concept = graph.lookup_concept("POUR").unwrap();
    let scope = graph.next_scope("VMR");
    let alice = graph.instance_of(human, scope.clone()).unwrap();
    let seen = graph.instance_of(pour_concept, scope).unwrap();
    graph.set_one(seen, "AGENT", alice).unwrap();
    graph.set_one(seen, "THEME", cup).unwrap();
    graph.set_one(seen, slot::PHASE, PHASE_END).unwrap();

    run(&mut agent, &queue, 1);
    assert_eq!(agent.agenda().step(pour).unwrap().status, StepStatus::Finished);
    assert_eq!(agent.agenda().goal(goal).unwrap().status, GoalStatus::Satisfied);
}

#[test]
fn unrelated_event_does_not_finish_a_deferred_step() {
    let (mut agent, queue) = test_agent();
    charge_battery(&mut agent, 0.9);
    let cup = agent.graph().lookup_concept("CUP").unwrap();
    let goal = agent
        .add_goal_instance("SERVE", &[("drink".into(), Filler::Frame(cup))])
        .unwrap();

    let graph = agent.graph_mut();
    let battery = graph.lookup_concept("BATTERY").unwrap();
    let pour_concept = graph.lookup_concept("POUR").unwrap();
    let seen = graph.instance_of(pour_concept, Scope::new("VMR#1")).unwrap();
    graph.set_one(seen, "THEME", battery).unwrap();
    graph.set_one(seen, slot::PHASE, PHASE_END).unwrap();

    run(&mut agent, &queue, 3);
    assert_eq!(agent.agenda().goal(goal).unwrap().status, GoalStatus::Active);
}

#[test]
fn evergreen_injects_resolution_until_condition_holds() {
    let (mut agent, queue) = test_agent();
    charge_battery(&mut agent, 0.2);

    let first = agent.tick().unwrap();
    assert_eq!(first.evergreens_attached, 1);
    let recharge = agent.evergreens().pending_resolutions()[0];
    assert!(agent.agenda().is_attached(recharge));
    assert!(agent.agenda().goal(recharge).unwrap().label.starts_with("RECHARGE"));
    agent.run_effector_jobs(queue.take()).unwrap();

    // Still low: no second injection while the first is in flight.
    let second = agent.tick().unwrap();
    assert_eq!(second.evergreens_attached, 0);
    assert_eq!(agent.evergreens().pending_resolutions(), vec![recharge]);

    // Complete the resolution; the battery is still low, so a fresh one follows.
    let charge = agent.agenda().goal_plans(recharge)[0];
    agent.graph_mut().set_one(charge, slot::PHASE, PHASE_END).unwrap();
    run(&mut agent, &queue, 1);
    assert_eq!(agent.agenda().goal(recharge).unwrap().status, GoalStatus::Satisfied);
    let fourth = agent.tick().unwrap();
    assert_eq!(fourth.evergreens_attached, 1);
    agent.run_effector_jobs(queue.take()).unwrap();
    let pending = agent.evergreens().pending_resolutions();
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0], recharge);

    // Charged: the in-flight resolution is left alone and nothing new appears.
    charge_battery(&mut agent, 0.8);
    let fresh = pending[0];
    let fresh_charge = agent.agenda().goal_plans(fresh)[0];
    agent.graph_mut().set_one(fresh_charge, slot::PHASE, PHASE_END).unwrap();
    run(&mut agent, &queue, 3);
    assert!(agent.evergreens().pending_resolutions().is_empty());
    assert_eq!(agent.summary().evergreens_attached, 0);
}

#[test]
fn snapshot_reflects_a_finished_run() {
    let (mut agent, queue) = test_agent();
    charge_battery(&mut agent, 0.9);
    let cup = agent.graph().lookup_concept("CUP").unwrap();
    agent
        .add_goal_instance("TAKE", &[("object".into(), Filler::Frame(cup))])
        .unwrap();
    run(&mut agent, &queue, 6);

    let snapshot = agent.snapshot();
    assert_eq!(snapshot.tick, 6);
    assert_eq!(snapshot.goals.len(), 2);
    assert!(snapshot.goals.iter().all(|g| g.status == GoalStatus::Satisfied));
    let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
    assert_eq!(json["effectors"].as_array().unwrap().len(), 2);
    assert!(json["signals"].as_array().unwrap().len() >= 4);
}
