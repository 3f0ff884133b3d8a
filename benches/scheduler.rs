//! Benchmarks for the deliberation loop.

use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use deliberator::agent::{Agent, QueuedOutput, process_agenda};
use deliberator::config::AgentConfig;
use deliberator::graph::Filler;

const PACK: &str = r#"
    [concepts]
    HAND = ["EFFECTOR"]
    CUP = ["OBJECT"]

    [[goals]]
    name = "TAKE"
    variables = ["object"]
    [[goals.plans]]
    concept = "GRAB"
    roles = { THEME = "$object" }
    [[goals.plans]]
    concept = "PUSH"
    cost = 0.8
    roles = { THEME = "$object" }

    [[operations]]
    concept = "GRAB"
    kind = "trace"
    requires = "HAND"

    [[effectors]]
    name = "LEFT-HAND"
    type = "HAND"
    action = "trace"

    [[effectors]]
    name = "RIGHT-HAND"
    type = "HAND"
    action = "trace"
"#;

fn agent_with_goals(n: usize) -> Agent {
    let mut agent = Agent::new("ROBOT-1", AgentConfig::default()).unwrap();
    agent.set_output(Arc::new(QueuedOutput::new()));
    agent.load_pack_str(PACK).unwrap();
    let cup = agent.graph().lookup_concept("CUP").unwrap();
    for _ in 0..n {
        agent
            .add_goal_instance("TAKE", &[("object".into(), Filler::Frame(cup))])
            .unwrap();
    }
    agent
}

fn bench_process_agenda(c: &mut Criterion) {
    for n in [10, 100, 1000] {
        c.bench_function(&format!("process_agenda_{n}_goals"), |bench| {
            bench.iter_batched(
                || agent_with_goals(n),
                |mut agent| {
                    process_agenda(&mut agent).unwrap();
                    black_box(agent)
                },
                BatchSize::LargeInput,
            )
        });
    }
}

fn bench_tick(c: &mut Criterion) {
    let mut agent = agent_with_goals(100);
    c.bench_function("tick_100_goals_steady", |bench| {
        bench.iter(|| black_box(agent.tick().unwrap()))
    });
}

criterion_group!(benches, bench_process_agenda, bench_tick);
criterion_main!(benches);
