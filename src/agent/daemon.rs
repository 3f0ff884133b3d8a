//! Heartbeat actor.
//!
//! `AgentDaemon` owns the [`Agent`] and is the only code that touches it.
//! Everything else talks to it through an [`AgentHandle`]: inputs, goal
//! requests, release notifications, explicit ticks and snapshots arrive on
//! one mpsc inbox and are processed one at a time, interleaved with the
//! heartbeat. The agent itself stays synchronous; tokio only drives
//! scheduling, effector workers and signal handling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};

use crate::config::AgentConfig;
use crate::dispatch::{ActionRegistry, EffectorJob};
use crate::graph::{Filler, FrameGraph, GraphResult};
use crate::signal::SignalId;
use crate::symbol::SymbolId;

use super::agent::Agent;
use super::effector::{EffectorId, EffectorOutcome, EffectorOutput, run_job};
use super::error::{AgentError, AgentResult};
use super::goal::GoalId;
use super::scheduler::TickSummary;
use super::snapshot::AgentSnapshot;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Heartbeat period (default: 250ms).
    pub heartbeat: Duration,
    /// Stop after this many heartbeats (default: run until shutdown).
    pub max_ticks: Option<u64>,
    /// Inbox capacity (default: 256).
    pub inbox_capacity: usize,
    /// Stop on Ctrl+C (default: true).
    pub handle_ctrl_c: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_millis(250),
            max_ticks: None,
            inbox_capacity: 256,
            handle_ctrl_c: true,
        }
    }
}

impl From<&AgentConfig> for DaemonConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            heartbeat: config.heartbeat(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Builds an input frame inside the agent's graph.
pub type FrameBuilder = Box<dyn FnOnce(&mut FrameGraph) -> GraphResult<SymbolId> + Send>;

pub enum AgentMessage {
    Input {
        build: FrameBuilder,
        reply: oneshot::Sender<AgentResult<SignalId>>,
    },
    AddGoal {
        template: String,
        bindings: Vec<(String, Filler)>,
        reply: oneshot::Sender<AgentResult<GoalId>>,
    },
    Release(EffectorId),
    EffectorReport(EffectorOutcome),
    Tick {
        reply: oneshot::Sender<AgentResult<TickSummary>>,
    },
    Snapshot {
        reply: oneshot::Sender<AgentSnapshot>,
    },
    Shutdown,
}

impl std::fmt::Debug for AgentMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Input { .. } => "Input",
            Self::AddGoal { .. } => "AddGoal",
            Self::Release(_) => "Release",
            Self::EffectorReport(_) => "EffectorReport",
            Self::Tick { .. } => "Tick",
            Self::Snapshot { .. } => "Snapshot",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Cloneable client of a running daemon.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    sender: mpsc::Sender<AgentMessage>,
}

impl AgentHandle {
    async fn send(&self, message: AgentMessage) -> AgentResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| AgentError::DaemonStopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> AgentMessage) -> AgentResult<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| AgentError::DaemonStopped)
    }

    /// Build a frame in the agent's graph and handle it as input.
    pub async fn input<F>(&self, build: F) -> AgentResult<SignalId>
    where
        F: FnOnce(&mut FrameGraph) -> GraphResult<SymbolId> + Send + 'static,
    {
        let build: FrameBuilder = Box::new(build);
        self.request(|reply| AgentMessage::Input { build, reply }).await?
    }

    pub async fn add_goal(&self, template: impl Into<String>, bindings: Vec<(String, Filler)>) -> AgentResult<GoalId> {
        let template = template.into();
        self.request(|reply| AgentMessage::AddGoal {
            template,
            bindings,
            reply,
        })
        .await?
    }

    /// Notify the agent that an effector finished. Does not wait.
    pub async fn release(&self, effector: EffectorId) -> AgentResult<()> {
        self.send(AgentMessage::Release(effector)).await
    }

    /// Run a heartbeat now.
    pub async fn tick(&self) -> AgentResult<TickSummary> {
        self.request(|reply| AgentMessage::Tick { reply }).await?
    }

    pub async fn snapshot(&self) -> AgentResult<AgentSnapshot> {
        self.request(|reply| AgentMessage::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) -> AgentResult<()> {
        self.send(AgentMessage::Shutdown).await
    }
}

// ---------------------------------------------------------------------------
// Effector output
// ---------------------------------------------------------------------------

/// Forwards effector jobs to the daemon's worker.
#[derive(Debug)]
pub struct ChannelOutput {
    jobs: mpsc::UnboundedSender<EffectorJob>,
}

impl ChannelOutput {
    pub fn new(jobs: mpsc::UnboundedSender<EffectorJob>) -> Self {
        Self { jobs }
    }
}

impl EffectorOutput for ChannelOutput {
    fn dispatch(&self, job: EffectorJob) {
        if let Err(err) = self.jobs.send(job) {
            tracing::warn!(effector = %err.0.effector_label, "effector worker gone, job dropped");
        }
    }
}

/// Run every job on the blocking pool and post its outcome to the inbox.
async fn effector_worker(
    actions: ActionRegistry,
    mut jobs: mpsc::UnboundedReceiver<EffectorJob>,
    inbox: mpsc::Sender<AgentMessage>,
) {
    while let Some(job) = jobs.recv().await {
        let actions = actions.clone();
        let inbox = inbox.clone();
        tokio::spawn(async move {
            let effector = job.effector_label.clone();
            match tokio::task::spawn_blocking(move || run_job(&actions, job)).await {
                Ok(outcome) => {
                    if inbox.send(AgentMessage::EffectorReport(outcome)).await.is_err() {
                        tracing::debug!(%effector, "daemon stopped before effector report");
                    }
                }
                Err(err) => tracing::warn!(%effector, error = %err, "effector action panicked"),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

pub struct AgentDaemon {
    agent: Agent,
    config: DaemonConfig,
    inbox: mpsc::Receiver<AgentMessage>,
    sender: mpsc::Sender<AgentMessage>,
    jobs: mpsc::UnboundedReceiver<EffectorJob>,
}

impl AgentDaemon {
    /// Wrap an agent. Its effector output is redirected to the daemon's worker.
    pub fn new(mut agent: Agent, config: DaemonConfig) -> Self {
        let (sender, inbox) = mpsc::channel(config.inbox_capacity.max(1));
        let (job_sender, jobs) = mpsc::unbounded_channel();
        agent.set_output(Arc::new(ChannelOutput::new(job_sender)));
        Self {
            agent,
            config,
            inbox,
            sender,
            jobs,
        }
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run until shutdown, Ctrl+C or `max_ticks`. Returns the agent.
    pub async fn run(self) -> AgentResult<Agent> {
        let Self {
            mut agent,
            config,
            mut inbox,
            sender,
            jobs,
        } = self;

        let worker = tokio::spawn(effector_worker(
            agent.executables.actions().clone(),
            jobs,
            sender.clone(),
        ));

        let mut heartbeat = interval(config.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeats = 0u64;

        tracing::info!(heartbeat_ms = config.heartbeat.as_millis() as u64, "daemon started");
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Err(err) = agent.tick() {
                        tracing::warn!(error = %err, "heartbeat failed");
                    }
                    heartbeats += 1;
                    if config.max_ticks.is_some_and(|max| heartbeats >= max) {
                        tracing::info!(heartbeats, "daemon: max ticks reached");
                        break;
                    }
                }
                message = inbox.recv() => {
                    let Some(message) = message else { break };
                    if !dispatch(&mut agent, message) {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c(), if config.handle_ctrl_c => {
                    tracing::info!("daemon: received shutdown signal");
                    break;
                }
            }
        }

        worker.abort();
        drop(sender);
        tracing::info!(ticks = agent.tick_count(), "daemon stopped");
        Ok(agent)
    }
}

/// Apply one message. Returns `false` on shutdown.
fn dispatch(agent: &mut Agent, message: AgentMessage) -> bool {
    tracing::trace!(?message, "daemon message");
    match message {
        AgentMessage::Input { build, reply } => {
            let result = build(agent.graph_mut())
                .map_err(AgentError::from)
                .and_then(|root| agent.input(root));
            let _ = reply.send(result);
        }
        AgentMessage::AddGoal {
            template,
            bindings,
            reply,
        } => {
            let _ = reply.send(agent.add_goal_instance(&template, &bindings));
        }
        AgentMessage::Release(effector) => {
            if let Err(err) = agent.release(effector) {
                tracing::warn!(%effector, error = %err, "release failed");
            }
        }
        AgentMessage::EffectorReport(outcome) => {
            if let Err(err) = agent.complete_job(outcome) {
                tracing::warn!(error = %err, "effector report rejected");
            }
        }
        AgentMessage::Tick { reply } => {
            let _ = reply.send(agent.tick());
        }
        AgentMessage::Snapshot { reply } => {
            let _ = reply.send(agent.snapshot());
        }
        AgentMessage::Shutdown => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{GoalStatus, StepStatus};
    use crate::graph::{Scope, concept};

    const PACK: &str = r#"
        [concepts]
        HAND = ["EFFECTOR"]

        [[goals]]
        name = "GRAB-CUP"
        [[goals.plans]]
        concept = "GRAB"

        [[goals]]
        name = "GREET"
        [[goals.plans]]
        concept = "WAVE"

        [[operations]]
        concept = "GRAB"
        kind = "trace"
        requires = "HAND"

        [[effectors]]
        name = "LEFT-HAND"
        type = "HAND"
        action = "trace"
    "#;

    fn daemon(heartbeat: Duration, max_ticks: Option<u64>) -> AgentDaemon {
        let mut agent = Agent::new("ROBOT-1", AgentConfig::default()).unwrap();
        agent.load_pack_str(PACK).unwrap();
        AgentDaemon::new(
            agent,
            DaemonConfig {
                heartbeat,
                max_ticks,
                handle_ctrl_c: false,
                ..DaemonConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn requests_are_served_between_heartbeats() {
        let daemon = daemon(Duration::from_secs(3600), None);
        let handle = daemon.handle();
        let task = tokio::spawn(daemon.run());

        let goal = handle.add_goal("GREET", vec![]).await.unwrap();
        handle.tick().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        let view = snapshot.goals.iter().find(|g| g.id == goal.get()).unwrap();
        assert_eq!(view.plans[0].steps[0].status, StepStatus::Executing);

        handle.shutdown().await.unwrap();
        let agent = task.await.unwrap().unwrap();
        assert!(agent.tick_count() >= 1);
    }

    #[tokio::test]
    async fn effector_round_trip_satisfies_goal() {
        let daemon = daemon(Duration::from_secs(3600), None);
        let handle = daemon.handle();
        let task = tokio::spawn(daemon.run());

        let goal = handle.add_goal("GRAB-CUP", vec![]).await.unwrap();
        let mut satisfied = false;
        for _ in 0..100 {
            handle.tick().await.unwrap();
            let snapshot = handle.snapshot().await.unwrap();
            let view = snapshot.goals.iter().find(|g| g.id == goal.get()).unwrap();
            if view.status == GoalStatus::Satisfied {
                satisfied = true;
                assert!(snapshot.effectors[0].reserved_to.is_some());
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(satisfied, "the trace effector reports done and is released");

        handle.shutdown().await.unwrap();
        let agent = task.await.unwrap().unwrap();
        assert!(agent.effectors().iter().all(|e| e.is_available()));
    }

    #[tokio::test]
    async fn input_frames_are_built_inside_the_actor() {
        let daemon = daemon(Duration::from_secs(3600), None);
        let handle = daemon.handle();
        let task = tokio::spawn(daemon.run());

        let signal = handle
            .input(|graph| {
                let poke = graph.concept_under("POKE", &[])?;
                let event = graph.require_concept(concept::EVENT)?;
                graph.add_parent(poke, event)?;
                graph.instance_of(poke, Scope::new("INPUT"))
            })
            .await
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        let view = snapshot.signals.iter().find(|s| s.id == signal.get()).unwrap();
        assert_eq!(view.scope, "INPUT");

        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn max_ticks_stops_the_daemon() {
        let daemon = daemon(Duration::from_millis(5), Some(3));
        let agent = daemon.run().await.unwrap();
        assert_eq!(agent.tick_count(), 3);
    }

    #[tokio::test]
    async fn stopped_daemon_rejects_requests() {
        let daemon = daemon(Duration::from_secs(3600), None);
        let handle = daemon.handle();
        let task = tokio::spawn(daemon.run());
        handle.shutdown().await.unwrap();
        task.await.unwrap().unwrap();

        assert!(matches!(handle.tick().await, Err(AgentError::DaemonStopped)));
    }
}
