//! deliberator CLI: run the deliberation loop over a knowledge pack.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use deliberator::agent::{Agent, AgentSnapshot, QueuedOutput};
use deliberator::config::AgentConfig;
use deliberator::graph::Filler;

#[derive(Parser)]
#[command(name = "deliberator", version, about = "Deliberation core for goal-directed agents")]
struct Cli {
    /// Agent name (the identity frame's label).
    #[arg(long, global = true, default_value = "SELF-AGENT")]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add one goal and run a fixed number of heartbeats.
    Run {
        /// Knowledge pack (TOML).
        #[arg(long)]
        pack: PathBuf,

        /// Goal template to instantiate.
        #[arg(long)]
        goal: String,

        /// Variable bindings, `var=CONCEPT` or `var=NUMBER`.
        #[arg(long = "bind", value_parser = parse_binding)]
        bindings: Vec<(String, String)>,

        /// Number of heartbeats.
        #[arg(long, default_value = "5")]
        ticks: u64,

        /// Agent config (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the final snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the heartbeat actor until Ctrl+C.
    #[cfg(feature = "daemon")]
    Daemon {
        /// Knowledge pack (TOML).
        #[arg(long)]
        pack: PathBuf,

        /// Agent config (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop after this many heartbeats.
        #[arg(long)]
        max_ticks: Option<u64>,
    },

    /// Validate an agent config file.
    CheckConfig {
        /// Path to the config (TOML).
        path: PathBuf,
    },
}

fn parse_binding(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((var, value)) if !var.is_empty() && !value.is_empty() => {
            Ok((var.to_string(), value.to_string()))
        }
        _ => Err(format!("expected var=VALUE, got \"{s}\"")),
    }
}

fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    match path {
        Some(path) => Ok(AgentConfig::load(path)?),
        None => Ok(AgentConfig::default()),
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pack,
            goal,
            bindings,
            ticks,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let mut agent = Agent::new(&cli.name, config)?;
            let queue = Arc::new(QueuedOutput::new());
            agent.set_output(queue.clone());
            agent.load_pack(&pack)?;

            let mut resolved = Vec::with_capacity(bindings.len());
            for (var, value) in bindings {
                let filler = match value.parse::<f64>() {
                    Ok(n) => Filler::Number(n),
                    Err(_) => Filler::Frame(agent.graph_mut().concept(&value)?),
                };
                resolved.push((var, filler));
            }
            agent.add_goal_instance(&goal, &resolved)?;

            for _ in 0..ticks {
                let summary = agent.tick()?;
                let done = agent.run_effector_jobs(queue.take())?;
                if !json {
                    println!(
                        "tick {:>3}: {} options, {} selected, {} jobs ({} done), {} steps finished, {} goals satisfied, {} faults",
                        summary.tick,
                        summary.options_generated,
                        summary.options_selected,
                        summary.effector_jobs,
                        done,
                        summary.steps_finished,
                        summary.goals_satisfied,
                        summary.faults,
                    );
                }
            }

            let snapshot = agent.snapshot();
            if json {
                println!("{}", snapshot.to_json().into_diagnostic()?);
            } else {
                print_agenda(&snapshot);
            }
        }

        #[cfg(feature = "daemon")]
        Commands::Daemon {
            pack,
            config,
            max_ticks,
        } => {
            use deliberator::agent::{AgentDaemon, DaemonConfig};

            let config = load_config(config.as_deref())?;
            let daemon_config = DaemonConfig {
                max_ticks,
                ..DaemonConfig::from(&config)
            };
            let mut agent = Agent::new(&cli.name, config)?;
            agent.load_pack(&pack)?;

            let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
            let agent = runtime.block_on(AgentDaemon::new(agent, daemon_config).run())?;
            print_agenda(&agent.snapshot());
        }

        Commands::CheckConfig { path } => {
            let config = AgentConfig::load(&path)?;
            println!("{} is valid", path.display());
            println!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
        }
    }

    Ok(())
}

fn print_agenda(snapshot: &AgentSnapshot) {
    println!("\nAgent {} after {} ticks", snapshot.identity, snapshot.tick);
    if snapshot.goals.is_empty() {
        println!("  (no goals)");
    }
    for goal in &snapshot.goals {
        println!("  {} [{}] priority {:.2}", goal.label, goal.status, goal.priority);
        for plan in &goal.plans {
            println!("    plan {} ({:?}) cost {:.2}", plan.label, plan.status, plan.cost);
            for step in &plan.steps {
                let effector = step.effector.as_deref().unwrap_or("-");
                println!("      {:<24} {:?} effector={effector}", step.label, step.status);
            }
        }
    }
    for effector in &snapshot.effectors {
        println!("  effector {} {:?}", effector.label, effector.status);
    }
}
