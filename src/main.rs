mod agent;
mod channel;
mod config;
mod error;
mod graph;
mod heuristic;
mod lightning;
mod local;

use agent::Agent;
use clap::{Parser, Subcommand};
use config::Config;
use error::Result;
use lightning::LightningClient;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "hydrus",
    version,
    about = "Lightning Network liquidity management agent"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, env = "HYDRUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent operations
    #[command(subcommand)]
    Agent(AgentCommands),
    /// Perform channel operations such as opening, closing and updating
    /// routing policies
    #[command(subcommand)]
    Channels(ChannelCommands),
    /// Show scoring information for nodes and channels
    #[command(subcommand)]
    Scores(ScoresCommands),
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Execute a full run: close, open and retune channels
    Run,
}

#[derive(Subcommand)]
enum ChannelCommands {
    /// Evaluate nodes to connect to and create the funding transaction
    Open,
    /// Evaluate local channels to close and create the closing transactions
    Close,
    /// Evaluate local channels and update their routing policies
    Update,
}

#[derive(Subcommand)]
enum ScoresCommands {
    /// Show local channels scores
    Channels,
    /// Show network graph nodes scores
    Nodes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    env_logger::Builder::new()
        .filter_level(config.logging.level_filter()?)
        .format_timestamp_millis()
        .init();

    if config.agent.dry_run {
        warn!("Dry-run mode: decisions are logged but not executed");
    }

    let lnd = lightning::lnd::LndClient::connect(&config.lightning).await?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("Received shutdown signal, cancelling the run");
        signal_token.cancel();
    });

    let result = tokio::select! {
        result = dispatch(&cli.command, &config, &lnd, &token) => result,
        _ = token.cancelled() => Err(error::Error::Cancelled),
    };

    Ok(result?)
}

async fn dispatch(
    command: &Commands,
    config: &Config,
    lnd: &impl LightningClient,
    token: &CancellationToken,
) -> Result<()> {
    match command {
        Commands::Agent(AgentCommands::Run) => {
            let agent = Agent::new(&config.agent, lnd);
            agent.run(token).await
        }
        Commands::Channels(command) => run_channels(command, config, lnd, token).await,
        Commands::Scores(ScoresCommands::Channels) => channels_scores(config, lnd).await,
        Commands::Scores(ScoresCommands::Nodes) => nodes_scores(config, lnd, token).await,
    }
}

async fn run_channels(
    command: &ChannelCommands,
    config: &Config,
    lnd: &impl LightningClient,
    token: &CancellationToken,
) -> Result<()> {
    let local_node = local::get_node(&config.agent, lnd).await?;
    let agent = Agent::new(&config.agent, lnd);

    if let ChannelCommands::Update = command {
        info!("Evaluating channels to update");
        return agent.update_policies(&local_node).await;
    }

    if local_node.sat_per_vb > config.agent.channel_manager.max_sat_vb {
        info!(
            "Skipping, the estimated transaction fee per virtual byte ({}) is higher than the maximum ({})",
            local_node.sat_per_vb, config.agent.channel_manager.max_sat_vb,
        );
        return Ok(());
    }

    match command {
        ChannelCommands::Open => {
            info!("Evaluating channels to open");
            agent.open_channels(token, &local_node).await
        }
        ChannelCommands::Close => {
            info!("Evaluating channels to close");
            agent.close_channels(&local_node).await
        }
        ChannelCommands::Update => unreachable!("handled above"),
    }
}

async fn channels_scores(config: &Config, lnd: &impl LightningClient) -> Result<()> {
    let local_node = local::get_node(&config.agent, lnd).await?;

    if local_node.channels.list.is_empty() {
        info!("The node has no channels");
        return Ok(());
    }

    info!(
        "Local node channels heuristics: {}",
        serde_json::to_string(&local_node.channels.heuristics).unwrap_or_default()
    );

    #[derive(Serialize)]
    struct CandidateChannel {
        id: u64,
        channel_point: String,
        score: f64,
    }

    let mut candidates: Vec<CandidateChannel> = local_node
        .channels
        .list
        .iter()
        .map(|channel| CandidateChannel {
            id: channel.id,
            channel_point: channel.point.clone(),
            score: local_node.channels.heuristics.score(channel),
        })
        .collect();

    candidates.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

    info!(
        "Scores: {}",
        serde_json::to_string(&candidates).unwrap_or_default()
    );
    Ok(())
}

async fn nodes_scores(
    config: &Config,
    lnd: &impl LightningClient,
    token: &CancellationToken,
) -> Result<()> {
    let network_graph = graph::new(token, &config.agent.heuristic_weights.open, lnd).await?;

    info!(
        "Network heuristics: {}",
        serde_json::to_string(&network_graph.heuristics).unwrap_or_default()
    );

    #[derive(Serialize)]
    struct CandidateNode {
        alias: String,
        score: f64,
    }

    let mut candidates: Vec<CandidateNode> = network_graph
        .nodes
        .iter()
        .map(|node| CandidateNode {
            alias: node.alias.clone(),
            score: network_graph.heuristics.score(node),
        })
        .collect();

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    info!(
        "Scores: {}",
        serde_json::to_string(&candidates).unwrap_or_default()
    );
    Ok(())
}
