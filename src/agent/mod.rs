pub mod candidate;
pub mod policy;

use crate::channel::{self, Manager};
use crate::config;
use crate::error::Result;
use crate::graph;
use crate::local;
use chrono::{Duration, Utc};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

/// The agent looks for new nodes to open channels to, closes channels that
/// are not performing well and retunes the routing policies of the ones
/// that stay.
pub struct Agent<'a, C> {
    lnd: &'a C,
    manager: Manager<'a, C>,
    config: &'a config::Agent,
}

impl<'a, C: crate::lightning::LightningClient> Agent<'a, C> {
    pub fn new(config: &'a config::Agent, lnd: &'a C) -> Self {
        Agent {
            lnd,
            manager: Manager::new(&config.channel_manager, lnd),
            config,
        }
    }

    /// Executes one full run: fee gate, closes, opens, policy updates.
    pub async fn run(&self, token: &CancellationToken) -> Result<()> {
        let local_node = local::get_node(self.config, self.lnd).await?;
        debug!("Agent: local node: {local_node}");

        if local_node.sat_per_vb > self.config.channel_manager.max_sat_vb {
            info!(
                "Agent: skipping, the estimated transaction fee per virtual byte ({}) is higher than the maximum ({})",
                local_node.sat_per_vb, self.config.channel_manager.max_sat_vb,
            );
            return Ok(());
        }

        info!("Agent: evaluating channels to close");
        self.close_channels(&local_node).await?;

        info!("Agent: evaluating channels to open");
        self.open_channels(token, &local_node).await?;

        info!("Agent: evaluating routing policy updates");
        self.update_policies(&local_node).await
    }

    /// Ranks the local channels and closes the most expendable ones.
    pub async fn close_channels(&self, local_node: &local::Node) -> Result<()> {
        if local_node.max_close_channels == 0 {
            info!("Agent: too few channels to consider closing one, skipping channels closure");
            return Ok(());
        }

        debug!(
            "Agent: channels heuristics: {}",
            serde_json::to_string(&local_node.channels.heuristics).unwrap_or_default()
        );

        let candidates = candidate::candidate_channels(local_node, &self.config.keeplist);

        let channels = self.select_channels(local_node, &candidates);
        if channels.is_empty() {
            info!("Agent: no channels will be closed");
            return Ok(());
        }

        info!("Agent: closing channels: {channels:?}");

        if self.config.dry_run {
            return Ok(());
        }

        let request = channel::CloseRequest {
            channels,
            sat_per_vb: local_node.sat_per_vb,
        };
        self.manager.close(request).await
    }

    /// Builds the network graph, ranks the candidates and opens channels
    /// to the best reachable ones in a single batch.
    pub async fn open_channels(
        &self,
        token: &CancellationToken,
        local_node: &local::Node,
    ) -> Result<()> {
        if let Err(reason) = skip_open(self.config, local_node) {
            info!("Agent: skipping channel opens, {reason}");
            return Ok(());
        }

        info!("Agent: generating network graph");

        let network_graph =
            graph::new(token, &self.config.heuristic_weights.open, self.lnd).await?;

        if network_graph.nodes.is_empty() {
            info!("Agent: no nodes found in the network graph");
            return Ok(());
        }

        debug!("Agent: filtered graph size: {} nodes", network_graph.nodes.len());
        debug!(
            "Agent: graph heuristics: {}",
            serde_json::to_string(&network_graph.heuristics).unwrap_or_default()
        );

        let candidates = candidate::candidate_nodes(local_node, &network_graph, &self.config.blocklist);
        let nodes = self.select_nodes(local_node, &candidates).await;
        if nodes.is_empty() {
            info!("Agent: no channels will be opened");
            return Ok(());
        }

        info!("Agent: opening channels: {nodes:?}");

        if self.config.dry_run {
            return Ok(());
        }

        let request = channel::OpenRequest {
            nodes,
            sat_per_vb: local_node.sat_per_vb,
        };
        self.manager.open(request).await
    }

    /// Walks every surviving channel and retunes its fee rate and maximum
    /// HTLC size from the recent forwarding asymmetry.
    pub async fn update_policies(&self, local_node: &local::Node) -> Result<()> {
        let activity_period = Duration::days(self.config.channel_manager.activity_period_days as i64);
        let window_start = (Utc::now() - activity_period).timestamp() as u64;
        let forwards = local::channel::list_forwards(self.lnd, window_start, 0).await?;

        for chan in &local_node.channels.list {
            let current = match policy::channel_policy(self.lnd, &local_node.public_key, chan).await
            {
                Ok(policy) => policy,
                Err(e @ crate::error::Error::RpcCallFailed { .. }) => {
                    warn!("Agent: skipping policy update for {:?}: {e}", chan.point);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let (amount_in, amount_out) = policy::forward_amounts(chan.id, &forwards);
            let current_ppm = current.fee_rate_milli_msat as u64;

            let new_ppm = policy::new_fee_rate(chan, current_ppm, amount_in, amount_out);
            let new_max_htlc = policy::new_max_htlc_msat(chan);

            if new_ppm == current_ppm && new_max_htlc == current.max_htlc_msat {
                debug!("Agent: channel {:?} policy is already tuned", chan.point);
                continue;
            }

            info!(
                "Agent: updating channel {:?} policy: fee rate {current_ppm} -> {new_ppm} ppm, max HTLC {} -> {new_max_htlc} msat",
                chan.point, current.max_htlc_msat,
            );

            if self.config.dry_run {
                continue;
            }

            self.manager
                .update_policy(
                    &chan.point,
                    current.fee_base_msat as u64,
                    new_ppm,
                    new_max_htlc,
                    current.time_lock_delta as u64,
                )
                .await?;
        }

        Ok(())
    }

    /// Applies budget and batch constraints to the ranked node candidates,
    /// connecting to the ones we aren't peered with yet.
    async fn select_nodes(
        &self,
        local_node: &local::Node,
        candidates: &[candidate::NodeCandidate],
    ) -> Vec<(String, u64)> {
        let funding_amount = (local_node.allocated_balance / local_node.max_open_channels)
            .min(self.config.max_channel_size);

        let mut nodes = Vec::with_capacity(local_node.max_open_channels as usize);

        for candidate in candidates {
            if nodes.len() as u64 == local_node.max_open_channels {
                break;
            }

            if !local_node.sync_peers.contains(&candidate.public_key) {
                debug!("Agent: connecting with peer {:?}", candidate.public_key);

                // Skip candidates we can't connect to before the timeout
                if let Err(e) = self
                    .lnd
                    .connect_peer(&candidate.public_key, &candidate.addresses)
                    .await
                {
                    debug!(
                        "Agent: couldn't connect with peer {:?}: {e}. Discarding",
                        candidate.public_key
                    );
                    continue;
                }
            } else {
                debug!("Agent: already connected with peer {:?}", candidate.public_key);
            }

            nodes.push((candidate.public_key.clone(), funding_amount));
        }

        nodes
    }

    /// Applies count and score-threshold constraints to the ranked close
    /// candidates.
    fn select_channels(
        &self,
        local_node: &local::Node,
        candidates: &[candidate::ChannelCandidate],
    ) -> Vec<(String, bool)> {
        let weights_sum = self.config.heuristic_weights.close.sum();

        let mut channels = Vec::with_capacity(local_node.max_close_channels as usize);

        for candidate in candidates {
            let normalized_score = candidate.score / weights_sum;

            // Past the close budget, or the remaining candidates score too
            // well to be worth closing
            if channels.len() as u64 >= local_node.max_close_channels || normalized_score > 0.5 {
                break;
            }

            let force_close = if candidate.active {
                false
            } else if self.config.allow_force_closes {
                true
            } else {
                info!(
                    "Agent: the channel {:?} is inactive and force closes aren't allowed, skipping channel closure",
                    candidate.channel_point
                );
                continue;
            };

            channels.push((candidate.channel_point.clone(), force_close));
        }

        channels
    }
}

/// Returns the reason opening channels should be skipped this run, if any.
fn skip_open(config: &config::Agent, local_node: &local::Node) -> std::result::Result<(), String> {
    if local_node.max_open_channels < 1 {
        return Err("no new channels required".to_string());
    }

    if local_node.allocated_balance == 0 || local_node.allocated_balance < config.min_channel_size {
        return Err(format!(
            "allocated funds ({}) are less than the minimum channel size ({})",
            local_node.allocated_balance, config.min_channel_size,
        ));
    }

    if local_node.num_channels > config.max_channels {
        return Err(format!(
            "number of channels ({}) is higher than the maximum ({})",
            local_node.num_channels, config.max_channels,
        ));
    }

    if local_node.max_open_channels < config.min_batch_size {
        return Err(format!(
            "number of channels to open ({}) is lower than the minimum batch size ({})",
            local_node.max_open_channels, config.min_batch_size,
        ));
    }

    Ok(())
}

/// Integer percentage with truncation, used for all sat and ppm math.
pub(crate) fn percentage(value: u64, percent: u64) -> u64 {
    value * percent / 100
}
