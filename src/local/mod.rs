pub mod channel;
pub mod heuristic;

use crate::config;
use crate::error::{Error, Result};
use crate::lightning::{lnrpc, LightningClient};
use channel::Channels;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// General information concerning the lightning node.
#[derive(Default, Serialize)]
pub struct Node {
    pub public_key: String,
    pub channel_peers: HashSet<String>,
    pub sync_peers: HashSet<String>,
    pub closed_channels: Vec<ClosedChannel>,
    pub allocated_balance: u64,
    pub num_channels: u64,
    pub max_open_channels: u64,
    pub max_close_channels: u64,
    pub sat_per_vb: u64,
    pub current_block_height: u32,
    pub channels: Channels,
}

/// Summary of a channel the node was once a participant in.
#[derive(Clone, Serialize)]
pub struct ClosedChannel {
    pub channel_id: u64,
    pub remote_public_key: String,
    pub close_height: u32,
    pub close_type: CloseType,
    pub open_initiator: Initiator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CloseType {
    Cooperative,
    LocalForce,
    RemoteForce,
    Breach,
    FundingCanceled,
    Abandoned,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Initiator {
    Unknown,
    Local,
    Remote,
    Both,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serde_json::to_string(self).unwrap_or_default())
    }
}

/// Returns an immutable snapshot of our own node and its channels.
pub async fn get_node(config: &config::Agent, lnd: &impl LightningClient) -> Result<Node> {
    let info = lnd.get_info().await?;

    if !info.synced_to_graph {
        return Err(Error::NodeUnsynced);
    }

    let wallet = lnd.wallet_balance(config.channel_manager.min_conf).await?;
    let channels = lnd.list_channels().await?;

    let num_channels =
        (info.num_active_channels + info.num_pending_channels + info.num_inactive_channels) as u64;

    let channel_peers: HashSet<String> = channels
        .iter()
        .map(|channel| channel.remote_pubkey.clone())
        .collect();

    let peers = lnd.list_peers().await?;
    let sync_peers: HashSet<String> = peers.iter().map(|peer| peer.pub_key.clone()).collect();

    let closed_channels: Vec<ClosedChannel> =
        lnd.closed_channels().await?.iter().map(closed_channel).collect();

    let sat_per_vb = lnd.estimate_tx_fee(config.target_conf).await?;

    let chans = channel::get_channels(
        lnd,
        &config.heuristic_weights.close,
        &channels,
        &peers,
    )
    .await?;

    let allocated_balance =
        crate::agent::percentage(wallet.confirmed_balance as u64, config.allocation_percent);

    let mut max_open_channels = 0;
    if num_channels < config.max_channels {
        max_open_channels = config.max_channels - num_channels;

        // If there aren't enough funds to open all the channels, stick to
        // the amount allowed by the allocated balance
        if max_open_channels * config.min_channel_size > allocated_balance {
            max_open_channels = allocated_balance / config.min_channel_size;
        }
    }

    let mut max_close_channels = 0;
    if num_channels > config.min_channels {
        max_close_channels = num_channels - config.min_channels;
    }

    Ok(Node {
        current_block_height: info.block_height,
        public_key: info.identity_pubkey,
        allocated_balance,
        num_channels,
        max_open_channels,
        max_close_channels,
        channel_peers,
        sync_peers,
        closed_channels,
        sat_per_vb,
        channels: chans,
    })
}

fn closed_channel(summary: &lnrpc::ChannelCloseSummary) -> ClosedChannel {
    use lnrpc::channel_close_summary::ClosureType;

    let close_type = match ClosureType::from_i32(summary.close_type) {
        Some(ClosureType::CooperativeClose) | None => CloseType::Cooperative,
        Some(ClosureType::LocalForceClose) => CloseType::LocalForce,
        Some(ClosureType::RemoteForceClose) => CloseType::RemoteForce,
        Some(ClosureType::BreachClose) => CloseType::Breach,
        Some(ClosureType::FundingCanceled) => CloseType::FundingCanceled,
        Some(ClosureType::Abandoned) => CloseType::Abandoned,
    };

    let open_initiator = match lnrpc::Initiator::from_i32(summary.open_initiator) {
        Some(lnrpc::Initiator::Local) => Initiator::Local,
        Some(lnrpc::Initiator::Remote) => Initiator::Remote,
        Some(lnrpc::Initiator::Both) => Initiator::Both,
        _ => Initiator::Unknown,
    };

    ClosedChannel {
        channel_id: summary.chan_id,
        remote_public_key: summary.remote_pubkey.clone(),
        close_height: summary.close_height,
        close_type,
        open_initiator,
    }
}
