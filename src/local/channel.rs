use crate::config::CloseWeights;
use crate::error::Result;
use crate::graph;
use crate::lightning::{lnrpc, LightningClient, MAX_FORWARDING_EVENTS};
use crate::local::heuristic::Heuristics;
use chrono::{Duration, Utc};
use serde::Serialize;

// Ping time reported for peers that were just connected and have no
// measurement yet. Prevents a negative sample from corrupting the range.
const DEFAULT_PING_TIME_MS: i64 = 1_500;

/// The close decision looks at the last month of forwarding activity.
const CLOSE_WINDOW_DAYS: i64 = 30;

/// The node's public channels and their heuristics.
#[derive(Default, Serialize)]
pub struct Channels {
    pub list: Vec<Channel>,
    pub heuristics: Heuristics,
}

/// A public channel the node currently has.
#[derive(Clone, Default, Serialize)]
pub struct Channel {
    pub id: u64,
    pub point: String,
    pub active: bool,
    pub block_height: u32,
    pub remote_public_key: String,
    pub capacity: u64,
    pub num_forwards: u64,
    pub forwards_amount: u64,
    pub local_balance: u64,
    pub fees: u64,
    pub ping_time: i64,
    pub flap_count: i32,
}

/// Returns the node's list of public channels along with their heuristics,
/// sweeping a month of forwarding history once for all of them.
pub async fn get_channels(
    lnd: &impl LightningClient,
    close_weights: &CloseWeights,
    channels: &[lnrpc::Channel],
    peers: &[lnrpc::Peer],
) -> Result<Channels> {
    let one_month_ago = (Utc::now() - Duration::days(CLOSE_WINDOW_DAYS)).timestamp() as u64;
    let forwards = list_forwards(lnd, one_month_ago, 0).await?;

    let mut heuristics = Heuristics::new(close_weights);
    let mut list = Vec::with_capacity(channels.len());

    for channel in channels {
        if channel.private {
            // Do not close private channels
            continue;
        }

        let (num_forwards, forwards_amount, fees) = forwards_info(channel, &forwards);
        let (ping_time, flap_count) = peer_info(channel, peers);

        let channel = Channel {
            id: channel.chan_id,
            block_height: graph::channel_block_height(channel.chan_id),
            point: channel.channel_point.clone(),
            active: channel.active,
            capacity: channel.capacity as u64,
            num_forwards,
            forwards_amount,
            local_balance: channel.local_balance as u64,
            fees,
            remote_public_key: channel.remote_pubkey.clone(),
            ping_time,
            flap_count,
        };

        heuristics.update(&channel);
        list.push(channel);
    }

    Ok(Channels { list, heuristics })
}

/// Collects every forwarding event since `start_time` by paginating the
/// daemon's forwarding history. Pagination continues until a short page.
pub async fn list_forwards(
    lnd: &impl LightningClient,
    start_time: u64,
    mut offset: u32,
) -> Result<Vec<lnrpc::ForwardingEvent>> {
    let mut events = Vec::new();
    let now = Utc::now().timestamp() as u64;

    loop {
        let forwards = lnd.list_forwards(start_time, now, offset).await?;

        let page_len = forwards.forwarding_events.len();
        events.extend(forwards.forwarding_events);

        if page_len != MAX_FORWARDING_EVENTS as usize {
            break;
        }

        offset = forwards.last_offset_index;
    }

    Ok(events)
}

fn forwards_info(
    channel: &lnrpc::Channel,
    forwards: &[lnrpc::ForwardingEvent],
) -> (u64, u64, u64) {
    let mut num_forwards = 0;
    let mut forwards_amount = 0;
    let mut fees = 0;

    for forward in forwards {
        if forward.chan_id_in == channel.chan_id {
            num_forwards += 1;
            forwards_amount += forward.amt_in_msat;
            // Fees are collected on the outgoing half of the circuit, but
            // both halves made the forward possible
            fees += forward.fee_msat;
        }

        if forward.chan_id_out == channel.chan_id {
            num_forwards += 1;
            forwards_amount += forward.amt_out_msat;
            fees += forward.fee_msat;
        }
    }

    (num_forwards, forwards_amount, fees)
}

fn peer_info(channel: &lnrpc::Channel, peers: &[lnrpc::Peer]) -> (i64, i32) {
    for peer in peers {
        if peer.pub_key == channel.remote_pubkey {
            let ping_time = if peer.ping_time == -1 {
                DEFAULT_PING_TIME_MS
            } else {
                peer.ping_time
            };
            return (ping_time, peer.flap_count);
        }
    }

    (0, 0)
}
