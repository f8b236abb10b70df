use crate::error::{Error, Result};
use crate::lightning::{lnrpc, LightningClient};
use crate::local;

// Fee policy knobs. These are policy choices, not protocol requirements;
// a config hook would belong in config::ChannelManager if they ever need
// to be operator-tunable.
pub(crate) const DEPLETION_FEE_PPM: u64 = 2_100;
const DEPLETED_BALANCE_PERCENT: u64 = 1;
const SATURATED_BALANCE_PERCENT: u64 = 99;
const IDLE_DECAY_PERCENT: u64 = 10;

// Max HTLC sizing: advertise 80% of the local balance, keeping a 20%
// buffer so forwards don't immediately deplete the channel.
const MAX_HTLC_BALANCE_PERCENT: u64 = 80;
const MIN_MAX_HTLC_MSAT: u64 = 1_000;

/// Computes the new outbound fee rate for a channel from its liquidity and
/// the traffic asymmetry observed over the activity window.
pub fn new_fee_rate(
    channel: &local::channel::Channel,
    current_ppm: u64,
    amount_in: u64,
    amount_out: u64,
) -> u64 {
    // Nearly depleted: price the remaining outbound liquidity high
    if channel.local_balance < super::percentage(channel.capacity, DEPLETED_BALANCE_PERCENT) {
        return DEPLETION_FEE_PPM;
    }

    // Nearly full: give away outbound to attract inbound
    if channel.local_balance > super::percentage(channel.capacity, SATURATED_BALANCE_PERCENT) {
        return 0;
    }

    // No outgoing traffic in the window: decay towards zero
    if amount_out == 0 {
        return current_ppm - super::percentage(current_ppm, IDLE_DECAY_PERCENT);
    }

    let ratio = amount_out as f64 / (amount_in + amount_out) as f64;
    let delta = (current_ppm as f64 * (ratio - 0.5).abs()) as u64;

    if ratio < 0.5 {
        return current_ppm - delta;
    }

    current_ppm + delta
}

/// Computes the new maximum HTLC size for a channel in millisatoshis.
pub fn new_max_htlc_msat(channel: &local::channel::Channel) -> u64 {
    if channel.local_balance < 2 {
        return MIN_MAX_HTLC_MSAT;
    }

    super::percentage(channel.local_balance * 1_000, MAX_HTLC_BALANCE_PERCENT)
}

/// Sums the amounts a channel moved in each direction over the forwarding
/// window.
pub fn forward_amounts(channel_id: u64, forwards: &[lnrpc::ForwardingEvent]) -> (u64, u64) {
    let mut amount_in = 0;
    let mut amount_out = 0;

    for forward in forwards {
        if forward.chan_id_in == channel_id {
            amount_in += forward.amt_in_msat;
        }
        if forward.chan_id_out == channel_id {
            amount_out += forward.amt_out_msat;
        }
    }

    (amount_in, amount_out)
}

/// Returns our side's routing policy for the given channel.
pub async fn channel_policy(
    lnd: &impl LightningClient,
    public_key: &str,
    channel: &local::channel::Channel,
) -> Result<lnrpc::RoutingPolicy> {
    let info = lnd.get_chan_info(channel.id).await?;

    let policy = if info.node1_pub == public_key {
        info.node1_policy
    } else {
        info.node2_policy
    };

    policy.ok_or(Error::RpcCallFailed {
        call: "GetChanInfo",
        status: format!("missing routing policy for channel {}", channel.id),
    })
}
