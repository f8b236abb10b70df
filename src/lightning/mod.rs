pub mod lnd;
#[cfg(test)]
pub mod mock;

use crate::error::{Error, Result};
use async_trait::async_trait;

pub use tonic_lnd::lnrpc;

/// Maximum number of forwarding events returned per RPC call.
pub const MAX_FORWARDING_EVENTS: u32 = 50_000;

/// A Lightning Network node client.
///
/// Abstracts the daemon RPC surface used by the agent so decisions can be
/// exercised against a mock in tests.
#[async_trait]
pub trait LightningClient: Send + Sync {
    /// General information concerning the node.
    async fn get_info(&self) -> Result<lnrpc::GetInfoResponse>;

    /// Confirmed and unconfirmed balances under control of the wallet.
    async fn wallet_balance(&self, min_conf: i32) -> Result<lnrpc::WalletBalanceResponse>;

    /// All open channels the node is a participant in.
    async fn list_channels(&self) -> Result<Vec<lnrpc::Channel>>;

    /// All currently connected peers.
    async fn list_peers(&self) -> Result<Vec<lnrpc::Peer>>;

    /// Closed channels the node was a participant in, including canceled
    /// funding attempts.
    async fn closed_channels(&self) -> Result<Vec<lnrpc::ChannelCloseSummary>>;

    /// Estimated cost in sat/vB of mining a transaction within the target.
    async fn estimate_tx_fee(&self, target_conf: i32) -> Result<u64>;

    /// The latest announced graph state from the point of view of the node.
    async fn describe_graph(&self) -> Result<lnrpc::ChannelGraph>;

    /// The latest authenticated network announcement for the given channel.
    async fn get_chan_info(&self, channel_id: u64) -> Result<lnrpc::ChannelEdge>;

    /// One page of successful HTLC forwarding events.
    async fn list_forwards(
        &self,
        start_time: u64,
        end_time: u64,
        index_offset: u32,
    ) -> Result<lnrpc::ForwardingHistoryResponse>;

    /// Attempts to establish a connection to a remote peer, iterating its
    /// addresses until one succeeds.
    async fn connect_peer(&self, public_key: &str, addresses: &[String]) -> Result<()>;

    /// Opens multiple channels in a single on-chain transaction. Returns
    /// the funding transaction ID.
    async fn batch_open_channel(&self, request: lnrpc::BatchOpenChannelRequest) -> Result<String>;

    /// Closes the specified channel, returning the status update stream.
    async fn close_channel(
        &self,
        request: lnrpc::CloseChannelRequest,
    ) -> Result<Box<dyn CloseStream>>;

    /// Updates the fee schedule and policies for a particular channel.
    async fn update_channel_policy(
        &self,
        channel_point: &str,
        base_fee_msat: u64,
        fee_rate_ppm: u64,
        max_htlc_msat: u64,
        time_lock_delta: u64,
    ) -> Result<()>;
}

/// A stream of channel close status updates.
#[async_trait]
pub trait CloseStream: Send {
    /// The next update, or `None` once the stream is exhausted.
    async fn recv(&mut self) -> Result<Option<lnrpc::CloseStatusUpdate>>;
}

/// Parses a channel point string ("txid:vout") into the daemon's type.
pub fn parse_channel_point(channel_point: &str) -> Result<lnrpc::ChannelPoint> {
    let (txid, outpoint) = channel_point
        .split_once(':')
        .ok_or_else(|| Error::InvalidChannelPoint(channel_point.to_string()))?;

    if txid.is_empty() || outpoint.is_empty() {
        return Err(Error::InvalidChannelPoint(channel_point.to_string()));
    }

    let output_index: u32 = outpoint
        .parse()
        .map_err(|_| Error::InvalidChannelPoint(channel_point.to_string()))?;

    Ok(lnrpc::ChannelPoint {
        funding_txid: Some(lnrpc::channel_point::FundingTxid::FundingTxidStr(
            txid.to_string(),
        )),
        output_index,
    })
}

/// Formats a raw transaction ID as the usual display string. The daemon
/// returns txids in little-endian byte order.
pub fn txid_to_string(txid: &[u8]) -> String {
    let mut bytes = txid.to_vec();
    bytes.reverse();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_point() {
        let point = parse_channel_point("aa11:1").unwrap();
        assert_eq!(point.output_index, 1);
        assert_eq!(
            point.funding_txid,
            Some(lnrpc::channel_point::FundingTxid::FundingTxidStr(
                "aa11".to_string()
            ))
        );
    }

    #[test]
    fn test_parse_channel_point_invalid() {
        assert!(parse_channel_point("").is_err());
        assert!(parse_channel_point("aa11").is_err());
        assert!(parse_channel_point("aa11:").is_err());
        assert!(parse_channel_point(":1").is_err());
        assert!(parse_channel_point("aa11:vout").is_err());
    }

    #[test]
    fn test_txid_to_string() {
        let raw = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(txid_to_string(&raw), "04030201");
    }
}
