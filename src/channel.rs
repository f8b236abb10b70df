use crate::config;
use crate::error::{Error, Result};
use crate::lightning::{self, lnrpc, LightningClient};
use futures::future::try_join_all;
use log::{info, trace};

/// The information necessary to open a set of channels in one funding
/// transaction.
#[derive(Debug)]
pub struct OpenRequest {
    /// Funding amount in satoshis per node public key
    pub nodes: Vec<(String, u64)>,
    pub sat_per_vb: u64,
}

/// The information necessary to close a set of channels.
#[derive(Debug)]
pub struct CloseRequest {
    /// Force-close flag per channel point
    pub channels: Vec<(String, bool)>,
    pub sat_per_vb: u64,
}

/// Handles the opening and closing of channels and their routing policy
/// updates.
pub struct Manager<'a, C> {
    lnd: &'a C,
    config: &'a config::ChannelManager,
}

impl<'a, C: LightningClient> Manager<'a, C> {
    pub fn new(config: &'a config::ChannelManager, lnd: &'a C) -> Self {
        Manager { lnd, config }
    }

    /// Opens every requested channel in a single batched funding
    /// transaction.
    pub async fn open(&self, request: OpenRequest) -> Result<()> {
        let mut batch = Vec::with_capacity(request.nodes.len());

        for (public_key, amount) in &request.nodes {
            let node_pubkey = hex::decode(public_key)
                .map_err(|_| Error::InvalidPublicKey(public_key.clone()))?;

            batch.push(lnrpc::BatchOpenChannel {
                node_pubkey,
                local_funding_amount: *amount as i64,
                base_fee: self.config.base_fee_msat,
                use_base_fee: true,
                fee_rate: self.config.fee_rate_ppm,
                use_fee_rate: true,
                ..Default::default()
            });
        }

        trace!("Channel manager: batch open request channels: {batch:?}");

        let txid = self
            .lnd
            .batch_open_channel(lnrpc::BatchOpenChannelRequest {
                channels: batch,
                min_confs: self.config.min_conf,
                sat_per_vbyte: request.sat_per_vb as i64,
                spend_unconfirmed: false,
                label: "Hydrus".to_string(),
                coin_selection_strategy: lnrpc::CoinSelectionStrategy::StrategyUseGlobalConfig
                    as i32,
                ..Default::default()
            })
            .await?;

        info!("Channel manager: opening channels in transaction {txid:?}");
        Ok(())
    }

    /// Closes every requested channel, one task per channel. The first
    /// error cancels the remaining closes.
    pub async fn close(&self, request: CloseRequest) -> Result<()> {
        let closes = request
            .channels
            .iter()
            .map(|(channel_point, force)| self.close_channel(request.sat_per_vb, channel_point, *force));

        try_join_all(closes).await.map(|_| ())
    }

    async fn close_channel(&self, sat_per_vb: u64, channel_point: &str, force: bool) -> Result<()> {
        let chan_point = lightning::parse_channel_point(channel_point)?;

        let request = lnrpc::CloseChannelRequest {
            channel_point: Some(chan_point),
            sat_per_vbyte: sat_per_vb,
            max_fee_per_vbyte: self.config.max_sat_vb,
            force,
            ..Default::default()
        };

        let mut stream = self.lnd.close_channel(request).await?;

        while let Some(update) = stream.recv().await? {
            if let Some(lnrpc::close_status_update::Update::ClosePending(pending)) = update.update {
                info!(
                    "Channel manager: closing channel on outpoint {channel_point:?} in transaction {}",
                    lightning::txid_to_string(&pending.txid),
                );
                return Ok(());
            }
        }

        Err(Error::RpcCallFailed {
            call: "CloseChannel",
            status: format!("stream for {channel_point:?} ended without a close pending update"),
        })
    }

    /// Rewrites the routing policy of a single channel, keeping its base
    /// fee and time lock delta.
    pub async fn update_policy(
        &self,
        channel_point: &str,
        base_fee_msat: u64,
        fee_rate_ppm: u64,
        max_htlc_msat: u64,
        time_lock_delta: u64,
    ) -> Result<()> {
        self.lnd
            .update_channel_policy(
                channel_point,
                base_fee_msat,
                fee_rate_ppm,
                max_htlc_msat,
                time_lock_delta,
            )
            .await
    }
}
