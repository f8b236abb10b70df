use crate::error::{Error, Result};
use crate::lightning::{lnrpc, CloseStream, LightningClient, MAX_FORWARDING_EVENTS};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A recorded policy update call.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyUpdateCall {
    pub channel_point: String,
    pub base_fee_msat: u64,
    pub fee_rate_ppm: u64,
    pub max_htlc_msat: u64,
    pub time_lock_delta: u64,
}

/// Mock Lightning client that returns preset responses and records
/// mutating calls.
pub struct ClientMock {
    pub info: lnrpc::GetInfoResponse,
    pub wallet: lnrpc::WalletBalanceResponse,
    pub channels: Vec<lnrpc::Channel>,
    pub peers: Vec<lnrpc::Peer>,
    pub closed: Vec<lnrpc::ChannelCloseSummary>,
    pub sat_per_vb: u64,
    pub graph: lnrpc::ChannelGraph,
    pub chan_infos: HashMap<u64, lnrpc::ChannelEdge>,
    pub forwards: Vec<lnrpc::ForwardingEvent>,
    /// Peers for which connect attempts fail.
    pub unreachable_peers: Vec<String>,
    /// Raw txid returned by batch opens and close streams.
    pub txid: Vec<u8>,
    /// When set, policy updates are rejected with this error.
    pub policy_update_error: Option<String>,
    // Call recorders
    pub connect_peer_calls: Mutex<Vec<String>>,
    pub batch_open_calls: Mutex<Vec<lnrpc::BatchOpenChannelRequest>>,
    pub close_channel_calls: Mutex<Vec<lnrpc::CloseChannelRequest>>,
    pub policy_update_calls: Mutex<Vec<PolicyUpdateCall>>,
}

impl Default for ClientMock {
    fn default() -> Self {
        ClientMock {
            info: lnrpc::GetInfoResponse {
                identity_pubkey: "self".to_string(),
                synced_to_graph: true,
                block_height: 800_000,
                ..Default::default()
            },
            wallet: lnrpc::WalletBalanceResponse::default(),
            channels: Vec::new(),
            peers: Vec::new(),
            closed: Vec::new(),
            sat_per_vb: 2,
            graph: lnrpc::ChannelGraph::default(),
            chan_infos: HashMap::new(),
            forwards: Vec::new(),
            unreachable_peers: Vec::new(),
            txid: vec![0xab; 32],
            policy_update_error: None,
            connect_peer_calls: Mutex::new(Vec::new()),
            batch_open_calls: Mutex::new(Vec::new()),
            close_channel_calls: Mutex::new(Vec::new()),
            policy_update_calls: Mutex::new(Vec::new()),
        }
    }
}

impl ClientMock {
    pub fn new() -> Self {
        ClientMock::default()
    }
}

#[async_trait]
impl LightningClient for ClientMock {
    async fn get_info(&self) -> Result<lnrpc::GetInfoResponse> {
        Ok(self.info.clone())
    }

    async fn wallet_balance(&self, _min_conf: i32) -> Result<lnrpc::WalletBalanceResponse> {
        Ok(self.wallet.clone())
    }

    async fn list_channels(&self) -> Result<Vec<lnrpc::Channel>> {
        Ok(self.channels.clone())
    }

    async fn list_peers(&self) -> Result<Vec<lnrpc::Peer>> {
        Ok(self.peers.clone())
    }

    async fn closed_channels(&self) -> Result<Vec<lnrpc::ChannelCloseSummary>> {
        Ok(self.closed.clone())
    }

    async fn estimate_tx_fee(&self, _target_conf: i32) -> Result<u64> {
        Ok(self.sat_per_vb)
    }

    async fn describe_graph(&self) -> Result<lnrpc::ChannelGraph> {
        Ok(self.graph.clone())
    }

    async fn get_chan_info(&self, channel_id: u64) -> Result<lnrpc::ChannelEdge> {
        self.chan_infos
            .get(&channel_id)
            .cloned()
            .ok_or(Error::RpcCallFailed {
                call: "GetChanInfo",
                status: format!("unknown channel {channel_id}"),
            })
    }

    async fn list_forwards(
        &self,
        _start_time: u64,
        _end_time: u64,
        index_offset: u32,
    ) -> Result<lnrpc::ForwardingHistoryResponse> {
        let start = index_offset as usize;
        let end = (start + MAX_FORWARDING_EVENTS as usize).min(self.forwards.len());
        let events = self.forwards.get(start..end).unwrap_or_default().to_vec();

        Ok(lnrpc::ForwardingHistoryResponse {
            last_offset_index: end as u32,
            forwarding_events: events,
        })
    }

    async fn connect_peer(&self, public_key: &str, _addresses: &[String]) -> Result<()> {
        if self.unreachable_peers.iter().any(|p| p == public_key) {
            return Err(Error::PeerUnreachable(public_key.to_string()));
        }

        self.connect_peer_calls
            .lock()
            .unwrap()
            .push(public_key.to_string());
        Ok(())
    }

    async fn batch_open_channel(&self, request: lnrpc::BatchOpenChannelRequest) -> Result<String> {
        self.batch_open_calls.lock().unwrap().push(request);
        Ok(super::txid_to_string(&self.txid))
    }

    async fn close_channel(
        &self,
        request: lnrpc::CloseChannelRequest,
    ) -> Result<Box<dyn CloseStream>> {
        self.close_channel_calls.lock().unwrap().push(request);
        Ok(Box::new(CloseStreamMock {
            update: Some(lnrpc::CloseStatusUpdate {
                update: Some(lnrpc::close_status_update::Update::ClosePending(
                    lnrpc::PendingUpdate {
                        txid: self.txid.clone(),
                        output_index: 0,
                    },
                )),
            }),
        }))
    }

    async fn update_channel_policy(
        &self,
        channel_point: &str,
        base_fee_msat: u64,
        fee_rate_ppm: u64,
        max_htlc_msat: u64,
        time_lock_delta: u64,
    ) -> Result<()> {
        if let Some(error) = &self.policy_update_error {
            return Err(Error::PolicyUpdateRejected(error.clone()));
        }

        self.policy_update_calls
            .lock()
            .unwrap()
            .push(PolicyUpdateCall {
                channel_point: channel_point.to_string(),
                base_fee_msat,
                fee_rate_ppm,
                max_htlc_msat,
                time_lock_delta,
            });
        Ok(())
    }
}

struct CloseStreamMock {
    update: Option<lnrpc::CloseStatusUpdate>,
}

#[async_trait]
impl CloseStream for CloseStreamMock {
    async fn recv(&mut self) -> Result<Option<lnrpc::CloseStatusUpdate>> {
        Ok(self.update.take())
    }
}
