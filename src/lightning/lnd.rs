use crate::config;
use crate::error::{Error, Result};
use crate::lightning::{lnrpc, CloseStream, LightningClient, MAX_FORWARDING_EVENTS};
use async_trait::async_trait;
use log::{debug, info};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tonic_lnd::walletrpc;

// Connection attempt timeouts in seconds. Onion services take noticeably
// longer to dial than clearnet hosts.
const CLEARNET_CONNECT_TIMEOUT: u64 = 15;
const TOR_CONNECT_TIMEOUT: u64 = 30;

/// lnd-backed client. Calls are serialized over a single gRPC connection
/// authenticated with the node's TLS certificate and macaroon.
pub struct LndClient {
    inner: Mutex<tonic_lnd::Client>,
    timeout: Duration,
}

impl LndClient {
    /// Opens the gRPC connection to the configured node.
    pub async fn connect(config: &config::Lightning) -> Result<LndClient> {
        info!("Lnd: opening gRPC connection to {:?}", config.rpc.address);
        debug!(
            "Lnd: using TLS certificate {:?} and macaroon {:?}",
            config.rpc.tls_cert_path, config.rpc.macaroon_path
        );

        let client = tonic_lnd::connect(
            config.rpc.address.clone(),
            config.rpc.tls_cert_path.clone(),
            config.rpc.macaroon_path.clone(),
        )
        .await
        .map_err(|e| Error::RpcUnavailable(e.to_string()))?;

        Ok(LndClient {
            inner: Mutex::new(client),
            timeout: Duration::from_secs(config.rpc.timeout_secs),
        })
    }

    /// Runs a unary call under the configured deadline.
    async fn call<T, F>(&self, name: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::RpcCallFailed {
                call: name,
                status: format!("request timed out after {:?}", self.timeout),
            }),
        }
    }
}

#[async_trait]
impl LightningClient for LndClient {
    async fn get_info(&self) -> Result<lnrpc::GetInfoResponse> {
        self.call("GetInfo", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .get_info(lnrpc::GetInfoRequest {})
                .await
                .map_err(|e| Error::rpc("GetInfo", e))?;
            Ok(response.into_inner())
        })
        .await
    }

    async fn wallet_balance(&self, min_conf: i32) -> Result<lnrpc::WalletBalanceResponse> {
        self.call("WalletBalance", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .wallet_balance(lnrpc::WalletBalanceRequest {
                    min_confs: min_conf,
                    ..Default::default()
                })
                .await
                .map_err(|e| Error::rpc("WalletBalance", e))?;
            Ok(response.into_inner())
        })
        .await
    }

    async fn list_channels(&self) -> Result<Vec<lnrpc::Channel>> {
        self.call("ListChannels", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .list_channels(lnrpc::ListChannelsRequest::default())
                .await
                .map_err(|e| Error::rpc("ListChannels", e))?;
            Ok(response.into_inner().channels)
        })
        .await
    }

    async fn list_peers(&self) -> Result<Vec<lnrpc::Peer>> {
        self.call("ListPeers", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .list_peers(lnrpc::ListPeersRequest::default())
                .await
                .map_err(|e| Error::rpc("ListPeers", e))?;
            Ok(response.into_inner().peers)
        })
        .await
    }

    async fn closed_channels(&self) -> Result<Vec<lnrpc::ChannelCloseSummary>> {
        self.call("ClosedChannels", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .closed_channels(lnrpc::ClosedChannelsRequest {
                    cooperative: true,
                    local_force: true,
                    remote_force: true,
                    // The remote peer attempted to broadcast a prior revoked
                    // channel state.
                    breach: true,
                    // The opening workflow failed or timed out waiting for
                    // the funding transaction; the channel never fully
                    // opened. Used to avoid reselecting nodes we recently
                    // failed to open to.
                    funding_canceled: true,
                    abandoned: false,
                })
                .await
                .map_err(|e| Error::rpc("ClosedChannels", e))?;
            Ok(response.into_inner().channels)
        })
        .await
    }

    async fn estimate_tx_fee(&self, target_conf: i32) -> Result<u64> {
        self.call("EstimateFee", async {
            let mut client = self.inner.lock().await;
            let response = client
                .wallet()
                .estimate_fee(walletrpc::EstimateFeeRequest {
                    conf_target: target_conf,
                })
                .await
                .map_err(|e| Error::rpc("EstimateFee", e))?;

            // sat/kw -> sat/kvB -> sat/vB
            let sat_per_kw = response.into_inner().sat_per_kw as u64;
            Ok(sat_per_kw * 4 / 1000)
        })
        .await
    }

    async fn describe_graph(&self) -> Result<lnrpc::ChannelGraph> {
        // No deadline: the graph response is hundreds of megabytes on
        // mainnet and takes as long as it takes
        let mut client = self.inner.lock().await;
        let response = client
            .lightning()
            .describe_graph(lnrpc::ChannelGraphRequest {
                include_unannounced: true,
            })
            .await
            .map_err(|e| Error::rpc("DescribeGraph", e))?;

        Ok(response.into_inner())
    }

    async fn get_chan_info(&self, channel_id: u64) -> Result<lnrpc::ChannelEdge> {
        self.call("GetChanInfo", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .get_chan_info(lnrpc::ChanInfoRequest {
                    chan_id: channel_id,
                    ..Default::default()
                })
                .await
                .map_err(|e| Error::rpc("GetChanInfo", e))?;
            Ok(response.into_inner())
        })
        .await
    }

    async fn list_forwards(
        &self,
        start_time: u64,
        end_time: u64,
        index_offset: u32,
    ) -> Result<lnrpc::ForwardingHistoryResponse> {
        self.call("ForwardingHistory", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .forwarding_history(lnrpc::ForwardingHistoryRequest {
                    start_time,
                    end_time,
                    index_offset,
                    num_max_events: MAX_FORWARDING_EVENTS,
                    ..Default::default()
                })
                .await
                .map_err(|e| Error::rpc("ForwardingHistory", e))?;
            Ok(response.into_inner())
        })
        .await
    }

    async fn connect_peer(&self, public_key: &str, addresses: &[String]) -> Result<()> {
        for address in addresses {
            let host = address.split(':').next().unwrap_or(address);
            let timeout = if host.ends_with(".onion") {
                TOR_CONNECT_TIMEOUT
            } else {
                CLEARNET_CONNECT_TIMEOUT
            };

            let request = lnrpc::ConnectPeerRequest {
                addr: Some(lnrpc::LightningAddress {
                    pubkey: public_key.to_string(),
                    host: address.clone(),
                }),
                perm: false,
                timeout,
            };

            let mut client = self.inner.lock().await;
            match client.lightning().connect_peer(request).await {
                Ok(_) => return Ok(()),
                Err(status) => {
                    debug!("Lnd: connecting to {public_key} at {address:?} failed: {status}");
                }
            }
        }

        Err(Error::PeerUnreachable(public_key.to_string()))
    }

    async fn batch_open_channel(&self, request: lnrpc::BatchOpenChannelRequest) -> Result<String> {
        self.call("BatchOpenChannel", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .batch_open_channel(request)
                .await
                .map_err(|e| Error::rpc("BatchOpenChannel", e))?;

            let pending = response.into_inner().pending_channels;
            let first = pending.first().ok_or(Error::RpcCallFailed {
                call: "BatchOpenChannel",
                status: "response contains no pending channels".to_string(),
            })?;

            Ok(super::txid_to_string(&first.txid))
        })
        .await
    }

    async fn close_channel(
        &self,
        request: lnrpc::CloseChannelRequest,
    ) -> Result<Box<dyn CloseStream>> {
        // The status stream outlives any sane deadline, it resolves once
        // the closing transaction is broadcast
        let mut client = self.inner.lock().await;
        let response = client
            .lightning()
            .close_channel(request)
            .await
            .map_err(|e| Error::rpc("CloseChannel", e))?;

        Ok(Box::new(LndCloseStream(response.into_inner())))
    }

    async fn update_channel_policy(
        &self,
        channel_point: &str,
        base_fee_msat: u64,
        fee_rate_ppm: u64,
        max_htlc_msat: u64,
        time_lock_delta: u64,
    ) -> Result<()> {
        let chan_point = super::parse_channel_point(channel_point)?;

        let request = lnrpc::PolicyUpdateRequest {
            scope: Some(lnrpc::policy_update_request::Scope::ChanPoint(chan_point)),
            base_fee_msat: base_fee_msat as i64,
            fee_rate_ppm: fee_rate_ppm as u32,
            max_htlc_msat,
            time_lock_delta: time_lock_delta as u32,
            ..Default::default()
        };

        self.call("UpdateChannelPolicy", async {
            let mut client = self.inner.lock().await;
            let response = client
                .lightning()
                .update_channel_policy(request)
                .await
                .map_err(|e| Error::rpc("UpdateChannelPolicy", e))?;

            let failed_updates = response.into_inner().failed_updates;
            if let Some(failed) = failed_updates.first() {
                return Err(Error::PolicyUpdateRejected(failed.update_error.clone()));
            }

            Ok(())
        })
        .await
    }
}

struct LndCloseStream(tonic_lnd::tonic::Streaming<lnrpc::CloseStatusUpdate>);

#[async_trait]
impl CloseStream for LndCloseStream {
    async fn recv(&mut self) -> Result<Option<lnrpc::CloseStatusUpdate>> {
        self.0.message().await.map_err(|e| Error::rpc("CloseChannel", e))
    }
}
