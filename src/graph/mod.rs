pub mod centrality;
pub mod heuristic;

use crate::config::OpenWeights;
use crate::error::{Error, Result};
use crate::lightning::{lnrpc, LightningClient};
use heuristic::Heuristics;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// Directional policies above these values are treated as outliers and
// excluded from the view.
const MAX_FEE_RATE_PPM: i64 = 20_000;
const MAX_BASE_FEE_MSAT: i64 = 100_000;

/// The network graph from the point of view of the node.
#[derive(Serialize)]
pub struct Graph {
    pub heuristics: Heuristics,
    pub nodes: Vec<Node>,
}

/// A lightning network node.
#[derive(Clone, Default, Serialize)]
pub struct Node {
    pub alias: String,
    pub public_key: String,
    pub num_features: u64,
    pub capacity: u64,
    pub centrality: Centrality,
    pub addresses: Vec<String>,
    pub channels: Vec<Channel>,
}

/// A lightning network channel.
///
/// All routing policy values are in millisatoshis.
#[derive(Clone, Default, Serialize)]
pub struct Channel {
    pub point: String,
    pub peer_public_key: String,
    pub id: u64,
    pub block_height: u64,
    pub capacity: u64,
    pub base_fee: u64,
    pub fee_rate: u64,
    pub inbound_base_fee: i64,
    pub inbound_fee_rate: i64,
    pub min_htlc: u64,
    pub max_htlc: u64,
}

/// A node's centrality values.
#[derive(Clone, Copy, Default, Serialize)]
pub struct Centrality {
    pub degree: f64,
    pub betweenness: f64,
    pub eigenvector: u64,
    pub closeness: f64,
}

/// Builds a new network graph view with scores and centralities computed.
///
/// The announced graph is filtered down to nodes worth ranking before any
/// centrality work, which keeps allocations and computation bounded.
pub async fn new(
    token: &CancellationToken,
    open_weights: &OpenWeights,
    lnd: &impl LightningClient,
) -> Result<Graph> {
    let graph = lnd.describe_graph().await?;

    let nodes_len = graph.nodes.len();
    if nodes_len == 0 {
        return Err(Error::GraphEmpty);
    }

    let mut total_capacity: u64 = 0;
    let mut channels: HashMap<String, Vec<Channel>> = HashMap::with_capacity(nodes_len * 2);
    let mut skipped_channels = 0;

    for edge in &graph.edges {
        total_capacity += edge.capacity as u64;

        // New channels may be processed by our node before they are fully
        // propagated. Skip channels whose information isn't available yet.
        if edge.node1_policy.is_none() && edge.node2_policy.is_none() {
            skipped_channels += 1;
            continue;
        }

        let block_height = channel_block_height(edge.channel_id);

        if let Some(policy) = keep_policy(edge.node1_policy.as_ref()) {
            channels
                .entry(edge.node1_pub.clone())
                .or_default()
                .push(edge_channel(edge, policy, &edge.node2_pub, block_height));
        }

        if let Some(policy) = keep_policy(edge.node2_policy.as_ref()) {
            channels
                .entry(edge.node2_pub.clone())
                .or_default()
                .push(edge_channel(edge, policy, &edge.node1_pub, block_height));
        }
    }

    // The graph is too stale to trust if more than half of its channels
    // were skipped for incompleteness
    if skipped_channels > graph.edges.len() / 2 {
        return Err(Error::GraphIncomplete(skipped_channels));
    }

    let avg_node_size = total_capacity / nodes_len as u64;
    let total_num_channels = graph.edges.len();
    let avg_num_channels = total_num_channels / nodes_len;

    let mut nodes = Vec::with_capacity(nodes_len);
    let mut node_indices = HashMap::with_capacity(nodes_len);

    for (i, node) in graph.nodes.iter().enumerate() {
        node_indices.insert(node.pub_key.clone(), i);

        let node_channels = channels.get(&node.pub_key).cloned().unwrap_or_default();
        let capacity: u64 = node_channels.iter().map(|channel| channel.capacity).sum();

        // Discard nodes we know won't be ranked at the top to reduce the
        // size of the adjacency list
        if node.addresses.is_empty()
            || capacity < avg_node_size
            || node_channels.len() < avg_num_channels
        {
            continue;
        }

        nodes.push(Node {
            alias: node.alias.clone(),
            public_key: node.pub_key.clone(),
            num_features: num_features(&node.features),
            capacity,
            centrality: Centrality::default(),
            addresses: addresses(&node.addresses),
            channels: node_channels,
        });
    }

    debug!(
        "Graph: {} nodes kept out of {nodes_len}, {skipped_channels} channels skipped",
        nodes.len()
    );

    // Centralities are computed only after filtering to avoid big amounts
    // of allocations and to speed up the calculations
    let adj_list = Arc::new(adjacency_list(&nodes, &node_indices, nodes_len));
    let (sum_distances, betweenness) = centrality::centrality(token, Arc::clone(&adj_list)).await?;
    let eigenvector = centrality::eigenvector_centrality(&adj_list);

    let mut heuristics = Heuristics::new(open_weights);
    let kept_len = nodes.len();

    for node in &mut nodes {
        let index = node_indices[&node.public_key];
        let node_distances = sum_distances[index];

        // A distance sum of zero means all of the node's peers were
        // filtered out
        let closeness = if node_distances == 0 {
            0.0
        } else {
            (kept_len - 1) as f64 / node_distances as f64
        };

        node.centrality = Centrality {
            degree: node.channels.len() as f64 / total_num_channels as f64,
            betweenness: betweenness[index],
            closeness,
            eigenvector: eigenvector[index],
        };

        heuristics.update(node);
    }

    Ok(Graph { heuristics, nodes })
}

/// Maps every node to a dense index and records its channel peers'
/// indices. Nothing owns another node; all edges are indices.
fn adjacency_list(
    nodes: &[Node],
    node_indices: &HashMap<String, usize>,
    total_len: usize,
) -> Vec<Vec<usize>> {
    let mut adj_list = vec![Vec::new(); total_len];

    for node in nodes {
        let i = node_indices[&node.public_key];
        for channel in &node.channels {
            if let Some(&j) = node_indices.get(&channel.peer_public_key) {
                adj_list[i].push(j);
            }
        }
    }

    adj_list
}

/// Returns the policy if the resulting directed channel should be included
/// in the view.
fn keep_policy(policy: Option<&lnrpc::RoutingPolicy>) -> Option<&lnrpc::RoutingPolicy> {
    policy.filter(|p| {
        !p.disabled && p.fee_rate_milli_msat <= MAX_FEE_RATE_PPM && p.fee_base_msat <= MAX_BASE_FEE_MSAT
    })
}

fn edge_channel(
    edge: &lnrpc::ChannelEdge,
    policy: &lnrpc::RoutingPolicy,
    peer_public_key: &str,
    block_height: u32,
) -> Channel {
    Channel {
        id: edge.channel_id,
        block_height: block_height as u64,
        point: edge.chan_point.clone(),
        peer_public_key: peer_public_key.to_string(),
        capacity: edge.capacity as u64,
        base_fee: policy.fee_base_msat as u64,
        fee_rate: policy.fee_rate_milli_msat as u64,
        inbound_base_fee: policy.inbound_fee_base_msat as i64,
        inbound_fee_rate: policy.inbound_fee_rate_milli_msat as i64,
        min_htlc: policy.min_htlc as u64,
        max_htlc: policy.max_htlc_msat,
    }
}

/// Returns the block height at which a channel was established based on
/// its ID. The daemon encodes the funding height in the top 24 bits.
pub fn channel_block_height(channel_id: u64) -> u32 {
    ((channel_id >> 40) & 0xFF_FFFF) as u32
}

/// Parses node addresses into a plain string list.
pub fn addresses(addresses: &[lnrpc::NodeAddress]) -> Vec<String> {
    addresses.iter().map(|address| address.addr.clone()).collect()
}

/// Returns the number of known features supported by the node.
pub fn num_features(features: &HashMap<u32, lnrpc::Feature>) -> u64 {
    features.values().filter(|feature| feature.is_known).count() as u64
}
