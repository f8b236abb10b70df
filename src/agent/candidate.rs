use crate::graph::{self, Graph};
use crate::local;
use log::{debug, info};
use serde::Serialize;

const ONE_DAY_IN_BLOCKS: u32 = 144;
const ONE_MONTH_IN_BLOCKS: u32 = ONE_DAY_IN_BLOCKS * 30;
const THREE_MONTHS_IN_BLOCKS: u32 = ONE_MONTH_IN_BLOCKS * 3;

// Candidates sharing more than this percentage of our channel peers are
// considered too clustered around us to add routing value.
const SHARED_PEERS_PERCENT: u64 = 30;
const SHARED_PEERS_MIN_CHANNELS: usize = 10;

/// A node we might open a channel with.
#[derive(Clone, Serialize)]
pub struct NodeCandidate {
    pub public_key: String,
    #[serde(skip)]
    pub addresses: Vec<String>,
    pub score: f64,
}

/// A channel we might close.
#[derive(Clone, Serialize)]
pub struct ChannelCandidate {
    pub channel_point: String,
    pub active: bool,
    pub score: f64,
}

/// Returns a ranking with candidates to open a channel to, best first.
pub fn candidate_nodes(
    local_node: &local::Node,
    graph: &Graph,
    blocklist: &[String],
) -> Vec<NodeCandidate> {
    info!("Agent: getting candidate nodes to open a channel with");
    let mut candidates = Vec::with_capacity(graph.nodes.len());

    for node in &graph.nodes {
        if let Err(reason) = discard_node(local_node, node, blocklist) {
            debug!("Agent: discarding candidate node {:?}: {reason}", node.public_key);
            continue;
        }

        candidates.push(NodeCandidate {
            public_key: node.public_key.clone(),
            addresses: node.addresses.clone(),
            score: graph.heuristics.score(node),
        });
    }

    // Stable sort keeps ties in pre-sort order
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    debug!(
        "Agent: candidate nodes: {}",
        serde_json::to_string(&candidates).unwrap_or_default()
    );

    candidates
}

/// Returns the reason a node should be skipped, if any.
fn discard_node(
    local_node: &local::Node,
    peer_node: &graph::Node,
    blocklist: &[String],
) -> Result<(), String> {
    if blocklist.contains(&peer_node.public_key) {
        return Err("blocklisted".to_string());
    }

    if local_node.channel_peers.contains(&peer_node.public_key) {
        return Err("already sharing a channel".to_string());
    }

    // Count the channel peers shared between the local and candidate nodes
    let num_shared_peers = peer_node
        .channels
        .iter()
        .filter(|channel| local_node.channel_peers.contains(&channel.peer_public_key))
        .count() as u64;

    let shared_peers_threshold = super::percentage(
        local_node.channel_peers.len() as u64,
        SHARED_PEERS_PERCENT,
    );
    if local_node.channel_peers.len() >= SHARED_PEERS_MIN_CHANNELS
        && num_shared_peers > shared_peers_threshold
    {
        return Err(format!("sharing too many channel peers ({num_shared_peers})"));
    }

    // i32 avoids underflow on young chains
    let three_months_ago = local_node.current_block_height as i32 - THREE_MONTHS_IN_BLOCKS as i32;

    for closed_channel in &local_node.closed_channels {
        if closed_channel.remote_public_key != peer_node.public_key {
            continue;
        }

        if closed_channel.close_height != 0 && closed_channel.close_height as i32 > three_months_ago
        {
            return Err(format!(
                "a channel was closed with this peer within the last {THREE_MONTHS_IN_BLOCKS} blocks"
            ));
        }

        if closed_channel.close_type == local::CloseType::FundingCanceled
            && closed_channel.open_initiator == local::Initiator::Local
            && graph::channel_block_height(closed_channel.channel_id) as i32 > three_months_ago
        {
            return Err(format!(
                "we failed opening a channel with this peer within the last {THREE_MONTHS_IN_BLOCKS} blocks"
            ));
        }
    }

    // Our own node may be in the graph
    if local_node.public_key == peer_node.public_key {
        return Err("own node".to_string());
    }

    Ok(())
}

/// Returns a ranking with the candidate channels to close, most expendable
/// (lowest score) first.
pub fn candidate_channels(local_node: &local::Node, keeplist: &[String]) -> Vec<ChannelCandidate> {
    info!("Agent: getting candidate channels to close");

    let mut candidates = Vec::with_capacity(local_node.channels.list.len());

    for channel in &local_node.channels.list {
        if keeplist.contains(&channel.point) {
            debug!(
                "Agent: discarding candidate channel {:?}: channel point is in the keeplist",
                channel.point
            );
            continue;
        }

        candidates.push(ChannelCandidate {
            channel_point: channel.point.clone(),
            active: channel.active,
            score: local_node.channels.heuristics.score(channel),
        });
    }

    candidates.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

    debug!(
        "Agent: candidate channels: {}",
        serde_json::to_string(&candidates).unwrap_or_default()
    );

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_CLOSE_WEIGHTS, DEFAULT_OPEN_WEIGHTS};
    use crate::graph::{Centrality, Graph};
    use crate::local::channel::{Channel, Channels};
    use crate::local::heuristic::Heuristics;

    fn graph_node(public_key: &str, peers: &[&str]) -> graph::Node {
        graph::Node {
            alias: public_key.to_uppercase(),
            public_key: public_key.to_string(),
            num_features: 4,
            capacity: 1_000_000,
            centrality: Centrality::default(),
            addresses: vec![format!("{public_key}.host:9735")],
            channels: peers
                .iter()
                .map(|peer| graph::Channel {
                    peer_public_key: peer.to_string(),
                    capacity: 1_000_000 / peers.len() as u64,
                    ..Default::default()
                })
                .collect(),
        }
    }

    fn local_node(channel_peers: &[&str]) -> local::Node {
        local::Node {
            public_key: "self".to_string(),
            channel_peers: channel_peers.iter().map(|p| p.to_string()).collect(),
            current_block_height: 850_000,
            ..Default::default()
        }
    }

    fn make_graph(nodes: Vec<graph::Node>) -> Graph {
        let mut heuristics = graph::heuristic::Heuristics::new(&DEFAULT_OPEN_WEIGHTS);
        for node in &nodes {
            heuristics.update(node);
        }
        Graph { heuristics, nodes }
    }

    #[test]
    fn test_candidate_nodes_sorted_descending() {
        let graph = make_graph(vec![
            graph_node("small", &["x"]),
            graph_node("big", &["x", "y", "z"]),
        ]);
        let local_node = local_node(&[]);

        let candidates = candidate_nodes(&local_node, &graph, &[]);

        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].score >= candidates[1].score);
    }

    #[test]
    fn test_discard_blocklisted() {
        let node = graph_node("mallory", &[]);
        let local = local_node(&[]);

        let err = discard_node(&local, &node, &["mallory".to_string()]).unwrap_err();
        assert_eq!(err, "blocklisted");
    }

    #[test]
    fn test_discard_already_peered() {
        let node = graph_node("alice", &[]);
        let local = local_node(&["alice"]);

        let err = discard_node(&local, &node, &[]).unwrap_err();
        assert_eq!(err, "already sharing a channel");
    }

    #[test]
    fn test_discard_too_clustered() {
        // Our channel-peer set has 10 members; the candidate shares 4 of
        // them, above 30% of 10
        let peers: Vec<String> = (0..10).map(|i| format!("peer_{i}")).collect();
        let peer_refs: Vec<&str> = peers.iter().map(String::as_str).collect();
        let local = local_node(&peer_refs);

        let node = graph_node("hub", &["peer_0", "peer_1", "peer_2", "peer_3"]);
        let err = discard_node(&local, &node, &[]).unwrap_err();
        assert!(err.contains("sharing too many channel peers"));

        // Sharing exactly the threshold is fine
        let node = graph_node("hub", &["peer_0", "peer_1", "peer_2"]);
        assert!(discard_node(&local, &node, &[]).is_ok());
    }

    #[test]
    fn test_discard_not_clustered_with_few_channels() {
        // Below 10 channel peers the clustering rule does not apply
        let local = local_node(&["peer_0", "peer_1"]);
        let node = graph_node("hub", &["peer_0", "peer_1"]);

        assert!(discard_node(&local, &node, &[]).is_ok());
    }

    #[test]
    fn test_discard_recently_closed() {
        let mut local = local_node(&[]);
        local.closed_channels = vec![local::ClosedChannel {
            channel_id: 1,
            remote_public_key: "dave".to_string(),
            close_height: 850_000 - ONE_MONTH_IN_BLOCKS,
            close_type: local::CloseType::Cooperative,
            open_initiator: local::Initiator::Local,
        }];

        let node = graph_node("dave", &[]);
        let err = discard_node(&local, &node, &[]).unwrap_err();
        assert!(err.contains("a channel was closed with this peer"));
    }

    #[test]
    fn test_discard_old_close_is_fine() {
        let mut local = local_node(&[]);
        local.closed_channels = vec![local::ClosedChannel {
            channel_id: 1,
            remote_public_key: "dave".to_string(),
            close_height: 850_000 - THREE_MONTHS_IN_BLOCKS - 1,
            close_type: local::CloseType::Cooperative,
            open_initiator: local::Initiator::Local,
        }];

        let node = graph_node("dave", &[]);
        assert!(discard_node(&local, &node, &[]).is_ok());
    }

    #[test]
    fn test_discard_recent_funding_cancel() {
        // The failed funding attempt has no close height; its age is
        // derived from the channel id
        let open_height = 850_000 - ONE_MONTH_IN_BLOCKS;
        let mut local = local_node(&[]);
        local.closed_channels = vec![local::ClosedChannel {
            channel_id: (open_height as u64) << 40,
            remote_public_key: "erin".to_string(),
            close_height: 0,
            close_type: local::CloseType::FundingCanceled,
            open_initiator: local::Initiator::Local,
        }];

        let node = graph_node("erin", &[]);
        let err = discard_node(&local, &node, &[]).unwrap_err();
        assert!(err.contains("we failed opening a channel"));
    }

    #[test]
    fn test_discard_remote_funding_cancel_is_fine() {
        let open_height = 850_000 - ONE_MONTH_IN_BLOCKS;
        let mut local = local_node(&[]);
        local.closed_channels = vec![local::ClosedChannel {
            channel_id: (open_height as u64) << 40,
            remote_public_key: "erin".to_string(),
            close_height: 0,
            close_type: local::CloseType::FundingCanceled,
            open_initiator: local::Initiator::Remote,
        }];

        let node = graph_node("erin", &[]);
        assert!(discard_node(&local, &node, &[]).is_ok());
    }

    #[test]
    fn test_discard_own_node() {
        let local = local_node(&[]);
        let node = graph_node("self", &[]);

        let err = discard_node(&local, &node, &[]).unwrap_err();
        assert_eq!(err, "own node");
    }

    #[test]
    fn test_candidate_channels_sorted_ascending() {
        let mut heuristics = Heuristics::new(&DEFAULT_CLOSE_WEIGHTS);
        let list = vec![
            Channel {
                point: "busy:0".to_string(),
                active: true,
                capacity: 5_000_000,
                num_forwards: 100,
                forwards_amount: 90_000_000,
                fees: 50_000,
                ..Default::default()
            },
            Channel {
                point: "idle:0".to_string(),
                active: true,
                capacity: 1_000_000,
                num_forwards: 1,
                forwards_amount: 1_000,
                fees: 1,
                ..Default::default()
            },
        ];
        for channel in &list {
            heuristics.update(channel);
        }

        let mut node = local_node(&[]);
        node.channels = Channels { list, heuristics };

        let candidates = candidate_channels(&node, &[]);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].channel_point, "idle:0");
        assert!(candidates[0].score <= candidates[1].score);
    }

    #[test]
    fn test_candidate_channels_keeplist() {
        let mut node = local_node(&[]);
        node.channels = Channels {
            list: vec![
                Channel {
                    point: "keep:0".to_string(),
                    ..Default::default()
                },
                Channel {
                    point: "close:1".to_string(),
                    ..Default::default()
                },
            ],
            heuristics: Heuristics::new(&DEFAULT_CLOSE_WEIGHTS),
        };

        let candidates = candidate_channels(&node, &["keep:0".to_string()]);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].channel_point, "close:1");
    }
}
