use crate::config::OpenWeights;
use crate::graph::Node;
use crate::heuristic::Heuristic;
use serde::Serialize;

/// Information collected from the network graph used to decide which nodes
/// to open channels to.
#[derive(Serialize)]
pub struct Heuristics {
    pub capacity: Heuristic<u64>,
    pub features: Heuristic<u64>,
    pub hybrid: Heuristic<u64>,
    pub base_fee: Heuristic<u64>,
    pub fee_rate: Heuristic<u64>,
    pub inbound_base_fee: Heuristic<i64>,
    pub inbound_fee_rate: Heuristic<i64>,
    pub min_htlc: Heuristic<u64>,
    pub max_htlc: Heuristic<u64>,
    pub block_height: Heuristic<u64>,
    pub degree_centrality: Heuristic<f64>,
    pub betweenness_centrality: Heuristic<f64>,
    pub eigenvector_centrality: Heuristic<u64>,
    pub closeness_centrality: Heuristic<f64>,
}

impl Heuristics {
    pub fn new(weights: &OpenWeights) -> Self {
        Heuristics {
            capacity: Heuristic::new(weights.capacity, false),
            features: Heuristic::new(weights.features, false),
            hybrid: Heuristic::with_range(0, 1, weights.hybrid, false),
            degree_centrality: Heuristic::new(weights.degree_centrality, false),
            betweenness_centrality: Heuristic::new(weights.betweenness_centrality, false),
            closeness_centrality: Heuristic::new(weights.closeness_centrality, false),
            eigenvector_centrality: Heuristic::new(weights.eigenvector_centrality, false),
            base_fee: Heuristic::new(weights.base_fee, true),
            fee_rate: Heuristic::new(weights.fee_rate, true),
            inbound_base_fee: Heuristic::new(weights.inbound_base_fee, true),
            inbound_fee_rate: Heuristic::new(weights.inbound_fee_rate, true),
            min_htlc: Heuristic::new(weights.min_htlc, true),
            max_htlc: Heuristic::new(weights.max_htlc, false),
            block_height: Heuristic::new(weights.block_height, true),
        }
    }

    /// Updates the heuristics based on the node values.
    pub fn update(&mut self, node: &Node) {
        self.capacity.update(node.capacity);
        self.features.update(node.num_features);
        self.degree_centrality.update(node.centrality.degree);
        self.betweenness_centrality.update(node.centrality.betweenness);
        self.eigenvector_centrality.update(node.centrality.eigenvector);
        self.closeness_centrality.update(node.centrality.closeness);

        for channel in &node.channels {
            self.base_fee.update(channel.base_fee);
            self.fee_rate.update(channel.fee_rate);
            self.inbound_base_fee.update(channel.inbound_base_fee);
            self.inbound_fee_rate.update(channel.inbound_fee_rate);
            self.min_htlc.update(channel.min_htlc);
            self.max_htlc.update(channel.max_htlc);
            self.block_height.update(channel.block_height);
        }
    }

    /// Returns a node's score based on the heuristics collected, rounded
    /// to three decimal places. Per-channel dimensions contribute their
    /// mean over the node's channels.
    pub fn score(&self, node: &Node) -> f64 {
        let mut score = 0.0;
        score += self.capacity.score(node.capacity);
        score += self.features.score(node.num_features);
        score += self.degree_centrality.score(node.centrality.degree);
        score += self.betweenness_centrality.score(node.centrality.betweenness);
        score += self.eigenvector_centrality.score(node.centrality.eigenvector);
        score += self.closeness_centrality.score(node.centrality.closeness);

        let hybrid = u64::from(is_hybrid(&node.addresses));
        score += self.hybrid.score(hybrid);

        if !node.channels.is_empty() {
            let mut channels_score = 0.0;
            for channel in &node.channels {
                channels_score += self.base_fee.score(channel.base_fee);
                channels_score += self.fee_rate.score(channel.fee_rate);
                channels_score += self.inbound_base_fee.score(channel.inbound_base_fee);
                channels_score += self.inbound_fee_rate.score(channel.inbound_fee_rate);
                channels_score += self.min_htlc.score(channel.min_htlc);
                channels_score += self.max_htlc.score(channel.max_htlc);
                channels_score += self.block_height.score(channel.block_height);
            }

            score += channels_score / node.channels.len() as f64;
        }

        (score * 1000.0).round() / 1000.0
    }
}

/// Whether the node is reachable on both clearnet and Tor.
pub fn is_hybrid(addresses: &[String]) -> bool {
    let mut has_clearnet = false;
    let mut has_tor = false;

    for address in addresses {
        let host = address.split(':').next().unwrap_or(address);
        if host.ends_with(".onion") {
            has_tor = true;
            continue;
        }
        has_clearnet = true;
    }

    has_clearnet && has_tor
}
