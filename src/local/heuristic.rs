use crate::config::CloseWeights;
use crate::heuristic::Heuristic;
use crate::local::channel::Channel;
use serde::Serialize;

/// Information collected from the local channels used to decide which ones
/// to close.
#[derive(Serialize)]
pub struct Heuristics {
    pub active: Heuristic<u64>,
    pub capacity: Heuristic<u64>,
    pub num_forwards: Heuristic<u64>,
    pub forwards_amount: Heuristic<u64>,
    pub fees: Heuristic<u64>,
    pub ping_time: Heuristic<u64>,
    pub block_height: Heuristic<u64>,
    pub flap_count: Heuristic<u64>,
}

impl Default for Heuristics {
    fn default() -> Self {
        Heuristics::new(&CloseWeights::default())
    }
}

impl Heuristics {
    pub fn new(weights: &CloseWeights) -> Self {
        Heuristics {
            active: Heuristic::with_range(0, 1, weights.active, false),
            capacity: Heuristic::new(weights.capacity, false),
            num_forwards: Heuristic::new(weights.num_forwards, false),
            forwards_amount: Heuristic::new(weights.forwards_amount, false),
            fees: Heuristic::new(weights.fees, false),
            // Older channels rate better, and so do lower heights
            block_height: Heuristic::new(weights.age, true),
            ping_time: Heuristic::new(weights.ping_time, true),
            flap_count: Heuristic::new(weights.flap_count, true),
        }
    }

    /// Updates the heuristics based on the channel values.
    pub fn update(&mut self, channel: &Channel) {
        self.capacity.update(channel.capacity);
        self.num_forwards.update(channel.num_forwards);
        self.forwards_amount.update(channel.forwards_amount);
        self.fees.update(channel.fees);
        self.block_height.update(channel.block_height as u64);
        self.ping_time.update(channel.ping_time as u64);
        self.flap_count.update(channel.flap_count as u64);
    }

    /// Returns a channel's score based on the heuristics collected,
    /// rounded to three decimal places.
    pub fn score(&self, channel: &Channel) -> f64 {
        let mut score = 0.0;
        score += self.active.score(u64::from(channel.active));
        score += self.capacity.score(channel.capacity);
        score += self.block_height.score(channel.block_height as u64);
        score += self.num_forwards.score(channel.num_forwards);
        score += self.forwards_amount.score(channel.forwards_amount);
        score += self.fees.score(channel.fees);
        score += self.ping_time.score(channel.ping_time as u64);
        score += self.flap_count.score(channel.flap_count as u64);

        (score * 1000.0).round() / 1000.0
    }
}
