use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Computes the sum of the shortest path distances from every node and the
/// betweenness centrality of each node.
///
/// One task per source node runs in parallel, bounded by the number of
/// CPUs. Each task writes its distance sum to its own slot; the betweenness
/// accumulator is folded into a shared vector under a single mutex, once
/// per source. The result is deterministic for a fixed adjacency list.
pub async fn centrality(
    token: &CancellationToken,
    adj_list: Arc<Vec<Vec<usize>>>,
) -> Result<(Vec<i64>, Vec<f64>)> {
    let nodes_len = adj_list.len();
    let mut sum_distances = vec![0_i64; nodes_len];
    let betweenness = Arc::new(Mutex::new(vec![0.0_f64; nodes_len]));

    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let semaphore = Arc::new(Semaphore::new(parallelism));
    let mut tasks = JoinSet::new();

    for source in 0..nodes_len {
        if token.is_cancelled() {
            tasks.abort_all();
            return Err(Error::Cancelled);
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;
        let adj_list = Arc::clone(&adj_list);
        let betweenness = Arc::clone(&betweenness);

        tasks.spawn_blocking(move || {
            let _permit = permit;
            let (distances, bc) = node_centrality(&adj_list, source);

            let mut sum = 0_i64;
            for distance in distances {
                if distance == -1 {
                    // The node is no longer in the graph, it was filtered out
                    break;
                }
                sum += distance;
            }

            let mut accumulator = betweenness.lock().unwrap();
            for (i, value) in bc.iter().enumerate() {
                accumulator[i] += value;
            }

            (source, sum)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let Ok((source, sum)) = joined else {
            return Err(Error::Cancelled);
        };
        sum_distances[source] = sum;
    }

    let betweenness = betweenness.lock().unwrap().clone();
    Ok((sum_distances, betweenness))
}

/// Four unnormalized power iterations starting from each node's peer
/// count. Enough to rank the well-connected-to-the-well-connected.
pub fn eigenvector_centrality(adj_list: &[Vec<usize>]) -> Vec<u64> {
    let iterations = 4;
    let mut current: Vec<u64> = adj_list.iter().map(|peers| peers.len() as u64).collect();

    for _ in 1..iterations {
        current = adj_list
            .iter()
            .map(|peers| peers.iter().map(|&peer| current[peer]).sum())
            .collect();
    }

    current
}

/// Returns the shortest path distances from the node `s` and the partial
/// betweenness centrality contributions of this source.
///
/// We first calculate the shortest paths from the start node s to all other
/// nodes with BFS, then update the betweenness centrality values by using
/// Brandes' backpropagation of dependencies trick.
///
/// For a detailed explanation please read:
/// https://www.cl.cam.ac.uk/teaching/1617/MLRD/handbook/brandes.html
fn node_centrality(adj_list: &[Vec<usize>], s: usize) -> (Vec<i64>, Vec<f64>) {
    // s = src node
    // t = dst node
    // v = intermediate node
    // w = intermediate node
    let nodes_len = adj_list.len();

    // pred[w] is the list of nodes that immediately precede w on a
    // shortest path from s to t for each node t.
    let mut pred: Vec<Vec<usize>> = vec![Vec::new(); nodes_len];

    // sigma[t] is the number of shortest paths between nodes s and t
    // for each node t.
    let mut sigma = vec![0.0_f64; nodes_len];
    sigma[s] = 1.0;

    // distances[t] holds the distance between s and t for each node t,
    // initialized to -1 (meaning infinity) for each t != s.
    let mut distances = vec![-1_i64; nodes_len];
    distances[s] = 0;

    let mut stack = Vec::with_capacity(nodes_len);
    let mut queue = VecDeque::with_capacity(nodes_len);
    queue.push_back(s);

    // BFS to calculate the shortest paths (sigma and pred) from s to t for
    // each node t.
    while let Some(v) = queue.pop_front() {
        stack.push(v);

        for &w in &adj_list[v] {
            // If the distance from s to w is infinity (-1), set it and
            // enqueue w.
            if distances[w] < 0 {
                distances[w] = distances[v] + 1;
                queue.push_back(w);
            }

            // If w is on a shortest path, update sigma and add v to w's
            // predecessor list.
            if distances[w] == distances[v] + 1 {
                sigma[w] += sigma[v];
                pred[w].push(v);
            }
        }
    }

    // delta[v] is the ratio of the shortest paths between s and t that go
    // through v and the total number of shortest paths between s and t.
    // The centrality is then simply the sum of delta[w] for each w != s.
    let mut delta = vec![0.0_f64; nodes_len];
    let mut bc = vec![0.0_f64; nodes_len];

    // Visited nodes pop off the stack in non-increasing distance order
    while let Some(w) = stack.pop() {
        for &v in &pred[w] {
            // Update delta using Brandes' equation
            delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
        }

        if w != s {
            // Divide by two as this is an undirected graph
            bc[w] += delta[w] / 2.0;
        }
    }

    (distances, bc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: usize = 0;
    const BOB: usize = 1;
    const CAROL: usize = 2;
    const DAVE: usize = 3;
    const ERIN: usize = 4;
    const FRANK: usize = 5;
    const GEORGE: usize = 6;
    const HAROLD: usize = 7;

    fn adj_list() -> Vec<Vec<usize>> {
        vec![
            vec![CAROL, FRANK],
            vec![DAVE],
            vec![ALICE, ERIN],
            vec![BOB, ERIN, FRANK],
            vec![CAROL, DAVE, GEORGE],
            vec![ALICE, DAVE, HAROLD],
            vec![ERIN],
            vec![FRANK],
        ]
    }

    #[tokio::test]
    async fn test_centrality() {
        let expected_distances = vec![14, 17, 14, 11, 12, 12, 18, 18];
        let expected_centrality = vec![2.0, 0.0, 2.0, 10.0, 8.0, 8.0, 0.0, 0.0];

        let token = CancellationToken::new();
        let (distances, centrality) = centrality(&token, Arc::new(adj_list())).await.unwrap();

        assert_eq!(distances, expected_distances);
        assert_eq!(centrality, expected_centrality);
    }

    #[tokio::test]
    async fn test_centrality_deterministic() {
        // The parallel fan-out must not change results across runs
        let token = CancellationToken::new();
        let adj = Arc::new(adj_list());

        let (first_distances, first_centrality) =
            centrality(&token, Arc::clone(&adj)).await.unwrap();

        for _ in 0..5 {
            let (distances, bc) = centrality(&token, Arc::clone(&adj)).await.unwrap();
            assert_eq!(distances, first_distances);
            for (a, b) in bc.iter().zip(&first_centrality) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[tokio::test]
    async fn test_centrality_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let result = centrality(&token, Arc::new(adj_list())).await;
        assert!(matches!(result, Err(crate::error::Error::Cancelled)));
    }

    #[test]
    fn test_eigenvector_centrality() {
        let expected = vec![26, 15, 26, 37, 32, 32, 15, 15];
        assert_eq!(eigenvector_centrality(&adj_list()), expected);
    }

    #[test]
    fn test_node_centrality() {
        let expected_distances = vec![0, 3, 1, 2, 2, 1, 3, 2];
        let expected_centrality = vec![0.0, 0.0, 1.0, 0.5, 0.5, 1.5, 0.0, 0.0];

        let (distances, centrality) = node_centrality(&adj_list(), ALICE);

        assert_eq!(distances, expected_distances);
        assert_eq!(centrality, expected_centrality);
    }

    #[test]
    fn test_node_centrality_isolated() {
        let adj = vec![vec![1], vec![0], vec![]];
        let (distances, _) = node_centrality(&adj, 2);

        assert_eq!(distances, vec![-1, -1, 0]);
    }
}
