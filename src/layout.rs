//! Seeded spring-embedding layout for collaboration graphs.
//!
//! Fruchterman–Reingold force simulation: all node pairs repel, edges
//! attract proportionally to their weight, displacement is capped by a
//! cooling temperature. The RNG only seeds the initial positions, so a
//! fixed seed gives identical coordinates run after run.

use petgraph::graph::Graph;
use petgraph::visit::EdgeRef;
use petgraph::Undirected;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Knobs of the spring embedding. `k` is the optimal node distance; when
/// unset it defaults to `sqrt(1/n)` for n nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    pub seed: u64,
    pub iterations: usize,
    pub k: Option<f64>,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            iterations: 50,
            k: None,
        }
    }
}

const MIN_DISTANCE: f64 = 1e-9;

/// Positions per node index, rescaled into the [-1, 1] square.
pub fn spring_layout<N>(graph: &Graph<N, u32, Undirected>, opts: &LayoutOptions) -> Vec<[f64; 2]> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![[0.0, 0.0]];
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut positions: Vec<[f64; 2]> = (0..n).map(|_| [rng.gen::<f64>(), rng.gen::<f64>()]).collect();

    let k = opts.k.unwrap_or_else(|| (1.0 / n as f64).sqrt());
    let mut temperature = 0.1;
    let cooling = temperature / (opts.iterations as f64 + 1.0);

    let mut displacement = vec![[0.0f64; 2]; n];
    for _ in 0..opts.iterations {
        for d in displacement.iter_mut() {
            *d = [0.0, 0.0];
        }

        // pairwise repulsion
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = positions[i][0] - positions[j][0];
                let dy = positions[i][1] - positions[j][1];
                let dist = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
                let force = k * k / dist;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                displacement[i][0] += fx;
                displacement[i][1] += fy;
                displacement[j][0] -= fx;
                displacement[j][1] -= fy;
            }
        }

        // weighted attraction along edges
        for edge in graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let weight = f64::from(*edge.weight());
            let dx = positions[a][0] - positions[b][0];
            let dy = positions[a][1] - positions[b][1];
            let dist = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
            let force = dist * dist / k * weight;
            let (fx, fy) = (dx / dist * force, dy / dist * force);
            displacement[a][0] -= fx;
            displacement[a][1] -= fy;
            displacement[b][0] += fx;
            displacement[b][1] += fy;
        }

        // move, capped by the current temperature
        for i in 0..n {
            let [dx, dy] = displacement[i];
            let length = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
            let step = length.min(temperature);
            positions[i][0] += dx / length * step;
            positions[i][1] += dy / length * step;
        }
        temperature -= cooling;
    }

    rescale(&mut positions);
    positions
}

/// Center on the origin and scale the largest coordinate to 1.
fn rescale(positions: &mut [[f64; 2]]) {
    let n = positions.len() as f64;
    let (mut cx, mut cy) = (0.0, 0.0);
    for p in positions.iter() {
        cx += p[0];
        cy += p[1];
    }
    (cx, cy) = (cx / n, cy / n);

    let mut max_abs: f64 = 0.0;
    for p in positions.iter_mut() {
        p[0] -= cx;
        p[1] -= cy;
        max_abs = max_abs.max(p[0].abs()).max(p[1].abs());
    }
    if max_abs > 0.0 {
        for p in positions.iter_mut() {
            p[0] /= max_abs;
            p[1] /= max_abs;
        }
    }
}
