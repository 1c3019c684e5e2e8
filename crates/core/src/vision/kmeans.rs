use rand::{rngs::StdRng, Rng, SeedableRng};

/// One k-means cluster in RGB `[0, 1]` space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub centroid: [f32; 3],
    pub count: usize,
}

fn distance_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(centroids: &[[f32; 3]], sample: &[f32; 3]) -> usize {
    let mut best = (0, f32::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let d = distance_sq(centroid, sample);
        if d < best.1 {
            best = (index, d);
        }
    }
    best.0
}

/// Seeded k-means++ clustering. Returns non-empty clusters, largest first.
/// Inputs with fewer distinct colors than `k` yield fewer clusters.
pub fn kmeans(samples: &[[f32; 3]], k: usize, max_iterations: usize, seed: u64) -> Vec<Cluster> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);

    let mut centroids: Vec<[f32; 3]> = vec![samples[rng.random_range(0..samples.len())]];
    let mut nearest_sq: Vec<f32> = samples
        .iter()
        .map(|s| distance_sq(s, &centroids[0]))
        .collect();
    while centroids.len() < k {
        let total: f32 = nearest_sq.iter().sum();
        if total <= f32::EPSILON {
            break;
        }
        let mut target = rng.random::<f32>() * total;
        let mut chosen = samples.len() - 1;
        for (index, weight) in nearest_sq.iter().enumerate() {
            if target < *weight {
                chosen = index;
                break;
            }
            target -= weight;
        }
        let centroid = samples[chosen];
        for (slot, sample) in nearest_sq.iter_mut().zip(samples) {
            *slot = slot.min(distance_sq(sample, &centroid));
        }
        centroids.push(centroid);
    }

    let mut assignment = vec![0usize; samples.len()];
    for iteration in 0..max_iterations.max(1) {
        let mut changed = false;
        for (slot, sample) in assignment.iter_mut().zip(samples) {
            let index = nearest(&centroids, sample);
            if *slot != index {
                *slot = index;
                changed = true;
            }
        }

        let mut sums = vec![[0.0_f32; 3]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (index, sample) in assignment.iter().zip(samples) {
            for c in 0..3 {
                sums[*index][c] += sample[c];
            }
            counts[*index] += 1;
        }
        for (centroid, (sum, count)) in centroids.iter_mut().zip(sums.iter().zip(&counts)) {
            if *count > 0 {
                *centroid = sum.map(|v| v / *count as f32);
            }
        }

        if !changed && iteration > 0 {
            break;
        }
    }

    let mut counts = vec![0usize; centroids.len()];
    for index in &assignment {
        counts[*index] += 1;
    }
    let mut clusters: Vec<Cluster> = centroids
        .into_iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(centroid, count)| Cluster { centroid, count })
        .collect();
    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    clusters
}
