//! Learner segmentation with seeded k-means++.
//!
//! Features are standardised per column before fitting so response time
//! (tens of seconds) does not swamp accuracy (a fraction). Every run refits
//! from scratch; there is no incremental update.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::SegmentationConfig;
use crate::error::{PipelineError, Result};
use crate::models::{ClusterAssignment, FeatureVector};

const DIM: usize = FeatureVector::DIM;

type Point = [f64; DIM];

/// Column-wise zero mean / unit variance scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Point,
    scale: Point,
}

impl StandardScaler {
    pub fn fit(points: &[Point]) -> Self {
        let n = points.len().max(1) as f64;
        let mut mean = [0.0; DIM];
        for point in points {
            for d in 0..DIM {
                mean[d] += point[d] / n;
            }
        }

        let mut scale = [0.0; DIM];
        for point in points {
            for d in 0..DIM {
                scale[d] += (point[d] - mean[d]).powi(2) / n;
            }
        }
        for value in scale.iter_mut() {
            *value = value.sqrt();
            // constant column: every value maps to zero
            if *value < f64::EPSILON {
                *value = 1.0;
            }
        }

        Self { mean, scale }
    }

    pub fn transform(&self, point: &Point) -> Point {
        let mut out = [0.0; DIM];
        for d in 0..DIM {
            out[d] = (point[d] - self.mean[d]) / self.scale[d];
        }
        out
    }

    pub fn inverse(&self, point: &Point) -> Point {
        let mut out = [0.0; DIM];
        for d in 0..DIM {
            out[d] = point[d] * self.scale[d] + self.mean[d];
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Run {
    centroids: Vec<Point>,
    labels: Vec<usize>,
    inertia: f64,
    iterations: usize,
}

#[derive(Debug, Clone)]
pub struct SegmentationModel {
    scaler: StandardScaler,
    centroids: Vec<Point>,
    assignments: Vec<ClusterAssignment>,
    inertia: f64,
}

impl SegmentationModel {
    /// Fits `config.clusters` groups over the whole population.
    ///
    /// Clusters are numbered by ascending centroid accuracy, so cluster 0 is
    /// always the lowest-accuracy group regardless of the seed.
    pub fn fit(population: &[(String, FeatureVector)], config: &SegmentationConfig) -> Result<Self> {
        let k = config.clusters;
        if k == 0 {
            return Err(PipelineError::model_fit("cluster count must be at least 1"));
        }
        if population.len() < k {
            return Err(PipelineError::model_fit(format!(
                "cannot form {k} clusters from {} learners",
                population.len()
            )));
        }

        let raw: Vec<Point> = population.iter().map(|(_, f)| f.as_array()).collect();
        let scaler = StandardScaler::fit(&raw);
        let points: Vec<Point> = raw.iter().map(|p| scaler.transform(p)).collect();

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut best: Option<Run> = None;
        for restart in 0..config.restarts.max(1) {
            let run = lloyd(&points, k, config, &mut rng);
            debug!(
                restart,
                inertia = run.inertia,
                iterations = run.iterations,
                "k-means run finished"
            );
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.ok_or_else(|| PipelineError::model_fit("no k-means run completed"))?;

        // order clusters by centroid accuracy in original units
        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by(|&a, &b| {
            let acc_a = scaler.inverse(&best.centroids[a])[0];
            let acc_b = scaler.inverse(&best.centroids[b])[0];
            acc_a.total_cmp(&acc_b).then(a.cmp(&b))
        });
        let mut relabel = vec![0usize; k];
        for (new_index, &old_index) in order.iter().enumerate() {
            relabel[old_index] = new_index;
        }

        let centroids = order.iter().map(|&old| best.centroids[old]).collect();
        let assignments = population
            .iter()
            .zip(best.labels.iter())
            .map(|((learner_id, _), &label)| ClusterAssignment {
                learner_id: learner_id.clone(),
                cluster: relabel[label],
            })
            .collect();

        info!(
            clusters = k,
            learners = population.len(),
            inertia = best.inertia,
            "segmentation fitted"
        );

        Ok(Self {
            scaler,
            centroids,
            assignments,
            inertia: best.inertia,
        })
    }

    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn assignments(&self) -> &[ClusterAssignment] {
        &self.assignments
    }

    pub fn cluster_of(&self, learner_id: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| a.learner_id == learner_id)
            .map(|a| a.cluster)
    }

    /// Other learners sharing this learner's cluster.
    pub fn peers(&self, learner_id: &str) -> Vec<&str> {
        let Some(cluster) = self.cluster_of(learner_id) else {
            return Vec::new();
        };
        self.assignments
            .iter()
            .filter(|a| a.cluster == cluster && a.learner_id != learner_id)
            .map(|a| a.learner_id.as_str())
            .collect()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.k()];
        for assignment in &self.assignments {
            sizes[assignment.cluster] += 1;
        }
        sizes
    }

    /// Centroids in original feature units.
    pub fn centroids(&self) -> Vec<FeatureVector> {
        self.centroids
            .iter()
            .map(|c| {
                let raw = self.scaler.inverse(c);
                FeatureVector {
                    accuracy_rate: raw[0],
                    avg_response_time: raw[1],
                    engagement_score: raw[2],
                    attempt_count: raw[3].round().max(0.0) as usize,
                }
            })
            .collect()
    }

    /// Nearest centroid for a learner outside the fitted population.
    pub fn predict(&self, features: &FeatureVector) -> usize {
        nearest(&self.scaler.transform(&features.as_array()), &self.centroids).0
    }
}

fn distance_squared(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &Point, centroids: &[Point]) -> (usize, f64) {
    let mut best = (0usize, f64::INFINITY);
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = distance_squared(point, centroid);
        if dist < best.1 {
            best = (i, dist);
        }
    }
    best
}

fn kmeans_plus_plus(points: &[Point], k: usize, rng: &mut ChaCha8Rng) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    let mut min_distances: Vec<f64> = points
        .iter()
        .map(|p| distance_squared(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = min_distances.iter().sum();
        let next = if total <= 0.0 {
            rng.gen_range(0..points.len())
        } else {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, dist) in min_distances.iter().enumerate() {
                if target < *dist {
                    chosen = i;
                    break;
                }
                target -= dist;
            }
            chosen
        };

        let centroid = points[next];
        for (i, point) in points.iter().enumerate() {
            min_distances[i] = min_distances[i].min(distance_squared(point, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

fn lloyd(points: &[Point], k: usize, config: &SegmentationConfig, rng: &mut ChaCha8Rng) -> Run {
    let mut centroids = kmeans_plus_plus(points, k, rng);
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;
        for (i, point) in points.iter().enumerate() {
            labels[i] = nearest(point, &centroids).0;
        }

        let mut sums = vec![[0.0f64; DIM]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.iter().zip(labels.iter()) {
            counts[label] += 1;
            for d in 0..DIM {
                sums[label][d] += point[d];
            }
        }

        let mut next: Vec<Point> = sums
            .into_iter()
            .zip(counts.iter())
            .zip(centroids.iter())
            .map(|((mut sum, &count), previous)| {
                if count == 0 {
                    return *previous;
                }
                for value in sum.iter_mut() {
                    *value /= count as f64;
                }
                sum
            })
            .collect();

        // an emptied cluster takes over the point farthest from its centroid
        for cluster in 0..k {
            if counts[cluster] > 0 {
                continue;
            }
            let farthest = points
                .iter()
                .enumerate()
                .filter(|(i, _)| counts[labels[*i]] > 1)
                .map(|(i, p)| (i, distance_squared(p, &next[labels[i]])))
                .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
            if let Some((i, _)) = farthest {
                counts[labels[i]] -= 1;
                labels[i] = cluster;
                counts[cluster] = 1;
                next[cluster] = points[i];
            }
        }

        let movement = centroids
            .iter()
            .zip(next.iter())
            .map(|(old, new)| distance_squared(old, new).sqrt())
            .fold(0.0f64, f64::max);
        centroids = next;

        if movement < config.tolerance {
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(labels.iter())
        .map(|(p, &label)| distance_squared(p, &centroids[label]))
        .sum();

    Run {
        centroids,
        labels,
        inertia,
        iterations,
    }
}
