//! CPU half of the optimal-transport assignment.
//!
//! The GPU k-means reduces both the source atom cloud and the sampled
//! target cloud to K centroids with per-point labels. This module takes
//! it from there: it pairs source centroids with target centroids by
//! polar-angle rank, then hands every source atom a concrete target
//! position from its matched cluster's pool, round-robin. All working
//! arrays are allocated once and reused across transitions.

use glam::Vec2;

/// Reusable workspace for matching and pairing.
pub struct OtWorkspace {
    clusters: usize,
    /// Source-centroid index -> target-centroid index. A bijection.
    map: Vec<u32>,
    /// Angle-sorted centroid index orderings.
    order_src: Vec<u32>,
    order_tgt: Vec<u32>,
    /// Counting-sort layout of target samples grouped by label.
    pool: Vec<u32>,
    offsets: Vec<u32>,
    counts: Vec<u32>,
    cursors: Vec<u32>,
}

impl OtWorkspace {
    pub fn new(atom_count: u32, clusters: u32) -> Self {
        let k = clusters as usize;
        Self {
            clusters: k,
            map: vec![0; k],
            order_src: vec![0; k],
            order_tgt: vec![0; k],
            pool: vec![0; atom_count as usize],
            offsets: vec![0; k],
            counts: vec![0; k],
            cursors: vec![0; k],
        }
    }

    /// Pair source centroids with target centroids.
    ///
    /// Both clouds are sorted by polar angle around their own
    /// centroid-of-centroids and paired by rank, which preserves the
    /// rough angular layout of the clouds and keeps the mapping a
    /// bijection on [0, K).
    pub fn match_centroids(&mut self, src: &[[f32; 2]], tgt: &[[f32; 2]]) -> &[u32] {
        assert_eq!(src.len(), self.clusters);
        assert_eq!(tgt.len(), self.clusters);

        angle_order(src, &mut self.order_src);
        angle_order(tgt, &mut self.order_tgt);

        for rank in 0..self.clusters {
            self.map[self.order_src[rank] as usize] = self.order_tgt[rank];
        }
        &self.map
    }

    /// Assign every source atom a target position.
    ///
    /// `src_labels[i]` is atom i's source cluster; the matched target
    /// cluster's sampled positions are dealt out round-robin. An empty
    /// target cluster falls back to the centroid position itself, so the
    /// assignment never fails.
    pub fn assign_targets(
        &mut self,
        src_labels: &[u32],
        tgt_labels: &[u32],
        tgt_samples: &[[f32; 2]],
        tgt_centroids: &[[f32; 2]],
        out: &mut [[f32; 2]],
    ) {
        assert_eq!(src_labels.len(), out.len());
        assert_eq!(tgt_labels.len(), tgt_samples.len());

        // Counting sort of target sample indices by label.
        self.counts.fill(0);
        for &l in tgt_labels {
            self.counts[l as usize] += 1;
        }
        let mut acc = 0u32;
        for k in 0..self.clusters {
            self.offsets[k] = acc;
            acc += self.counts[k];
        }
        self.cursors.fill(0);
        for (i, &l) in tgt_labels.iter().enumerate() {
            let k = l as usize;
            self.pool[(self.offsets[k] + self.cursors[k]) as usize] = i as u32;
            self.cursors[k] += 1;
        }

        self.cursors.fill(0);
        for (i, &s) in src_labels.iter().enumerate() {
            let t = self.map[s as usize] as usize;
            let len = self.counts[t];
            if len == 0 {
                out[i] = tgt_centroids[t];
            } else {
                let c = self.cursors[t];
                let member = self.pool[(self.offsets[t] + c) as usize];
                out[i] = tgt_samples[member as usize];
                self.cursors[t] = (c + 1) % len;
            }
        }
    }
}

/// Sort centroid indices by polar angle around the centroid-of-centroids.
fn angle_order(centroids: &[[f32; 2]], order: &mut [u32]) {
    let mut mean = Vec2::ZERO;
    for &c in centroids {
        mean += Vec2::from_array(c);
    }
    mean /= centroids.len() as f32;

    for (i, o) in order.iter_mut().enumerate() {
        *o = i as u32;
    }
    order.sort_unstable_by(|&a, &b| {
        let da = Vec2::from_array(centroids[a as usize]) - mean;
        let db = Vec2::from_array(centroids[b as usize]) - mean;
        da.y.atan2(da.x).total_cmp(&db.y.atan2(db.x))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(k: usize, radius: f32, phase: f32) -> Vec<[f32; 2]> {
        (0..k)
            .map(|i| {
                let theta = i as f32 / k as f32 * std::f32::consts::TAU + phase;
                [radius * theta.cos(), radius * theta.sin()]
            })
            .collect()
    }

    #[test]
    fn test_matching_is_a_bijection() {
        let src = ring(16, 0.8, 0.0);
        let tgt = ring(16, 0.5, 1.3);
        let mut ws = OtWorkspace::new(64, 16);
        let map = ws.match_centroids(&src, &tgt);

        let mut seen = vec![false; 16];
        for &t in map {
            assert!(!seen[t as usize], "target centroid {} matched twice", t);
            seen[t as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_matching_preserves_angular_rank() {
        // Identical clouds must map every centroid to itself.
        let src = ring(8, 0.7, 0.2);
        let mut ws = OtWorkspace::new(8, 8);
        let map = ws.match_centroids(&src, &src).to_vec();
        for (s, t) in map.iter().enumerate() {
            assert_eq!(s as u32, *t);
        }
    }

    #[test]
    fn test_round_robin_wraps() {
        let mut ws = OtWorkspace::new(8, 2);
        let src_c = [[-0.5, 0.0], [0.5, 0.0]];
        let tgt_c = [[-0.5, 0.0], [0.5, 0.0]];
        ws.match_centroids(&src_c, &tgt_c);

        // Cluster 0 has a pool of two target samples; five atoms cycle
        // through it: a, b, a, b, a.
        let src_labels = [0u32, 0, 0, 0, 0];
        let tgt_labels = [0u32, 0, 1, 1, 1];
        let tgt_samples = [
            [-0.6, 0.1],
            [-0.4, -0.1],
            [0.4, 0.0],
            [0.5, 0.1],
            [0.6, -0.1],
        ];
        let mut out = [[0.0f32; 2]; 5];
        ws.assign_targets(&src_labels, &tgt_labels, &tgt_samples, &tgt_c, &mut out);

        assert_eq!(out[0], tgt_samples[0]);
        assert_eq!(out[1], tgt_samples[1]);
        assert_eq!(out[2], tgt_samples[0]);
        assert_eq!(out[3], tgt_samples[1]);
        assert_eq!(out[4], tgt_samples[0]);
    }

    #[test]
    fn test_empty_target_cluster_falls_back_to_centroid() {
        let mut ws = OtWorkspace::new(4, 2);
        let src_c = [[-0.5, 0.0], [0.5, 0.0]];
        let tgt_c = [[-0.5, 0.0], [0.5, 0.0]];
        ws.match_centroids(&src_c, &tgt_c);

        // Every target sample landed in cluster 1; cluster 0 is empty.
        let src_labels = [0u32, 1];
        let tgt_labels = [1u32, 1];
        let tgt_samples = [[0.4, 0.0], [0.6, 0.0]];
        let mut out = [[0.0f32; 2]; 2];
        ws.assign_targets(&src_labels, &tgt_labels, &tgt_samples, &tgt_c, &mut out);

        assert_eq!(out[0], tgt_c[0]);
        assert_eq!(out[1], tgt_samples[0]);
    }

    #[test]
    fn test_every_atom_receives_a_target() {
        let k = 8;
        let n = 200;
        let src_c = ring(k, 0.8, 0.0);
        let tgt_c = ring(k, 0.6, 0.4);
        let mut ws = OtWorkspace::new(n as u32, k as u32);
        ws.match_centroids(&src_c, &tgt_c);

        let src_labels: Vec<u32> = (0..n).map(|i| (i % k) as u32).collect();
        let tgt_labels: Vec<u32> = (0..n).map(|i| ((i * 3) % k) as u32).collect();
        let tgt_samples: Vec<[f32; 2]> = (0..n)
            .map(|i| [(i as f32 / n as f32) * 1.6 - 0.8, 0.0])
            .collect();
        let mut out = vec![[f32::NAN; 2]; n];
        ws.assign_targets(&src_labels, &tgt_labels, &tgt_samples, &tgt_c, &mut out);

        for p in &out {
            assert!(p[0].is_finite() && p[1].is_finite());
        }
    }
}
