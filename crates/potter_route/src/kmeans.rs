//! K-means partitioning of nets onto worker threads.
//!
//! Distance between a net and a cluster is a generalized
//! intersection-over-union of their bounding boxes, weighted by the net's
//! fanout, so clusters gravitate toward geometrically compact, equally
//! loaded groups. Seeding is deterministic: the first centroid sits at the
//! fanout-weighted center of gravity of the device, and each further
//! centroid is the net farthest from all existing ones.

use log::debug;
use potter_common::BBox;
use potter_netlist::{Net, NetId};
use rayon::prelude::*;

/// Maximum refinement rounds before giving up on convergence.
const MAX_ROUNDS: usize = 300;

/// A cluster centroid: a fractional bounding box.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Centroid {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

impl Centroid {
    fn from_bbox(b: BBox) -> Self {
        Self {
            x_min: b.x_min as f64,
            y_min: b.y_min as f64,
            x_max: b.x_max as f64,
            y_max: b.y_max as f64,
        }
    }

    fn around(x: f64, y: f64, x_margin: i32, y_margin: i32) -> Self {
        Self {
            x_min: x - x_margin as f64,
            x_max: x + x_margin as f64,
            y_min: y - y_margin as f64,
            y_max: y + y_margin as f64,
        }
    }

    fn x_center(&self) -> f64 {
        (self.x_min + self.x_max) / 2.0
    }

    fn y_center(&self) -> f64 {
        (self.y_min + self.y_max) / 2.0
    }
}

/// Generalized IoU distance between a centroid and a net box: zero for
/// identical boxes, growing with separation and with wasted enclosing area.
fn giou(c: &Centroid, b: BBox) -> f64 {
    let bx_min = b.x_min as f64;
    let by_min = b.y_min as f64;
    let bx_max = b.x_max as f64;
    let by_max = b.y_max as f64;

    let inter_w = (c.x_max.min(bx_max) - c.x_min.max(bx_min)).max(0.0);
    let inter_h = (c.y_max.min(by_max) - c.y_min.max(by_min)).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (c.x_max - c.x_min) * (c.y_max - c.y_min);
    let area_b = (bx_max - bx_min) * (by_max - by_min);
    let union_area = area_a + area_b - inter_area;

    let outer_w = c.x_max.max(bx_max) - c.x_min.min(bx_min);
    let outer_h = c.y_max.max(by_max) - c.y_min.min(by_min);
    let outer_area = outer_w * outer_h;

    1.0 - inter_area / union_area + (outer_area - union_area) / outer_area
}

fn distance(c: &Centroid, b: BBox, weight: f64) -> f64 {
    giou(c, b) * weight
}

/// Seeds `k` centroids: the device's fanout-weighted center of gravity
/// first, then repeatedly the net farthest from its nearest centroid.
fn initialize_centroids(
    nets: &[Net],
    net_ids: &[NetId],
    k: usize,
    extent: BBox,
    x_margin: i32,
    y_margin: i32,
) -> Vec<Centroid> {
    let mut x_stat = vec![0i64; (extent.x_max + 1).max(1) as usize];
    let mut y_stat = vec![0i64; (extent.y_max + 1).max(1) as usize];
    for id in net_ids {
        let b = nets[id.index()].bbox();
        for x in (b.x_min + 1).max(0)..b.x_max.min(x_stat.len() as i32) {
            x_stat[x as usize] += 1;
        }
        for y in (b.y_min + 1).max(0)..b.y_max.min(y_stat.len() as i32) {
            y_stat[y as usize] += 1;
        }
    }
    let weighted_mean = |stat: &[i64]| -> f64 {
        let total: i64 = stat.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let sum: i64 = stat.iter().enumerate().map(|(i, &c)| i as i64 * c).sum();
        sum as f64 / total as f64
    };
    let x_center = weighted_mean(&x_stat);
    let y_center = weighted_mean(&y_stat);

    let mut centroids = vec![Centroid::around(x_center, y_center, x_margin, y_margin)];
    let mut used = vec![false; net_ids.len()];
    while centroids.len() < k {
        let distances: Vec<f64> = net_ids
            .par_iter()
            .map(|id| {
                let net = &nets[id.index()];
                centroids
                    .iter()
                    .map(|c| distance(c, net.bbox(), net.fanout() as f64))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let mut farthest = None;
        let mut max_dist = -2.0;
        for (i, &d) in distances.iter().enumerate() {
            if !used[i] && d > max_dist {
                max_dist = d;
                farthest = Some(i);
            }
        }
        let Some(i) = farthest else { break };
        used[i] = true;
        centroids.push(Centroid::from_bbox(nets[net_ids[i].index()].bbox()));
    }
    // Fewer candidate nets than clusters: pad so every label stays valid.
    let first = centroids[0];
    while centroids.len() < k {
        centroids.push(first);
    }
    centroids
}

/// Clusters `net_ids` into `k` groups, returning one label per net.
///
/// Iterates assignment and fanout-weighted centroid refinement until no
/// label changes or [`MAX_ROUNDS`] is reached. Emptied clusters are reseeded
/// at the mean of the surviving centroids.
pub(crate) fn kmeans(
    nets: &[Net],
    net_ids: &[NetId],
    k: usize,
    extent: BBox,
    x_margin: i32,
    y_margin: i32,
) -> Vec<usize> {
    assert!(k > 0);
    let mut centroids = initialize_centroids(nets, net_ids, k, extent, x_margin, y_margin);
    let mut labels = vec![usize::MAX; net_ids.len()];
    let mut counts = vec![0i64; k];

    for round in 0..MAX_ROUNDS {
        let new_labels: Vec<usize> = net_ids
            .par_iter()
            .map(|id| {
                let net = &nets[id.index()];
                let mut nearest = 0;
                let mut min_dist = f64::INFINITY;
                for (j, c) in centroids.iter().enumerate() {
                    let d = distance(c, net.bbox(), net.fanout() as f64);
                    if d < min_dist {
                        min_dist = d;
                        nearest = j;
                    }
                }
                nearest
            })
            .collect();
        let changed = new_labels != labels;
        labels = new_labels;

        // Fanout-weighted average of member boxes.
        let mut sums = vec![[0.0f64; 4]; k];
        counts = vec![0i64; k];
        for (i, id) in net_ids.iter().enumerate() {
            let net = &nets[id.index()];
            let w = net.fanout() as f64;
            let b = net.bbox();
            let s = &mut sums[labels[i]];
            s[0] += b.x_min as f64 * w;
            s[1] += b.y_min as f64 * w;
            s[2] += b.x_max as f64 * w;
            s[3] += b.y_max as f64 * w;
            counts[labels[i]] += net.fanout() as i64;
        }
        for j in 0..k {
            if counts[j] > 0 {
                let w = counts[j] as f64;
                centroids[j] = Centroid {
                    x_min: sums[j][0] / w,
                    y_min: sums[j][1] / w,
                    x_max: sums[j][2] / w,
                    y_max: sums[j][3] / w,
                };
            }
        }
        if counts.iter().any(|&c| c == 0) {
            let survivors: Vec<&Centroid> = centroids
                .iter()
                .zip(&counts)
                .filter(|(_, &c)| c > 0)
                .map(|(c, _)| c)
                .collect();
            if !survivors.is_empty() {
                let n = survivors.len() as f64;
                let x = survivors.iter().map(|c| c.x_center()).sum::<f64>() / n;
                let y = survivors.iter().map(|c| c.y_center()).sum::<f64>() / n;
                let reseeded = Centroid::around(x, y, x_margin, y_margin);
                for j in 0..k {
                    if counts[j] == 0 {
                        centroids[j] = reseeded;
                    }
                }
            }
        }

        if !changed {
            debug!("kmeans converged after {round} rounds");
            break;
        }
    }

    let mean = counts.iter().sum::<i64>() as f64 / k as f64;
    let var = counts
        .iter()
        .map(|&c| (c as f64 - mean) * (c as f64 - mean))
        .sum::<f64>()
        / k as f64;
    debug!(
        "kmeans cluster fanouts: {counts:?} (unbalance {:.3})",
        var.sqrt() / mean
    );
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use potter_netlist::ConnId;

    fn net_at(id: u32, bbox: BBox, fanout: u32) -> Net {
        let mut net = Net::new(NetId::from_raw(id), id);
        net.set_bbox(bbox);
        net.set_center(bbox.x_center(), bbox.y_center());
        for c in 0..fanout {
            net.add_connection(ConnId::from_raw(c));
        }
        net
    }

    #[test]
    fn giou_of_identical_boxes_is_zero() {
        let b = BBox::new(0, 0, 4, 4);
        let c = Centroid::from_bbox(b);
        assert!(giou(&c, b).abs() < 1e-12);
    }

    #[test]
    fn giou_grows_with_separation() {
        let c = Centroid::from_bbox(BBox::new(0, 0, 4, 4));
        let near = giou(&c, BBox::new(2, 2, 6, 6));
        let far = giou(&c, BBox::new(20, 20, 24, 24));
        assert!(near < far);
    }

    #[test]
    fn separated_groups_get_separate_clusters() {
        let mut nets = Vec::new();
        for i in 0..4 {
            nets.push(net_at(i, BBox::new(0, 0, 4, 4), 2));
        }
        for i in 4..8 {
            nets.push(net_at(i, BBox::new(50, 50, 54, 54), 2));
        }
        let ids: Vec<NetId> = (0..8).map(NetId::from_raw).collect();
        let labels = kmeans(&nets, &ids, 2, BBox::new(0, 0, 60, 60), 3, 15);

        assert_eq!(labels.len(), 8);
        let first = labels[0];
        assert!(labels[..4].iter().all(|&l| l == first));
        let second = labels[4];
        assert!(labels[4..].iter().all(|&l| l == second));
        assert_ne!(first, second);
    }

    #[test]
    fn k_of_one_labels_everything_zero() {
        let nets = vec![
            net_at(0, BBox::new(0, 0, 4, 4), 1),
            net_at(1, BBox::new(8, 8, 12, 12), 3),
        ];
        let ids = vec![NetId::from_raw(0), NetId::from_raw(1)];
        let labels = kmeans(&nets, &ids, 1, BBox::new(0, 0, 16, 16), 3, 15);
        assert_eq!(labels, vec![0, 0]);
    }

    #[test]
    fn farthest_point_seeding_spreads_centroids() {
        let nets = vec![
            net_at(0, BBox::new(0, 0, 2, 2), 1),
            net_at(1, BBox::new(40, 40, 42, 42), 1),
        ];
        let ids = vec![NetId::from_raw(0), NetId::from_raw(1)];
        let centroids =
            initialize_centroids(&nets, &ids, 2, BBox::new(0, 0, 50, 50), 3, 15);
        assert_eq!(centroids.len(), 2);
        // The second centroid is one of the nets, not the device center.
        let c = &centroids[1];
        assert!(c.x_min == 0.0 || c.x_min == 40.0);
    }
}
