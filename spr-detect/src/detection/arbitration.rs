//! Resolution of overlapping candidates.
//!
//! One physical binding event often produces several occupancy blobs: the
//! main signal plus ringing or partial overlaps next to it. Arbitration keeps
//! the strongest blob of such a group and tags the rest.

use std::collections::{BTreeSet, HashMap};

use crate::config::ArbitrationOrder;

/// Outcome of arbitration for a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// A stronger neighbour explains the same event
    Minor,
    /// Duplicate of a stronger neighbour peaking at nearly the same time
    Blacklisted,
}

/// The facts arbitration needs about a candidate.
#[derive(Debug, Clone)]
pub struct Contender {
    /// Component label, unique among contenders
    pub label: u32,
    pub peak_value: f64,
    /// Peak location as (row, col, frame)
    pub peak: (usize, usize, usize),
    /// Labels of the other blobs found around this one
    pub neighbours: BTreeSet<u32>,
}

impl Contender {
    fn frame_gap(&self, other: &Self) -> usize {
        self.peak.2.abs_diff(other.peak.2)
    }

    fn peak_distance(&self, other: &Self) -> f64 {
        let dr = self.peak.0 as f64 - other.peak.0 as f64;
        let dc = self.peak.1 as f64 - other.peak.1 as f64;
        let df = self.peak.2 as f64 - other.peak.2 as f64;
        (dr * dr + dc * dc + df * df).sqrt()
    }
}

/// Assign a verdict to every contender, in the order given.
///
/// `min_distance` is the separation `d`: peaks within `d` frames are the
/// same event, peaks within `3d` (row, col and frame combined) are related.
pub fn arbitrate(
    contenders: &[Contender],
    order: ArbitrationOrder,
    min_distance: usize,
) -> Vec<Verdict> {
    let adjacency = symmetric_neighbours(contenders);
    match order {
        ArbitrationOrder::PeakMagnitude => by_peak_magnitude(contenders, &adjacency, min_distance),
        ArbitrationOrder::LabelScan => by_label_scan(contenders, &adjacency, min_distance),
    }
}

/// Neighbour lists as contender indices; `a` and `b` are neighbours when
/// either one was found around the other.
fn symmetric_neighbours(contenders: &[Contender]) -> Vec<BTreeSet<usize>> {
    let index_of: HashMap<u32, usize> = contenders
        .iter()
        .enumerate()
        .map(|(i, c)| (c.label, i))
        .collect();
    let mut adjacency = vec![BTreeSet::new(); contenders.len()];
    for (i, contender) in contenders.iter().enumerate() {
        for &label in &contender.neighbours {
            if let Some(&j) = index_of.get(&label).filter(|&&j| j != i) {
                adjacency[i].insert(j);
                adjacency[j].insert(i);
            }
        }
    }
    adjacency
}

fn by_peak_magnitude(
    contenders: &[Contender],
    adjacency: &[BTreeSet<usize>],
    min_distance: usize,
) -> Vec<Verdict> {
    let mut order: Vec<usize> = (0..contenders.len()).collect();
    order.sort_by(|&a, &b| {
        contenders[b]
            .peak_value
            .total_cmp(&contenders[a].peak_value)
            .then(contenders[a].label.cmp(&contenders[b].label))
    });

    let related_radius = 3.0 * min_distance as f64;
    let mut verdicts: Vec<Option<Verdict>> = vec![None; contenders.len()];
    for i in order {
        let current = &contenders[i];
        let accepted = adjacency[i]
            .iter()
            .filter(|&&j| verdicts[j] == Some(Verdict::Accepted))
            .map(|&j| &contenders[j]);

        let mut verdict = Verdict::Accepted;
        for stronger in accepted {
            if current.frame_gap(stronger) <= min_distance {
                verdict = Verdict::Blacklisted;
                break;
            }
            if current.peak_distance(stronger) <= related_radius {
                verdict = Verdict::Minor;
            }
        }
        verdicts[i] = Some(verdict);
    }

    verdicts
        .into_iter()
        .map(|v| v.unwrap_or(Verdict::Accepted))
        .collect()
}

/// Greedy scan in label order. A later, stronger candidate can still
/// blacklist one accepted earlier.
fn by_label_scan(
    contenders: &[Contender],
    adjacency: &[BTreeSet<usize>],
    min_distance: usize,
) -> Vec<Verdict> {
    let mut order: Vec<usize> = (0..contenders.len()).collect();
    order.sort_by_key(|&i| contenders[i].label);

    let related_radius = 3.0 * min_distance as f64;
    let mut verdicts = vec![Verdict::Accepted; contenders.len()];
    for i in order {
        if verdicts[i] == Verdict::Blacklisted {
            continue;
        }
        let current = &contenders[i];
        for &j in &adjacency[i] {
            if verdicts[j] == Verdict::Blacklisted {
                continue;
            }
            let other = &contenders[j];
            if current.frame_gap(other) <= min_distance && other.peak_value < current.peak_value {
                verdicts[j] = Verdict::Blacklisted;
            } else if current.peak_distance(other) <= related_radius
                && other.peak_value > current.peak_value
            {
                verdicts[i] = Verdict::Minor;
                break;
            }
        }
    }
    verdicts
}
