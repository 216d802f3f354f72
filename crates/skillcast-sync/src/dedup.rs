//! Near-duplicate clustering over tagged postings.
//!
//! Postings are put in a canonical order first, so candidate pairs, merges
//! and representatives do not depend on the order postings arrived in.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use skillcast_core::{fold_text, ClusterId, DedupConfig, PostingCluster, RegionCode, TaggedPosting};
use strsim::jaro_winkler;

const TITLE_WEIGHT: f64 = 0.6;
const BODY_WEIGHT: f64 = 0.4;

/// Flat parent-pointer arena; the smaller index always becomes the root.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[child] = root;
        true
    }
}

#[derive(Debug, Clone)]
struct Features {
    title: String,
    shingles: HashSet<String>,
}

fn shingles(body: &str) -> HashSet<String> {
    let folded = fold_text(body);
    let words = folded.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>();
    if words.len() < 2 {
        return words.into_iter().map(ToString::to_string).collect();
    }
    words.windows(2).map(|w| w.join(" ")).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = (a.len() + b.len()) as f64 - inter;
    inter / union
}

/// Numeric ids order by value ahead of all other ids, which order
/// lexically. The trailing string breaks ties such as `07` and `7`.
fn native_id_key(id: &str) -> (bool, u64, &str) {
    match id.parse::<u64>() {
        Ok(n) => (false, n, id),
        Err(_) => (true, 0, id),
    }
}

/// Sorted postings plus precomputed comparison features. Scoring is pure, so
/// anchor ranges can be scored on different workers.
#[derive(Debug, Clone)]
pub struct DedupPlan {
    postings: Vec<TaggedPosting>,
    features: Vec<Features>,
    config: DedupConfig,
}

impl DedupPlan {
    pub fn new(mut postings: Vec<TaggedPosting>, config: DedupConfig) -> Self {
        postings.sort_by(|a, b| {
            let (a, b) = (&a.posting, &b.posting);
            a.posted_on
                .cmp(&b.posted_on)
                .then_with(|| {
                    native_id_key(&a.source.source_native_id).cmp(&native_id_key(&b.source.source_native_id))
                })
                .then_with(|| a.source.source_id.cmp(&b.source.source_id))
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        let features = postings
            .iter()
            .map(|p| Features {
                title: fold_text(&p.posting.title),
                shingles: shingles(&p.posting.body),
            })
            .collect();
        Self {
            postings,
            features,
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn similarity(&self, i: usize, j: usize) -> f64 {
        let (a, b) = (&self.features[i], &self.features[j]);
        TITLE_WEIGHT * jaro_winkler(&a.title, &b.title) + BODY_WEIGHT * jaccard(&a.shingles, &b.shingles)
    }

    /// Pairs `(i, j)` with `i` in `anchors`, `j > i`, that should be merged.
    pub fn candidate_pairs(&self, anchors: Range<usize>) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in anchors {
            let a = &self.postings[i].posting;
            for j in (i + 1)..self.postings.len() {
                let b = &self.postings[j].posting;
                if (b.posted_on - a.posted_on).num_days() > self.config.window_days {
                    break;
                }
                if a.fingerprint == b.fingerprint {
                    pairs.push((i, j));
                    continue;
                }
                if a.region.compatible_with(&b.region) && self.similarity(i, j) >= self.config.similarity_threshold {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// Same-fingerprint postings merge regardless of the date window.
    pub fn fingerprint_pairs(&self) -> Vec<(usize, usize)> {
        let mut first_seen: BTreeMap<&str, usize> = BTreeMap::new();
        let mut pairs = Vec::new();
        for (idx, p) in self.postings.iter().enumerate() {
            match first_seen.get(p.posting.fingerprint.as_str()) {
                Some(&first) => pairs.push((first, idx)),
                None => {
                    first_seen.insert(&p.posting.fingerprint, idx);
                }
            }
        }
        pairs
    }

    pub fn merger(&self) -> UnionFind {
        UnionFind::new(self.postings.len())
    }

    /// Turn the merged arena into clusters, ordered by representative.
    pub fn assemble(self, mut merges: UnionFind) -> Vec<PostingCluster> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..self.postings.len() {
            groups.entry(merges.find(idx)).or_default().push(idx);
        }
        let mut slots = self.postings.into_iter().map(Some).collect::<Vec<_>>();
        groups
            .into_values()
            .map(|indices| {
                let members = indices
                    .into_iter()
                    .filter_map(|i| slots[i].take())
                    .collect::<Vec<_>>();
                // Members keep canonical order, so the earliest posting (lowest
                // native id on ties) is first.
                let representative = 0;
                let region = reconcile_region(&members, representative);
                PostingCluster {
                    id: ClusterId::from_representative(&members[representative].posting.source),
                    representative,
                    members,
                    region,
                }
            })
            .collect()
    }
}

/// Most specific resolved region; ties go to the representative's region,
/// then to the lexicographically smallest code.
pub fn reconcile_region(members: &[TaggedPosting], representative: usize) -> RegionCode {
    let best = members
        .iter()
        .map(|m| m.posting.region.specificity())
        .max()
        .unwrap_or(0);
    if best == 0 {
        return RegionCode::unresolved();
    }
    let rep_region = &members[representative].posting.region;
    if rep_region.specificity() == best {
        return rep_region.clone();
    }
    members
        .iter()
        .map(|m| &m.posting.region)
        .filter(|r| r.specificity() == best)
        .min()
        .cloned()
        .unwrap_or_else(RegionCode::unresolved)
}

#[derive(Debug, Clone, Copy)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, postings: Vec<TaggedPosting>) -> DedupPlan {
        DedupPlan::new(postings, self.config)
    }

    /// Single-threaded clustering; see the worker pool for the parallel path.
    pub fn cluster(&self, postings: Vec<TaggedPosting>) -> Vec<PostingCluster> {
        let plan = self.plan(postings);
        let mut merges = plan.merger();
        for (a, b) in plan
            .fingerprint_pairs()
            .into_iter()
            .chain(plan.candidate_pairs(0..plan.len()))
        {
            merges.union(a, b);
        }
        plan.assemble(merges)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use skillcast_core::{
        content_fingerprint, CanonicalPosting, Granularity, Seniority, SourceRef, WorkArrangement,
    };

    pub(crate) fn tagged(source: &str, id: &str, title: &str, body: &str, region: &str, day: u32) -> TaggedPosting {
        let posted_on = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        let region = RegionCode::new(region);
        let period = Granularity::IsoWeek.bucket(posted_on);
        TaggedPosting {
            posting: CanonicalPosting {
                source: SourceRef::new(source, id),
                title: title.into(),
                body: body.into(),
                fingerprint: content_fingerprint(title, body, &region, period),
                region,
                posted_on,
                period,
                seniority: Seniority::MidLevel,
                work_arrangement: WorkArrangement::OnSite,
                salary: None,
            },
            tags: vec![],
        }
    }

    fn sample() -> Vec<TaggedPosting> {
        let body = "Design and operate streaming data pipelines with Kafka, Spark and SQL for analytics teams.";
        vec![
            tagged("board-a", "17", "Data Engineer", body, "US-CA", 3),
            tagged("board-b", "4", "Data Engineer", body, "US-CA", 4),
            tagged("board-c", "9", "Data Engineer II", body, "US", 6),
            tagged("board-a", "20", "Pastry Chef", "Bake bread and croissants every morning.", "US-CA", 4),
            tagged("board-a", "21", "Data Engineer", body, "DE", 5),
        ]
    }

    fn partition(clusters: &[PostingCluster]) -> Vec<Vec<String>> {
        clusters
            .iter()
            .map(|c| c.members.iter().map(|m| m.posting.source.to_string()).collect())
            .collect()
    }

    #[test]
    fn exact_and_near_duplicates_merge() {
        let clusters = Deduplicator::new(DedupConfig::default()).cluster(sample());
        assert_eq!(
            partition(&clusters),
            vec![
                vec!["board-a:17", "board-b:4", "board-c:9"],
                vec!["board-a:20"],
                vec!["board-a:21"],
            ]
        );
        let merged = &clusters[0];
        assert_eq!(merged.representative().posting.source.source_native_id, "17");
        assert_eq!(merged.region.as_str(), "US-CA");
        assert_eq!(merged.id, ClusterId::from_representative(&SourceRef::new("board-a", "17")));
    }

    #[test]
    fn partition_is_independent_of_input_order() {
        let dedup = Deduplicator::new(DedupConfig::default());
        let forward = dedup.cluster(sample());
        let mut reversed = sample();
        reversed.reverse();
        let mut rotated = sample();
        rotated.rotate_left(2);
        assert_eq!(forward, dedup.cluster(reversed));
        assert_eq!(forward, dedup.cluster(rotated));
    }

    #[test]
    fn every_posting_lands_in_exactly_one_cluster() {
        let clusters = Deduplicator::new(DedupConfig::default()).cluster(sample());
        let mut seen = partition(&clusters).concat();
        seen.sort();
        let before = seen.len();
        seen.dedup();
        assert_eq!(before, seen.len());
        assert_eq!(seen.len(), sample().len());
    }

    #[test]
    fn numeric_native_ids_pick_the_representative_by_value() {
        let body = "Own the billing service written in Go.";
        let clusters = Deduplicator::new(DedupConfig::default()).cluster(vec![
            tagged("a", "10", "Go Engineer", body, "US-NY", 2),
            tagged("b", "9", "Go Engineer", body, "US-NY", 2),
            tagged("c", "job-3", "Go Engineer", body, "US-NY", 2),
        ]);
        assert_eq!(clusters.len(), 1);
        let ids = clusters[0]
            .members
            .iter()
            .map(|m| m.posting.source.source_native_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["9", "10", "job-3"]);
        assert_eq!(clusters[0].representative().posting.source.source_native_id, "9");
    }

    #[test]
    fn postings_outside_the_window_stay_apart() {
        let body = "Own the checkout service written in Rust.";
        let postings = vec![
            tagged("a", "1", "Rust Engineer", body, "US-NY", 1),
            tagged("b", "2", "Rust Engineer!", body, "US-NY", 28),
        ];
        let clusters = Deduplicator::new(DedupConfig::default()).cluster(postings);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn region_reconciliation_prefers_specific_then_representative_then_smallest() {
        let body = "x y z";
        let members = vec![
            tagged("a", "1", "t", body, "US", 1),
            tagged("a", "2", "t", body, "US-NY", 2),
            tagged("a", "3", "t", body, "US-CA", 3),
        ];
        assert_eq!(reconcile_region(&members, 0).as_str(), "US-CA");
        assert_eq!(reconcile_region(&members, 1).as_str(), "US-NY");
        let unresolved = vec![tagged("a", "1", "t", body, "", 1)];
        assert!(!reconcile_region(&unresolved, 0).is_resolved());
    }
}
