//! Turns votes into rankings.
//!
//! For a given `(hashtag, attribute)` pair, the candidate pool is every item
//! carrying that hashtag and the evidence is every vote on that attribute
//! between two items of the pool. Votes become a weighted directed graph —
//! a loss transitions probability mass from loser to winner, proportional
//! to how decisively the winner won — and [rank centrality][rc] on that
//! graph gives each item a score. Items that can't reach each other (no
//! chain of votes connects them) are ranked independently, component by
//! component, using Tarjan's strongly-connected-components decomposition.
//!
//! [rc]: https://arxiv.org/abs/1209.1688

use std::collections::BTreeMap;

use crate::state::{State, Vote};

/// Above this many candidates the preference matrix is stored as
/// adjacency lists instead of a flat grid; most hashtags never get close.
const SPARSE_THRESHOLD: usize = 250;

const CONVERGENCE_TOLERANCE: f64 = 1e-8;
const MAX_POWER_ITERATIONS: usize = 100_000;

/// One item's place in a [`rank`] result.
///
/// `rank` and `component_id` only order items within the same component;
/// items in different components aren't comparable, so a lower
/// `component_id` doesn't mean a "better" component, just an earlier one
/// in Tarjan's emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub title: String,
    pub score: f64,
    pub rank: usize,
    pub component_id: usize,
}

/// A per-hashtag row for [`list_hashtags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashtagSummary {
    pub name: String,
    pub item_count: usize,
    pub vote_count: usize,
    pub last_updated_ts: String,
}

/// The result of [`compare`]: aggregate preference weight between two
/// items under one attribute, canonicalized so `item_left` is always the
/// alphabetically earlier title regardless of call argument order.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub item_left: String,
    pub item_right: String,
    pub left_sum: f64,
    pub right_sum: f64,
    pub votes: Vec<Vote>,
}

enum Matrix {
    Dense(Vec<Vec<f64>>),
    Sparse(Vec<BTreeMap<usize, f64>>),
}

impl Matrix {
    fn new(n: usize) -> Self {
        if n >= SPARSE_THRESHOLD {
            Matrix::Sparse(vec![BTreeMap::new(); n])
        } else {
            Matrix::Dense(vec![vec![0.0; n]; n])
        }
    }

    fn add(&mut self, i: usize, j: usize, amount: f64) {
        match self {
            Matrix::Dense(rows) => rows[i][j] += amount,
            Matrix::Sparse(rows) => *rows[i].entry(j).or_insert(0.0) += amount,
        }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        match self {
            Matrix::Dense(rows) => rows[i][j],
            Matrix::Sparse(rows) => *rows[i].get(&j).unwrap_or(&0.0),
        }
    }

    fn out_neighbors(&self, i: usize) -> Vec<usize> {
        match self {
            Matrix::Dense(rows) => rows[i]
                .iter()
                .enumerate()
                .filter(|&(_, &w)| w > 0.0)
                .map(|(j, _)| j)
                .collect(),
            Matrix::Sparse(rows) => rows[i].keys().copied().collect(),
        }
    }
}

#[derive(Clone, Copy)]
struct CallFrame {
    node: usize,
    neighbor_idx: usize,
}

/// Tarjan's algorithm, iterative (an explicit stack stands in for the call
/// stack) so a long chain of votes can't blow the real one. Components are
/// returned in the order Tarjan naturally emits them: reverse topological
/// order of the condensation graph, sinks first.
fn tarjan_scc(n: usize, adj: &Matrix) -> Vec<Vec<usize>> {
    let neighbors: Vec<Vec<usize>> = (0..n).map(|i| adj.out_neighbors(i)).collect();

    let mut index: Vec<i64> = vec![-1; n];
    let mut lowlink: Vec<i64> = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut tstack: Vec<usize> = Vec::new();
    let mut next_index: i64 = 0;
    let mut components: Vec<Vec<usize>> = Vec::new();

    for start in 0..n {
        if index[start] != -1 {
            continue;
        }

        index[start] = next_index;
        lowlink[start] = next_index;
        next_index += 1;
        tstack.push(start);
        on_stack[start] = true;
        let mut call_stack = vec![CallFrame {
            node: start,
            neighbor_idx: 0,
        }];

        while let Some(frame) = call_stack.last().copied() {
            let v = frame.node;
            if frame.neighbor_idx < neighbors[v].len() {
                let w = neighbors[v][frame.neighbor_idx];
                call_stack.last_mut().unwrap().neighbor_idx += 1;

                if index[w] == -1 {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    tstack.push(w);
                    on_stack[w] = true;
                    call_stack.push(CallFrame {
                        node: w,
                        neighbor_idx: 0,
                    });
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                call_stack.pop();
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    loop {
                        let w = tstack.pop().expect("node on a cycle must be on tstack");
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    components.push(component);
                }
                if let Some(parent) = call_stack.last().map(|f| f.node) {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
            }
        }
    }

    components
}

/// Rank centrality's stationary distribution over one component's members,
/// using only the edges among them. A singleton component carries no
/// internal evidence at all, so it gets the single possible distribution:
/// all mass on the one member.
///
/// Builds the normalized ratio matrix `W[i][j] = A[i][j] / (A[i][j] +
/// A[j][i])` before deriving the transition matrix, so `d` (the
/// normalizing row-sum) is taken over win-rates, not raw vote weight.
fn local_rank_centrality(members: &[usize], adj: &Matrix) -> Vec<f64> {
    let m = members.len();
    if m == 1 {
        return vec![1.0];
    }

    let mut w = vec![vec![0.0; m]; m];
    for (li, &gi) in members.iter().enumerate() {
        for (lj, &gj) in members.iter().enumerate() {
            if li == lj {
                continue;
            }
            let a_ij = adj.get(gi, gj);
            let a_ji = adj.get(gj, gi);
            if a_ij > 0.0 || a_ji > 0.0 {
                w[li][lj] = a_ij / (a_ij + a_ji);
            }
        }
    }

    let d = w.iter().map(|row| row.iter().sum::<f64>()).fold(0.0_f64, f64::max);
    if d <= 0.0 {
        return vec![1.0 / m as f64; m];
    }

    let mut transition = vec![vec![0.0; m]; m];
    for i in 0..m {
        let mut row_sum = 0.0;
        for j in 0..m {
            if i != j {
                transition[i][j] = w[i][j] / d;
                row_sum += transition[i][j];
            }
        }
        transition[i][i] = 1.0 - row_sum;
    }

    let mut pi = vec![1.0 / m as f64; m];
    let mut converged = false;
    for _ in 0..MAX_POWER_ITERATIONS {
        let mut next = vec![0.0; m];
        for i in 0..m {
            if pi[i] == 0.0 {
                continue;
            }
            for (j, row_entry) in next.iter_mut().enumerate() {
                *row_entry += pi[i] * transition[i][j];
            }
        }
        let delta: f64 = pi.iter().zip(next.iter()).map(|(a, b)| (a - b).abs()).sum();
        pi = next;
        if delta < CONVERGENCE_TOLERANCE {
            converged = true;
            break;
        }
    }

    if !converged || pi.iter().any(|&p| !p.is_finite()) {
        return vec![1.0 / m as f64; m];
    }
    pi
}

/// Per-hashtag statistics: item count, vote count (a vote counts toward a
/// hashtag only when both its items carry it), and the most recent
/// timestamp touching the hashtag.
pub fn list_hashtags(state: &State) -> Vec<HashtagSummary> {
    let mut summaries: Vec<HashtagSummary> = state
        .hashtags()
        .into_iter()
        .map(|name| {
            let mut item_count = 0;
            let mut last_updated_ts = String::new();
            for item in state.items.values() {
                if item.hashtags.contains(name) {
                    item_count += 1;
                    if item.timestamp > last_updated_ts {
                        last_updated_ts = item.timestamp.clone();
                    }
                }
            }

            let mut vote_count = 0;
            for vote in &state.votes {
                let both_carry = state.items.get(&vote.item1).map_or(false, |i| i.hashtags.contains(name))
                    && state.items.get(&vote.item2).map_or(false, |i| i.hashtags.contains(name));
                if both_carry {
                    vote_count += 1;
                    if vote.timestamp > last_updated_ts {
                        last_updated_ts = vote.timestamp.clone();
                    }
                }
            }

            HashtagSummary {
                name: name.to_string(),
                item_count,
                vote_count,
                last_updated_ts,
            }
        })
        .collect();
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    summaries
}

/// Ranks every item under `hashtag` by how it fares on `attribute`. Items
/// in different components aren't comparable to one another; within a
/// component, `rank` starts at 1 and scores sum to ~1.
pub fn rank(state: &State, hashtag: &str, attribute: &str) -> Vec<RankedItem> {
    let mut titles: Vec<String> = state.items_in_hashtag(hashtag).map(str::to_string).collect();
    titles.sort();
    let n = titles.len();
    if n == 0 {
        return Vec::new();
    }

    let index_of: std::collections::HashMap<&str, usize> = titles
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();

    let votes: Vec<&Vote> = state.votes_in_hashtag_attribute(hashtag, attribute).collect();
    if votes.is_empty() {
        let uniform = 1.0 / n as f64;
        return titles
            .into_iter()
            .enumerate()
            .map(|(component_id, title)| RankedItem {
                title,
                score: uniform,
                rank: 1,
                component_id,
            })
            .collect();
    }

    let mut matrix = Matrix::new(n);
    for vote in &votes {
        let i = index_of[vote.item1.as_str()];
        let j = index_of[vote.item2.as_str()];
        // item1 beat item2 at rate ratio_left: item2 transitions to item1.
        matrix.add(j, i, vote.ratio_left as f64);
        // item2 beat item1 at rate ratio_right: item1 transitions to item2.
        matrix.add(i, j, vote.ratio_right as f64);
    }

    let components = tarjan_scc(n, &matrix);
    let mut out = Vec::with_capacity(n);
    for (component_id, members) in components.iter().enumerate() {
        let local_scores = local_rank_centrality(members, &matrix);
        let mut entries: Vec<(usize, f64)> = members.iter().copied().zip(local_scores).collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| titles[a.0].cmp(&titles[b.0]))
        });
        for (local_rank, (member, score)) in entries.into_iter().enumerate() {
            out.push(RankedItem {
                title: titles[member].clone(),
                score,
                rank: local_rank + 1,
                component_id,
            });
        }
    }
    out
}

/// Aggregates preference weight between two items under one attribute,
/// across every vote cast between them regardless of hashtag. `item_left`
/// and `item_right` are the canonical (alphabetically sorted) titles;
/// `left_sum`/`right_sum` follow that canonicalization even when a vote in
/// storage recorded the pair in the opposite order.
pub fn compare(state: &State, item_a: &str, item_b: &str, attribute: &str) -> Comparison {
    let (item_left, item_right) = if item_a <= item_b {
        (item_a, item_b)
    } else {
        (item_b, item_a)
    };

    let mut left_sum = 0.0;
    let mut right_sum = 0.0;
    let mut votes = Vec::new();
    for vote in &state.votes {
        if vote.attribute != attribute {
            continue;
        }
        if vote.item1 == item_left && vote.item2 == item_right {
            left_sum += vote.ratio_left as f64;
            right_sum += vote.ratio_right as f64;
            votes.push(vote.clone());
        } else if vote.item1 == item_right && vote.item2 == item_left {
            left_sum += vote.ratio_right as f64;
            right_sum += vote.ratio_left as f64;
            votes.push(vote.clone());
        }
    }

    Comparison {
        item_left: item_left.to_string(),
        item_right: item_right.to_string(),
        left_sum,
        right_sum,
        votes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;
    use crate::reducer::reduce;

    fn state_from(text: &str) -> State {
        let mut state = State::new();
        let doc = parse(text).expect("valid dsl for test fixture");
        reduce(&mut state, &doc, "alice@example.com", "1000", "1000+test.sorter").unwrap();
        state
    }

    #[test]
    fn winner_of_a_lopsided_vote_outranks_loser() {
        let state = state_from("#ideas\n/a\n/b\n:impact\n/a 10:1 /b");
        let ranked = rank(&state, "ideas", "impact");
        assert_eq!(ranked[0].title, "a");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].title, "b");
        assert_eq!(ranked[1].rank, 2);
        assert_eq!(ranked[0].component_id, ranked[1].component_id);
        assert!(ranked[0].score > ranked[1].score);
        assert!((ranked[0].score + ranked[1].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn no_votes_gives_uniform_scores() {
        let state = state_from("#ideas\n/a\n/b\n/c");
        let ranked = rank(&state, "ideas", "impact");
        assert_eq!(ranked.len(), 3);
        for item in &ranked {
            assert!((item.score - 1.0 / 3.0).abs() < 1e-12);
            assert_eq!(item.rank, 1);
        }
        let titles: Vec<_> = ranked.iter().map(|i| i.title.clone()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        let component_ids: Vec<_> = ranked.iter().map(|i| i.component_id).collect();
        assert_eq!(component_ids, vec![0, 1, 2]);
    }

    #[test]
    fn empty_hashtag_ranks_to_nothing() {
        let state = State::new();
        assert!(rank(&state, "nonexistent", "impact").is_empty());
    }

    #[test]
    fn disconnected_vote_islands_occupy_separate_components() {
        let state = state_from(
            "#ideas\n/a1\n/a2\n/b1\n/b2\n:impact\n/a1 2:1 /a2\n/a2 2:1 /a1\n/b1 2:1 /b2\n/b2 2:1 /b1",
        );
        let ranked = rank(&state, "ideas", "impact");
        let component_of = |title: &str| ranked.iter().find(|i| i.title == title).unwrap().component_id;
        assert_eq!(component_of("a1"), component_of("a2"));
        assert_eq!(component_of("b1"), component_of("b2"));
        assert_ne!(component_of("a1"), component_of("b1"));
    }

    #[test]
    fn a_single_bridge_vote_merges_two_islands_into_one_component() {
        let state = state_from(
            "#ideas\n/a1\n/a2\n/b1\n/b2\n:impact\n/a1 2:1 /a2\n/a2 2:1 /a1\n/b1 2:1 /b2\n/b2 2:1 /b1\n/a1 1:1 /b1",
        );
        let ranked = rank(&state, "ideas", "impact");
        let components: std::collections::BTreeSet<usize> =
            ranked.iter().map(|i| i.component_id).collect();
        assert_eq!(components.len(), 1, "bridged graph should collapse to one component");
    }

    #[test]
    fn component_scores_sum_to_one() {
        let state = state_from(
            "#ideas\n/a\n/b\n/c\n:impact\n/a 3:1 /b\n/b 2:1 /c\n/c 1:3 /a",
        );
        let ranked = rank(&state, "ideas", "impact");
        let total: f64 = ranked.iter().map(|i| i.score).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn compare_canonicalizes_argument_order() {
        let state = state_from("#ideas\n/a\n/b\n:impact\n/b 1:3 /a");
        let forward = compare(&state, "a", "b", "impact");
        let reversed = compare(&state, "b", "a", "impact");
        assert_eq!(forward, reversed);
        assert_eq!(forward.item_left, "a");
        assert_eq!(forward.item_right, "b");
        assert_eq!(forward.left_sum, 3.0);
        assert_eq!(forward.right_sum, 1.0);
        assert_eq!(forward.votes.len(), 1);
    }

    #[test]
    fn compare_ignores_other_attributes_and_unrelated_pairs() {
        let state = state_from(
            "#ideas\n/a\n/b\n/c\n:impact\n/a 3:1 /b\n:effort\n/a 1:1 /b\n:impact\n/a 1:1 /c",
        );
        let comparison = compare(&state, "a", "b", "impact");
        assert_eq!(comparison.votes.len(), 1);
        assert_eq!(comparison.left_sum, 3.0);
        assert_eq!(comparison.right_sum, 1.0);
    }

    #[test]
    fn list_hashtags_reports_counts_and_latest_timestamp() {
        let mut state = State::new();
        let doc = parse("#ideas\n/a\n/b\n:impact\n/a 3:1 /b").unwrap();
        reduce(&mut state, &doc, "alice@example.com", "0000000001000", "f1").unwrap();
        let doc2 = parse("#ideas\n/c").unwrap();
        reduce(&mut state, &doc2, "bob@example.com", "0000000002000", "f2").unwrap();

        let summaries = list_hashtags(&state);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "ideas");
        assert_eq!(summaries[0].item_count, 3);
        assert_eq!(summaries[0].vote_count, 1);
        assert_eq!(summaries[0].last_updated_ts, "0000000002000");
    }

    #[test]
    fn list_hashtags_is_sorted_and_deduplicated() {
        let state = state_from("#zeta\n/a\n#alpha\n/a");
        let names: Vec<_> = list_hashtags(&state).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    fn three_item_chain(ratios: [(u32, u32); 2]) -> State {
        use crate::state::Item;

        let mut state = State::new();
        for title in ["a", "b", "c"] {
            state.items.insert(
                title.to_string(),
                Item {
                    title: title.to_string(),
                    body: None,
                    hashtags: std::iter::once("ideas".to_string()).collect(),
                    created_by: "alice@example.com".to_string(),
                    timestamp: "0000000001000".to_string(),
                },
            );
        }
        for ((item1, item2), (ratio_left, ratio_right)) in
            [("a", "b"), ("b", "c")].into_iter().zip(ratios)
        {
            state.votes.push(Vote {
                item1: item1.to_string(),
                item2: item2.to_string(),
                ratio_left,
                ratio_right,
                attribute: "impact".to_string(),
                explanation: None,
                user_email: "alice@example.com".to_string(),
                timestamp: "0000000001000".to_string(),
                source_filename: "test.sorter".to_string(),
            });
        }
        state
    }

    #[quickcheck_macros::quickcheck]
    fn rank_centrality_is_scale_invariant(r1: u32, r2: u32, r3: u32, r4: u32, factor: u32) -> bool {
        let bounded = |v: u32| (v % 20) + 1;
        let factor = (factor % 9) + 1;
        let ratios = [(bounded(r1), bounded(r2)), (bounded(r3), bounded(r4))];
        let scaled = [
            (ratios[0].0 * factor, ratios[0].1 * factor),
            (ratios[1].0 * factor, ratios[1].1 * factor),
        ];

        let base = rank(&three_item_chain(ratios), "ideas", "impact");
        let scaled_up = rank(&three_item_chain(scaled), "ideas", "impact");

        base.len() == scaled_up.len()
            && base.iter().zip(scaled_up.iter()).all(|(b, s)| {
                b.title == s.title
                    && b.rank == s.rank
                    && b.component_id == s.component_id
                    && (b.score - s.score).abs() < 1e-6
            })
    }
}
