//! Score normalization and fusion of lexical and vector candidates

use std::collections::HashMap;

use crate::core::note::NoteId;

/// Min-max normalize scores into [0, 1].
///
/// A set whose scores are all equal (including a single candidate) maps
/// every member to 1.0.
pub fn min_max_normalize(candidates: &[(NoteId, f32)]) -> Vec<(NoteId, f32)> {
    let Some(first) = candidates.first() else {
        return Vec::new();
    };
    let (min, max) = candidates
        .iter()
        .fold((first.1, first.1), |(lo, hi), &(_, s)| (lo.min(s), hi.max(s)));

    let span = max - min;
    candidates
        .iter()
        .map(|&(id, score)| {
            let normalized = if span > f32::EPSILON { (score - min) / span } else { 1.0 };
            (id, normalized)
        })
        .collect()
}

/// Sum of normalized vector and lexical scores, best first, ties by smaller id.
///
/// An id present in only one set contributes 0 for the other. Duplicate ids
/// within a set keep their best score.
pub fn fuse(vector: &[(NoteId, f32)], lexical: &[(NoteId, f32)]) -> Vec<(NoteId, f32)> {
    let mut fused: HashMap<NoteId, f32> = HashMap::new();
    for set in [vector, lexical] {
        let mut best: HashMap<NoteId, f32> = HashMap::new();
        for (id, score) in min_max_normalize(set) {
            let entry = best.entry(id).or_insert(score);
            *entry = entry.max(score);
        }
        for (id, score) in best {
            *fused.entry(id).or_insert(0.0) += score;
        }
    }

    let mut ranked: Vec<(NoteId, f32)> = fused.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_range() {
        let normalized = min_max_normalize(&[(1, 2.0), (2, 4.0), (3, 3.0)]);
        assert_eq!(normalized, vec![(1, 0.0), (2, 1.0), (3, 0.5)]);
    }

    #[test]
    fn test_normalize_degenerate_sets() {
        assert!(min_max_normalize(&[]).is_empty());
        assert_eq!(min_max_normalize(&[(7, -3.2)]), vec![(7, 1.0)]);
        assert_eq!(min_max_normalize(&[(1, 0.5), (2, 0.5)]), vec![(1, 1.0), (2, 1.0)]);
    }

    #[test]
    fn test_fuse_sums_both_signals() {
        let vector = [(1, 0.9), (2, 0.5)];
        let lexical = [(2, 8.0), (3, 2.0)];

        let fused = fuse(&vector, &lexical);
        // 1: 1.0 + 0, 2: 0.0 + 1.0, 3: 0 + 0.0
        assert_eq!(fused, vec![(1, 1.0), (2, 1.0), (3, 0.0)]);
    }

    #[test]
    fn test_fuse_prefers_agreement() {
        let vector = [(1, 0.9), (2, 0.1), (3, 0.5)];
        let lexical = [(1, 5.0), (2, 1.0)];

        let fused = fuse(&vector, &lexical);
        assert_eq!(fused[0], (1, 2.0));
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_fuse_one_sided() {
        assert_eq!(fuse(&[], &[(4, 1.0), (3, 1.0)]), vec![(3, 1.0), (4, 1.0)]);
        assert!(fuse(&[], &[]).is_empty());
    }
}
