use std::collections::HashSet;

use rayon::prelude::*;

use super::features::{hamming, Descriptor};

/// Correspondence between a query and a train descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// Best and second-best train descriptor for every query (brute force).
///
/// Queries with fewer than two candidates get `None`.
pub fn knn2(query: &[Descriptor], train: &[Descriptor]) -> Vec<Option<(Match, u32)>> {
    query
        .par_iter()
        .enumerate()
        .map(|(qi, q)| {
            let mut best: Option<(usize, u32)> = None;
            let mut second = u32::MAX;
            for (ti, t) in train.iter().enumerate() {
                let d = hamming(q, t);
                match best {
                    Some((_, bd)) if d >= bd => second = second.min(d),
                    _ => {
                        if let Some((_, bd)) = best {
                            second = bd;
                        }
                        best = Some((ti, d));
                    }
                }
            }
            let (train, distance) = best?;
            (second != u32::MAX).then_some((
                Match {
                    query: qi,
                    train,
                    distance,
                },
                second,
            ))
        })
        .collect()
}

/// Lowe's ratio test: keep a match only if clearly better than the runner-up.
pub fn ratio_filter(candidates: &[Option<(Match, u32)>], ratio: f32) -> Vec<Match> {
    candidates
        .iter()
        .flatten()
        .filter(|(m, second)| (m.distance as f32) < ratio * *second as f32)
        .map(|(m, _)| *m)
        .collect()
}

/// Ratio-tested matches from `a` to `b` that are also chosen from `b` to `a`.
///
/// Returned matches use `a` indices as `query` and `b` indices as `train`.
pub fn mutual_matches(a: &[Descriptor], b: &[Descriptor], ratio: f32) -> Vec<Match> {
    let (forward, backward) = rayon::join(
        || ratio_filter(&knn2(a, b), ratio),
        || ratio_filter(&knn2(b, a), ratio),
    );

    let reverse: HashSet<(usize, usize)> = backward.iter().map(|m| (m.train, m.query)).collect();
    forward
        .into_iter()
        .filter(|m| reverse.contains(&(m.query, m.train)))
        .collect()
}
