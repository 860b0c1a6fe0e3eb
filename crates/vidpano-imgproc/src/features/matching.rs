use rayon::prelude::*;

use super::BinaryDescriptor;

/// A correspondence between a query and a train descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorMatch {
    /// Index into the query descriptors.
    pub query_idx: usize,
    /// Index into the train descriptors.
    pub train_idx: usize,
    /// Hamming distance between both descriptors.
    pub distance: u32,
}

/// Hamming distance between two binary descriptors.
#[inline]
pub fn hamming_distance(a: &BinaryDescriptor, b: &BinaryDescriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Brute-force k nearest neighbour matching under the Hamming distance.
///
/// For every query descriptor returns up to `k` train matches sorted by
/// increasing distance. Ties keep the lower train index first.
///
/// # Example
///
/// ```
/// use vidpano_imgproc::features::knn_match_hamming;
///
/// let query = [[0u8; 32]];
/// let train = [[0xffu8; 32], [0x01u8; 32]];
/// let matches = knn_match_hamming(&query, &train, 2);
///
/// assert_eq!(matches[0][0].train_idx, 1);
/// assert_eq!(matches[0][0].distance, 32);
/// assert_eq!(matches[0][1].distance, 256);
/// ```
pub fn knn_match_hamming(
    query: &[BinaryDescriptor],
    train: &[BinaryDescriptor],
    k: usize,
) -> Vec<Vec<DescriptorMatch>> {
    query
        .par_iter()
        .enumerate()
        .map(|(query_idx, q)| {
            let mut best: Vec<DescriptorMatch> = Vec::with_capacity(k + 1);
            for (train_idx, t) in train.iter().enumerate() {
                let distance = hamming_distance(q, t);
                if best.len() == k && best.last().is_some_and(|m| m.distance <= distance) {
                    continue;
                }
                let pos = best.partition_point(|m| m.distance <= distance);
                best.insert(
                    pos,
                    DescriptorMatch {
                        query_idx,
                        train_idx,
                        distance,
                    },
                );
                best.truncate(k);
            }
            best
        })
        .collect()
}

/// Keep the best match of each query when it is clearly better than the runner-up.
///
/// A match is accepted when `best.distance < ratio * second.distance`. Queries
/// with fewer than two candidates are discarded.
pub fn ratio_test(knn_matches: &[Vec<DescriptorMatch>], ratio: f32) -> Vec<DescriptorMatch> {
    knn_matches
        .iter()
        .filter_map(|candidates| match candidates.as_slice() {
            [best, second, ..] if (best.distance as f32) < ratio * second.distance as f32 => {
                Some(*best)
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming() {
        let a = [0b1010_1010u8; 32];
        let b = [0b0101_0101u8; 32];
        assert_eq!(hamming_distance(&a, &a), 0);
        assert_eq!(hamming_distance(&a, &b), 256);
    }

    #[test]
    fn knn_sorted_and_bounded() {
        let mut d1 = [0u8; 32];
        d1[0] = 0b1;
        let mut d3 = [0u8; 32];
        d3[0] = 0b111;
        let train = [d3, [0u8; 32], d1];
        let query = [[0u8; 32]];

        let matches = knn_match_hamming(&query, &train, 2);
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0],
            vec![
                DescriptorMatch {
                    query_idx: 0,
                    train_idx: 1,
                    distance: 0
                },
                DescriptorMatch {
                    query_idx: 0,
                    train_idx: 2,
                    distance: 1
                },
            ]
        );
    }

    #[test]
    fn knn_fewer_train_than_k() {
        let matches = knn_match_hamming(&[[0u8; 32]], &[[1u8; 32]], 2);
        assert_eq!(matches[0].len(), 1);
        assert!(ratio_test(&matches, 0.8).is_empty());
    }

    #[test]
    fn ratio_rejects_ambiguous() {
        let m = |train_idx, distance| DescriptorMatch {
            query_idx: 0,
            train_idx,
            distance,
        };
        let knn = vec![vec![m(0, 10), m(1, 11)], vec![m(2, 10), m(3, 40)]];
        let accepted = ratio_test(&knn, 0.8);
        assert_eq!(accepted, vec![m(2, 10)]);
    }
}
