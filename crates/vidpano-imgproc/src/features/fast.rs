use rayon::prelude::*;
use vidpano_image::{Image, ImageError};

use super::Keypoint;

/// Offsets `(dx, dy)` of the 16 pixel Bresenham circle of radius 3.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Fast feature detector
///
/// A pixel is a corner when at least `arc_length` contiguous pixels of the
/// circle are all brighter than `center + threshold` or all darker than
/// `center - threshold`. Corners are scored by the sum of absolute
/// differences exceeding the threshold and thinned with a 3x3 non-maximum
/// suppression.
///
/// # Arguments
///
/// * `src` - The source image as Gray8 image.
/// * `threshold` - The intensity threshold.
/// * `arc_length` - The number of contiguous pixels required, in `1..=16`.
///
/// # Returns
///
/// The detected keypoints with their response; orientation is left at zero.
pub fn fast_feature_detector(
    src: &Image<u8, 1>,
    threshold: u8,
    arc_length: u8,
) -> Result<Vec<Keypoint>, ImageError> {
    let (cols, rows) = (src.cols(), src.rows());
    if cols < 7 || rows < 7 {
        return Ok(Vec::new());
    }

    let arc_length = arc_length.clamp(1, 16) as usize;
    let data = src.as_slice();
    let offsets = CIRCLE.map(|(dx, dy)| dy * cols as isize + dx);

    // score map, zero means no corner
    let mut scores = vec![0u32; cols * rows];
    scores
        .par_chunks_exact_mut(cols)
        .enumerate()
        .skip(3)
        .take(rows - 6)
        .for_each(|(y, score_row)| {
            for (x, score) in score_row.iter_mut().enumerate().take(cols - 3).skip(3) {
                let idx = (y * cols + x) as isize;
                *score = corner_score(data, idx, &offsets, threshold, arc_length);
            }
        });

    // non-maximum suppression, ties are resolved in favour of the first pixel in raster order
    let scores = &scores;
    let keypoints = (3..rows - 3)
        .into_par_iter()
        .flat_map_iter(|y| {
            (3..cols - 3).filter_map(move |x| {
                let s = scores[y * cols + x];
                if s == 0 {
                    return None;
                }
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let ny = (y as isize + dy) as usize;
                        let nx = (x as isize + dx) as usize;
                        let n = scores[ny * cols + nx];
                        let before = dy < 0 || (dy == 0 && dx < 0);
                        if n > s || (before && n == s) {
                            return None;
                        }
                    }
                }
                Some(Keypoint {
                    x: x as f32,
                    y: y as f32,
                    response: s as f32,
                    angle: 0.0,
                })
            })
        })
        .collect();

    Ok(keypoints)
}

fn corner_score(
    data: &[u8],
    idx: isize,
    offsets: &[isize; 16],
    threshold: u8,
    arc_length: usize,
) -> u32 {
    let center = data[idx as usize] as i16;
    let t = threshold as i16;

    let mut diffs = [0i16; 16];
    for (d, off) in diffs.iter_mut().zip(offsets.iter()) {
        *d = data[(idx + off) as usize] as i16 - center;
    }

    let brighter = longest_arc(&diffs, |d| d > t);
    let darker = longest_arc(&diffs, |d| d < -t);

    if brighter < arc_length && darker < arc_length {
        return 0;
    }

    diffs
        .iter()
        .map(|&d| (d.unsigned_abs() as i16 - t).max(0) as u32)
        .sum::<u32>()
        .max(1)
}

/// Length of the longest run of pixels satisfying `pred`, wrapping around the circle.
fn longest_arc(diffs: &[i16; 16], pred: impl Fn(i16) -> bool) -> usize {
    let mut best = 0;
    let mut run = 0;
    for i in 0..32 {
        if pred(diffs[i % 16]) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best.min(16)
}
