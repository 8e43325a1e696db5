//! Frame-sequence alignments and the Mahalanobis frame distance.

use super::{Frames, ZERO_FRAME_PENALTY};

/// Per-dimension variance over every frame of every sequence.
///
/// Returns zeros when there are no frames at all.
pub fn frame_variance(sequences: &[Frames], dimension: usize) -> Vec<f64> {
    let mut sum = vec![0.0f64; dimension];
    let mut sum_sq = vec![0.0f64; dimension];
    let mut n = 0.0f64;
    for frames in sequences {
        for frame in frames.iter() {
            n += 1.0;
            for (k, &v) in frame.iter().enumerate() {
                let v = v as f64;
                sum[k] += v;
                sum_sq[k] += v * v;
            }
        }
    }
    if n == 0.0 {
        return vec![0.0; dimension];
    }
    sum.iter()
        .zip(&sum_sq)
        .map(|(&s, &sq)| (sq - s * s / n) / n)
        .collect()
}

/// Sum over dimensions of squared difference divided by variance.
#[inline(always)]
pub fn mahalanobis(a: &[f32], b: &[f32], sigma2: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .zip(sigma2)
        .map(|((&x, &y), &s2)| {
            let diff = x as f64 - y as f64;
            diff * diff / s2
        })
        .sum()
}

#[inline(always)]
fn finite_or_penalty(d: f64) -> f64 {
    if d.is_finite() {
        d
    } else {
        ZERO_FRAME_PENALTY
    }
}

/// Average Mahalanobis distance along a linear stretch of the shorter
/// sequence onto the longer one.
///
/// Frame distances that are infinite or NaN count as the large penalty.
/// Both sequences must be non-empty.
pub fn stretch_distance(seq1: &Frames, seq2: &Frames, sigma2: &[f64]) -> f64 {
    let (shorter, longer) = if seq1.len() < seq2.len() { (seq1, seq2) } else { (seq2, seq1) };
    // single precision, as the mapping has always been computed
    let length_factor = shorter.len() as f32 / longer.len() as f32;
    let mut total = 0.0;
    for i in 0..longer.len() {
        let i_shorter = (length_factor * i as f32) as usize;
        total += finite_or_penalty(mahalanobis(longer.frame(i), shorter.frame(i_shorter), sigma2));
    }
    total / longer.len() as f64
}

/// Average Mahalanobis distance along the optimal warping path, under the
/// constraint
///
/// ```text
/// D(i,j) = min { D(i-2,j-1) + 2d(i-1,j) + d(i,j) ;
///                D(i-1,j-1) + 2d(i,j) ;
///                D(i-1,j-2) + 2d(i,j-1) + d(i,j) }
/// ```
///
/// The cumulated distance is divided by the number of local distances
/// cumulated along the chosen path. Both sequences must be non-empty.
pub fn dtw_distance(seq1: &Frames, seq2: &Frames, sigma2: &[f64]) -> f64 {
    let (l1, l2) = (seq1.len(), seq2.len());
    let mut d = vec![vec![0.0f64; l2]; l1];
    for (i, row) in d.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = mahalanobis(seq1.frame(i), seq2.frame(j), sigma2);
        }
    }
    let mut cum = vec![vec![0.0f64; l2]; l1];
    let mut count = vec![vec![0u32; l2]; l1];

    // first row and column
    cum[0][0] = 2.0 * d[0][0];
    count[0][0] = 2;
    for i in 1..l1 {
        cum[i][0] = d[i][0];
        count[i][0] = 1;
    }
    for j in 1..l2 {
        cum[0][j] = d[0][j];
        count[0][j] = 1;
    }

    // second row and column
    if l1 > 1 && l2 > 1 {
        (cum[1][1], count[1][1]) = pick([
            (2.0 * d[0][1] + d[1][1], 3),
            (cum[0][0] + 2.0 * d[1][1], count[0][0] + 2),
            (2.0 * d[1][0] + d[1][1], 3),
        ]);
        for i in 2..l1 {
            (cum[i][1], count[i][1]) = pick([
                (cum[i - 2][0] + 2.0 * d[i - 1][1] + d[i][1], count[i - 2][0] + 3),
                (cum[i - 1][0] + 2.0 * d[i][1], count[i - 1][0] + 2),
                (2.0 * d[i][0] + d[i][1], 3),
            ]);
        }
        for j in 2..l2 {
            (cum[1][j], count[1][j]) = pick([
                (2.0 * d[0][j] + d[1][j], 3),
                (cum[0][j - 1] + 2.0 * d[1][j], count[0][j - 1] + 2),
                (cum[0][j - 2] + 2.0 * d[1][j - 1] + d[1][j], count[0][j - 2] + 3),
            ]);
        }
    }

    for i in 2..l1 {
        for j in 2..l2 {
            (cum[i][j], count[i][j]) = pick([
                (cum[i - 2][j - 1] + 2.0 * d[i - 1][j] + d[i][j], count[i - 2][j - 1] + 3),
                (cum[i - 1][j - 1] + 2.0 * d[i][j], count[i - 1][j - 1] + 2),
                (cum[i - 1][j - 2] + 2.0 * d[i][j - 1] + d[i][j], count[i - 1][j - 2] + 3),
            ]);
        }
    }

    finite_or_penalty(cum[l1 - 1][l2 - 1] / count[l1 - 1][l2 - 1] as f64)
}

/// Cheapest of the three predecessors; ties keep the earlier candidate.
#[inline(always)]
fn pick(candidates: [(f64, u32); 3]) -> (f64, u32) {
    let mut best = if candidates[0].0 < candidates[1].0 { 0 } else { 1 };
    if candidates[2].0 < candidates[best].0 {
        best = 2;
    }
    candidates[best]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(rows: &[&[f32]]) -> Frames {
        let rows: Vec<Vec<f32>> = rows.iter().map(|r| r.to_vec()).collect();
        Frames::from_rows(rows[0].len(), &rows)
    }

    #[test]
    fn variance_pools_all_frames() {
        let a = frames(&[&[1.0, 0.0], &[3.0, 0.0]]);
        let b = frames(&[&[5.0, 0.0]]);
        let s2 = frame_variance(&[a, b], 2);
        // mean 3, squared deviations 4 + 0 + 4
        assert!((s2[0] - 8.0 / 3.0).abs() < 1e-12);
        assert_eq!(s2[1], 0.0);
    }

    #[test]
    fn stretch_maps_by_scaled_index() {
        let longer = frames(&[&[0.0], &[0.0], &[0.0], &[0.0]]);
        let shorter = frames(&[&[0.0], &[2.0]]);
        // indices 0,0,1,1 on the shorter sequence: distances 0,0,4,4
        let d = stretch_distance(&longer, &shorter, &[1.0]);
        assert!((d - 2.0).abs() < 1e-12);
        assert_eq!(stretch_distance(&shorter, &longer, &[1.0]), d);
    }

    #[test]
    fn zero_variance_frames_take_the_penalty() {
        let a = frames(&[&[1.0]]);
        let d = stretch_distance(&a, &a, &[0.0]);
        assert_eq!(d, ZERO_FRAME_PENALTY);
    }

    #[test]
    fn dtw_of_identical_sequences_is_zero() {
        let a = frames(&[&[1.0], &[2.0], &[4.0], &[3.0]]);
        assert_eq!(dtw_distance(&a, &a, &[1.0]), 0.0);
    }

    #[test]
    fn dtw_single_frames_average_local_distance() {
        let a = frames(&[&[1.0]]);
        let b = frames(&[&[3.0]]);
        assert_eq!(dtw_distance(&a, &b, &[1.0]), 4.0);
    }

    #[test]
    fn dtw_first_column_holds_local_distances() {
        let a = frames(&[&[0.0], &[2.0]]);
        let b = frames(&[&[0.0]]);
        // the last cell of the first column is d(1,0) over one distance
        assert_eq!(dtw_distance(&a, &b, &[1.0]), 4.0);
    }

    #[test]
    fn dtw_averages_over_the_chosen_path() {
        let a = frames(&[&[0.0], &[1.0], &[3.0]]);
        let b = frames(&[&[0.0], &[0.0], &[1.0], &[2.0]]);
        // D(1,2) = 0 over 3 distances, then D(2,3) = D(1,2) + 2d(2,3) = 2 over 5
        let d = dtw_distance(&a, &b, &[1.0]);
        assert!((d - 0.4).abs() < 1e-12, "{d}");
        // transposed, the third predecessor mirrors the first
        let d = dtw_distance(&b, &a, &[1.0]);
        assert!((d - 0.4).abs() < 1e-12, "{d}");
    }

    #[test]
    fn dtw_takes_the_cheapest_predecessor() {
        let a = frames(&[&[0.0], &[1.0]]);
        let b = frames(&[&[1.0], &[1.0]]);
        // 2d(1,0) + d(1,1) = 0 beats both alternatives
        assert_eq!(dtw_distance(&a, &b, &[1.0]), 0.0);
        assert_eq!(pick([(2.0, 3), (2.0, 4), (3.0, 3)]), (2.0, 4));
    }
}
