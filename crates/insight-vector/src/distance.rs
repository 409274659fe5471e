//! Distance kernels

/// Squared Euclidean distance
///
/// Callers guarantee equal lengths; extra elements of the longer slice are
/// ignored.
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut sum = 0.0;
    let mut i = 0;

    // Unrolled by 4
    while i + 3 < n {
        let d0 = a[i] - b[i];
        let d1 = a[i + 1] - b[i + 1];
        let d2 = a[i + 2] - b[i + 2];
        let d3 = a[i + 3] - b[i + 3];
        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3;
        i += 4;
    }

    while i < n {
        let d = a[i] - b[i];
        sum += d * d;
        i += 1;
    }

    sum
}

/// Scale `v` to unit length in place; the zero vector is left unchanged
pub fn l2_normalize(v: &mut [f32]) {
    let length: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if length > 0.0 {
        v.iter_mut().for_each(|x| *x /= length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_distance_with_remainder() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [1.0, 2.0, 3.0, 4.0, 8.0];
        assert_eq!(euclidean_distance_squared(&a, &b), 9.0);
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = [0.3, -1.5, 2.25];
        assert_eq!(euclidean_distance_squared(&a, &a), 0.0);
    }

    #[test]
    fn test_normalize() {
        let mut v = [3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = [0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, [0.0, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_unrolled_matches_plain_sum(
            pairs in prop::collection::vec((-100.0f32..100.0, -100.0f32..100.0), 0..40)
        ) {
            let a: Vec<f32> = pairs.iter().map(|p| p.0).collect();
            let b: Vec<f32> = pairs.iter().map(|p| p.1).collect();
            let plain: f64 = pairs
                .iter()
                .map(|(x, y)| (*x as f64 - *y as f64).powi(2))
                .sum();

            let fast = euclidean_distance_squared(&a, &b) as f64;
            prop_assert!((fast - plain).abs() <= 1e-3 * plain.max(1.0));
        }
    }
}
