use sha2::{Digest, Sha256};

/// Arithmetic mean. `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around a precomputed `mean`.
pub fn sd(values: &[f64], mean: f64) -> f64 {
    (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Hex SHA-256 over `parts`. Each part is prefixed with its length, so
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn digest<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::*;

    #[test]
    fn moments() {
        let values = [2., 4., 4., 4., 5., 5., 7., 9.];
        let m = mean(&values);
        assert!(approx_eq!(f64, m, 5.));
        assert!(approx_eq!(f64, sd(&values, m), 2.));
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn digest_is_length_prefixed() {
        let a = digest([b"ab".as_slice(), b"c".as_slice()]);
        let b = digest([b"a".as_slice(), b"bc".as_slice()]);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, digest([b"ab".as_slice(), b"c".as_slice()]));
    }
}
