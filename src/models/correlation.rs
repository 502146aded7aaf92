use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Latest-snapshot correlation state over the active pair universe.
/// Replaced wholesale on every recompute - readers hold an Arc to a finished
/// matrix and can never observe a partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub pairs: Vec<String>,
    /// Row-major coefficient table, len = pairs.len()^2.
    /// Symmetric with diagonal fixed at 1.0, every entry in [-1, 1].
    coefficients: Vec<f64>,
    pub window_size: usize,
    pub computed_at_ms: i64,
}

impl CorrelationMatrix {
    /// Build from an upper-triangle coefficient map. Missing entries default
    /// to the fail-safe worst case (1.0): a pair we know nothing about is
    /// treated as moving in lockstep with everything.
    pub fn from_upper_triangle(
        pairs: Vec<String>,
        upper: &HashMap<(usize, usize), f64>,
        window_size: usize,
        computed_at_ms: i64,
    ) -> Self {
        let n = pairs.len();
        let mut coefficients = vec![1.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let coeff = upper.get(&(i, j)).copied().unwrap_or(1.0).clamp(-1.0, 1.0);
                coefficients[i * n + j] = coeff;
                coefficients[j * n + i] = coeff;
            }
        }
        Self {
            pairs,
            coefficients,
            window_size,
            computed_at_ms,
        }
    }

    pub fn coefficient(&self, pair_a: &str, pair_b: &str) -> Option<f64> {
        let i = self.pairs.iter().position(|p| p == pair_a)?;
        let j = self.pairs.iter().position(|p| p == pair_b)?;
        Some(self.coefficients[i * self.pairs.len() + j])
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Informational record of a coefficient crossing the breach threshold
/// between two recomputes. Separate from hard cap enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAlert {
    pub pair_a: String,
    pub pair_b: String,
    pub coefficient: f64,
    pub threshold: f64,
    /// true = crossed above the threshold, false = dropped back below
    pub crossed_above: bool,
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_of(pairs: &[&str], upper: &[((usize, usize), f64)]) -> CorrelationMatrix {
        let map: HashMap<(usize, usize), f64> = upper.iter().copied().collect();
        CorrelationMatrix::from_upper_triangle(
            pairs.iter().map(|s| s.to_string()).collect(),
            &map,
            50,
            0,
        )
    }

    #[test]
    fn symmetric_with_unit_diagonal() {
        let m = matrix_of(
            &["A", "B", "C"],
            &[((0, 1), 0.85), ((0, 2), -0.4), ((1, 2), 0.1)],
        );
        for p in ["A", "B", "C"] {
            assert_eq!(m.coefficient(p, p), Some(1.0));
        }
        assert_eq!(m.coefficient("A", "B"), m.coefficient("B", "A"));
        assert_eq!(m.coefficient("A", "C"), Some(-0.4));
    }

    #[test]
    fn values_clamped_to_unit_interval() {
        let m = matrix_of(&["A", "B"], &[((0, 1), 1.7)]);
        assert_eq!(m.coefficient("A", "B"), Some(1.0));
    }

    #[test]
    fn missing_entries_fail_safe_to_one() {
        // No upper-triangle entry supplied for (A, B)
        let m = matrix_of(&["A", "B"], &[]);
        assert_eq!(m.coefficient("A", "B"), Some(1.0));
    }

    #[test]
    fn unknown_pair_is_none() {
        let m = matrix_of(&["A", "B"], &[((0, 1), 0.2)]);
        assert_eq!(m.coefficient("A", "Z"), None);
    }
}
