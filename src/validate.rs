//! Analytic validation of the pipeline's results
//!
//! The inputs are seeded from arithmetic progressions, so every result has
//! a closed form: with `S = Σ_{k=1}^{n} k`, each element of `A·B·C` and
//! `D·C·B` is `(j+1)·S²`, and therefore
//! `P[i][j] = (j+1)·(n+1)·S²` for every row `i`. The validator recomputes
//! these expectations independently and compares them against what the
//! worker group actually produced.
//!
//! The global-average check is size-conditional: above
//! [`AVG_CHECK_LIMIT`] the summation-order sensitivity of floating-point
//! addition drifts the computed `avgP` away from the closed form far
//! enough to produce false positives, so the comparison is skipped there.
//! This is a documented limitation of the validator, not a defect in the
//! computation.

use crate::pipeline::Outcome;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Dimension at or above which the `avgP` comparison is skipped
pub const AVG_CHECK_LIMIT: usize = 1024;

/// One element of `P` that disagreed with its closed-form expectation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Row index
    pub row: usize,
    /// Column index
    pub col: usize,
    /// Closed-form expected value
    pub expected: f64,
    /// Value the pipeline produced
    pub actual: f64,
}

/// Outcome of the size-conditional global-average check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AverageCheck {
    /// `n ≥ AVG_CHECK_LIMIT`: comparison skipped by design
    Skipped,
    /// Computed average matched the closed form exactly
    Agreed {
        /// The agreed value
        value: f64,
    },
    /// Computed average disagreed with the closed form
    Disagreed {
        /// Closed-form expected average
        expected: f64,
        /// Average the pipeline produced
        actual: f64,
    },
}

/// Full validation report for one pipeline outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// Whether `minA == 1` and `maxD == n` held exactly
    pub extrema_ok: bool,
    /// Result of the size-conditional `avgP` check
    pub average: AverageCheck,
    /// Every element of `P` that missed its expectation
    pub mismatches: Vec<Mismatch>,
}

impl Validation {
    /// Final verdict: everything checked agreed
    pub fn passed(&self) -> bool {
        self.extrema_ok
            && !matches!(self.average, AverageCheck::Disagreed { .. })
            && self.mismatches.is_empty()
    }
}

/// Recomputes expected values from the generating formulas and compares
///
/// # Example
///
/// ```
/// use tormenta::{run, RunConfig, Validator};
///
/// let cfg = RunConfig::new(4, 2, 2).unwrap();
/// let outcome = run(&cfg).unwrap();
/// let report = Validator::new(4).check(&outcome);
/// assert!(report.passed());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    n: usize,
    /// `S² `, the value every element of the chained products shares
    square_sum: f64,
    /// `P₁ = (n+1)·S²`, the first element of `P`
    p_first: f64,
}

impl Validator {
    /// Derives the closed-form constants for dimension `n`
    pub fn new(n: usize) -> Self {
        let s = progression_sum(n);
        let square_sum = s * s;
        let p_first = (n as f64 + 1.0) * square_sum;
        Validator {
            n,
            square_sum,
            p_first,
        }
    }

    /// Expected value of every element in column `j` of `P`
    ///
    /// All rows are identical by construction.
    pub fn expected_element(&self, col: usize) -> f64 {
        ((col + 1) * (self.n + 1)) as f64 * self.square_sum
    }

    /// Closed-form expected global average of `P`
    ///
    /// Reproduces the summation order of the computation it is compared
    /// against: one `(i+1)·P₁` accumulation per column, scaled by `n` rows,
    /// divided by the element count.
    pub fn expected_average(&self) -> f64 {
        let mut acc = 0.0;
        for i in 0..self.n {
            acc += (i + 1) as f64 * self.p_first;
        }
        acc *= self.n as f64;
        acc / (self.n * self.n) as f64
    }

    /// Compares a pipeline outcome against the closed-form expectations
    ///
    /// The extrema comparison is exact; the average comparison is exact but
    /// skipped at `n ≥ AVG_CHECK_LIMIT`; the element-wise scan of `P` is
    /// always performed and reports every mismatch with its coordinates.
    #[cfg_attr(feature = "tracing", instrument(skip_all, fields(n = self.n)))]
    pub fn check(&self, outcome: &Outcome) -> Validation {
        let extrema_ok = outcome.min_a == 1.0 && outcome.max_d == self.n as f64;

        let average = if self.n < AVG_CHECK_LIMIT {
            let expected = self.expected_average();
            if outcome.avg_p == expected {
                AverageCheck::Agreed { value: expected }
            } else {
                AverageCheck::Disagreed {
                    expected,
                    actual: outcome.avg_p,
                }
            }
        } else {
            AverageCheck::Skipped
        };

        Validation {
            extrema_ok,
            average,
            mismatches: self.scan_elements(outcome.p.as_slice()),
        }
    }

    /// Element-wise scan of `P` against the closed form
    fn scan_elements(&self, p: &[f64]) -> Vec<Mismatch> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            return p
                .par_chunks(self.n)
                .enumerate()
                .flat_map_iter(|(row, values)| self.scan_row(row, values))
                .collect();
        }
        #[cfg(not(feature = "parallel"))]
        {
            p.chunks(self.n)
                .enumerate()
                .flat_map(|(row, values)| self.scan_row(row, values))
                .collect()
        }
    }

    fn scan_row<'v>(
        &self,
        row: usize,
        values: &'v [f64],
    ) -> impl Iterator<Item = Mismatch> + 'v {
        let this = *self;
        values.iter().enumerate().filter_map(move |(col, &actual)| {
            let expected = this.expected_element(col);
            (actual != expected).then_some(Mismatch {
                row,
                col,
                expected,
                actual,
            })
        })
    }
}

/// `S = 1 + 2 + ... + n`, accumulated the way the computation does
fn progression_sum(n: usize) -> f64 {
    let mut s = 0.0;
    for i in 0..n {
        s += (i + 1) as f64;
    }
    s
}
