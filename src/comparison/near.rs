use std::fmt::Write;

use half::{bf16, f16};
use num::complex::Complex32;

use super::{equal_shapes, index_string};
use crate::{
    error::{EvalError, Result},
    invalid_argument,
    literal::Literal,
    shape::try_for_each_index,
    types::{NativeType, PrimitiveType},
};

/// Error bounds for [`near`](super::near). An element mismatches when it
/// exceeds *both* the absolute and the relative bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSpec {
    pub abs: f64,
    pub rel: f64,
    /// Accept an expected NaN against any actual value. An actual NaN where a
    /// number was expected still fails.
    pub relaxed_nans: bool,
}

impl ErrorSpec {
    pub fn new(abs: f64, rel: f64) -> Self {
        Self {
            abs,
            rel,
            relaxed_nans: false,
        }
    }

    pub fn with_relaxed_nans(mut self, relaxed_nans: bool) -> Self {
        self.relaxed_nans = relaxed_nans;
        self
    }
}

/// Called with `(expected, actual, mismatches)` when a comparison fails.
/// `mismatches` is a predicate literal shaped like `actual`.
pub type MiscompareCallback<'a> = dyn Fn(&Literal, &Literal, &Literal) + 'a;

/// Floating point element types the near comparison understands. Complex
/// numbers are compared part by part.
pub trait NearElement: NativeType {
    const PARTS: usize = 1;

    fn part(self, i: usize) -> f64;

    fn describe(self) -> String {
        format!("{:>10.4e}", self.part(0))
    }
}

impl NearElement for f16 {
    fn part(self, _: usize) -> f64 {
        self.to_f64()
    }
}

impl NearElement for bf16 {
    fn part(self, _: usize) -> f64 {
        self.to_f64()
    }
}

impl NearElement for f32 {
    fn part(self, _: usize) -> f64 {
        self as f64
    }
}

impl NearElement for f64 {
    fn part(self, _: usize) -> f64 {
        self
    }
}

impl NearElement for Complex32 {
    const PARTS: usize = 2;

    fn part(self, i: usize) -> f64 {
        if i == 0 {
            self.re as f64
        } else {
            self.im as f64
        }
    }

    fn describe(self) -> String {
        format!("{:>10.4e} + {:>10.4e}i", self.re, self.im)
    }
}

const TOP_RELATIVE_ERROR_COUNT: usize = 5;

/// Bounds of the buckets actual values are sorted into by magnitude.
const ABS_VALUE_BUCKET_BOUNDS: [f64; 7] = [0.0, 0.0001, 0.001, 0.01, 0.1, 1.0, f64::INFINITY];

/// Lower bounds of the cumulative error buckets.
const ERROR_BUCKET_BOUNDS: [f64; 5] = [0.0001, 0.001, 0.01, 0.1, 1.0];

#[derive(Debug, Clone)]
struct Mismatch<T> {
    actual: T,
    expected: T,
    rel_error: f64,
    abs_error: f64,
    index: Vec<usize>,
}

/// Elementwise comparison of two floating point arrays within an
/// [`ErrorSpec`], collecting statistics for the failure report.
pub struct NearComparator<'a, T> {
    expected: &'a Literal,
    actual: &'a Literal,
    error: ErrorSpec,
    detailed_message: bool,
    miscompare_callback: Option<&'a MiscompareCallback<'a>>,

    num_mismatches: usize,
    num_nan_mismatches: usize,
    num_abs_mismatches: usize,
    num_rel_mismatches: usize,
    mismatches: Literal,
    /// Worst mismatches by relative error, largest first.
    top_rel_mismatches: Vec<Mismatch<T>>,
    /// (elements, mismatches) per magnitude bucket.
    abs_value_buckets: [(usize, usize); ABS_VALUE_BUCKET_BOUNDS.len() - 1],
    abs_error_buckets: [usize; ERROR_BUCKET_BOUNDS.len()],
    rel_error_buckets: [usize; ERROR_BUCKET_BOUNDS.len()],
}

/// Errors of one compared part.
struct PartResult {
    mismatch: bool,
    abs_error: f64,
    rel_error: f64,
}

impl<'a, T: NearElement> NearComparator<'a, T> {
    pub fn compare(
        expected: &'a Literal,
        actual: &'a Literal,
        error: &ErrorSpec,
        detailed_message: bool,
        miscompare_callback: Option<&'a MiscompareCallback<'a>>,
    ) -> Result<()> {
        NearComparator::<T>::new(expected, actual, *error, detailed_message, miscompare_callback)
            .run()
    }

    fn new(
        expected: &'a Literal,
        actual: &'a Literal,
        error: ErrorSpec,
        detailed_message: bool,
        miscompare_callback: Option<&'a MiscompareCallback<'a>>,
    ) -> Self {
        Self {
            expected,
            actual,
            error,
            detailed_message,
            miscompare_callback,
            num_mismatches: 0,
            num_nan_mismatches: 0,
            num_abs_mismatches: 0,
            num_rel_mismatches: 0,
            mismatches: Literal::new(actual.shape().with_element_type(PrimitiveType::Pred)),
            top_rel_mismatches: Vec::with_capacity(TOP_RELATIVE_ERROR_COUNT + 1),
            abs_value_buckets: Default::default(),
            abs_error_buckets: Default::default(),
            rel_error_buckets: Default::default(),
        }
    }

    fn run(mut self) -> Result<()> {
        // A shape mismatch is a type error, not worth a value report.
        equal_shapes(self.expected.shape(), self.actual.shape())?;
        if !self.expected.shape().is_array() {
            invalid_argument!("Expected array shape; got {}.", self.expected.shape());
        }
        self.compare_literals()?;
        if self.num_mismatches == 0 {
            return Ok(());
        }
        if let Some(callback) = self.miscompare_callback {
            callback(self.expected, self.actual, &self.mismatches);
        }
        Err(EvalError::InvalidArgument(self.error_message()))
    }

    fn compare_literals(&mut self) -> Result<()> {
        let (expected, actual) = (self.expected, self.actual);
        let (want, got) = (expected.data::<T>()?, actual.data::<T>()?);
        try_for_each_index(actual.dimensions(), |index| {
            let position = actual.linear_index(index);
            self.compare_values(want[expected.linear_index(index)], got[position], position, index)
        })
    }

    fn compare_values(
        &mut self,
        expected: T,
        actual: T,
        position: usize,
        index: &[usize],
    ) -> Result<()> {
        let mut worst: Option<PartResult> = None;
        for i in 0..T::PARTS {
            let part = self.compare_part(expected.part(i), actual.part(i));
            if part.mismatch && worst.as_ref().map_or(true, |w| part.rel_error > w.rel_error) {
                worst = Some(part);
            }
        }
        let Some(worst) = worst else {
            return Ok(());
        };

        self.num_mismatches += 1;
        self.mismatches.data_mut::<bool>()?[position] = true;

        let full = self.top_rel_mismatches.len() >= TOP_RELATIVE_ERROR_COUNT;
        let smallest = self.top_rel_mismatches.last().map(|m| m.rel_error);
        if !full || smallest.map_or(true, |s| worst.rel_error > s) {
            self.top_rel_mismatches.push(Mismatch {
                actual,
                expected,
                rel_error: worst.rel_error,
                abs_error: worst.abs_error,
                index: index.to_vec(),
            });
            self.top_rel_mismatches
                .sort_by(|a, b| b.rel_error.total_cmp(&a.rel_error));
            self.top_rel_mismatches.truncate(TOP_RELATIVE_ERROR_COUNT);
        }
        Ok(())
    }

    fn compare_part(&mut self, expected: f64, actual: f64) -> PartResult {
        let is_nan_mismatch = nan_mismatch(expected, actual, self.error.relaxed_nans);
        let (abs_error, rel_error) = if expected.to_bits() == actual.to_bits() {
            (0.0, 0.0)
        } else if is_nan_mismatch {
            // Infinite so the top list keeps a total order.
            self.num_nan_mismatches += 1;
            (f64::INFINITY, f64::INFINITY)
        } else if expected.is_infinite() || actual.is_infinite() {
            (f64::INFINITY, f64::INFINITY)
        } else {
            let abs_error = (actual - expected).abs();
            (abs_error, abs_error / expected.abs())
        };
        let is_abs_mismatch = abs_error > self.error.abs;
        let is_rel_mismatch = rel_error > self.error.rel;
        let mismatch = is_nan_mismatch || (is_abs_mismatch && is_rel_mismatch);

        // Each error bucket only sees elements that broke the other bound.
        if is_abs_mismatch {
            self.num_abs_mismatches += 1;
            bump_error_buckets(&mut self.rel_error_buckets, rel_error);
        }
        if is_rel_mismatch {
            self.num_rel_mismatches += 1;
            bump_error_buckets(&mut self.abs_error_buckets, abs_error);
        }

        let magnitude = actual.abs();
        let last = self.abs_value_buckets.len() - 1;
        let bucket = (0..last)
            .find(|&i| {
                (ABS_VALUE_BUCKET_BOUNDS[i]..ABS_VALUE_BUCKET_BOUNDS[i + 1]).contains(&magnitude)
            })
            .unwrap_or(last);
        self.abs_value_buckets[bucket].0 += 1;
        if mismatch {
            self.abs_value_buckets[bucket].1 += 1;
        }

        PartResult {
            mismatch,
            abs_error,
            rel_error,
        }
    }

    fn error_message(&self) -> String {
        let shape = self.actual.shape();
        let element_count = shape.element_count();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "\nMismatch count {} ({}) in shape {} ({} elements), abs bound {}, rel bound {}",
            self.num_mismatches,
            percent(self.num_mismatches, element_count),
            shape,
            element_count,
            self.error.abs,
            self.error.rel
        );
        if self.num_nan_mismatches > 0 {
            let _ = writeln!(out, "nan mismatches {}", self.num_nan_mismatches);
        }
        out.push_str("Top relative error mismatches:\n");
        for m in &self.top_rel_mismatches {
            let _ = writeln!(
                out,
                "  actual {}, expected {}, index {}, rel error {:8.3e}, abs error {:8.3e}",
                m.actual.describe(),
                m.expected.describe(),
                index_string(&m.index),
                m.rel_error,
                m.abs_error
            );
        }
        if !self.detailed_message {
            return out;
        }

        out.push_str("Absolute magnitude breakdown of actual values:\n");
        for (i, (size, mismatches)) in self.abs_value_buckets.iter().enumerate() {
            let mismatch_str = if *mismatches > 0 {
                format!(", mismatches {mismatches}")
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "  {:<6} <= x < {:<6} : {:>7} ({:>9}){}",
                ABS_VALUE_BUCKET_BOUNDS[i],
                ABS_VALUE_BUCKET_BOUNDS[i + 1],
                size,
                percent(*size, element_count),
                mismatch_str
            );
        }

        let mut accumulated = |header: &str, total: usize, buckets: &[usize]| {
            let _ = writeln!(out, "{header}:");
            let below = total - buckets[0];
            let _ = writeln!(
                out,
                "  <  {:<6} : {:>7} ({})",
                ERROR_BUCKET_BOUNDS[0],
                below,
                percent(below, total)
            );
            for (bound, count) in ERROR_BUCKET_BOUNDS.iter().zip(buckets) {
                let _ = writeln!(
                    out,
                    "  >= {:<6} : {:>7} ({})",
                    bound,
                    count,
                    percent(*count, total)
                );
            }
        };
        accumulated(
            &format!(
                "Elements exceeding abs error bound {}: {} ({})\nRelative error breakdown of elements exceeding abs error bound",
                self.error.abs,
                self.num_abs_mismatches,
                percent(self.num_abs_mismatches, element_count)
            ),
            self.num_abs_mismatches,
            &self.rel_error_buckets,
        );
        accumulated(
            &format!(
                "Elements exceeding rel error bound {}: {} ({})\nAbsolute error breakdown of elements exceeding rel error bound",
                self.error.rel,
                self.num_rel_mismatches,
                percent(self.num_rel_mismatches, element_count)
            ),
            self.num_rel_mismatches,
            &self.abs_error_buckets,
        );
        out
    }
}

fn nan_mismatch(expected: f64, actual: f64, relaxed_nans: bool) -> bool {
    if relaxed_nans {
        !expected.is_nan() && actual.is_nan()
    } else {
        expected.is_nan() != actual.is_nan()
    }
}

fn bump_error_buckets(buckets: &mut [usize], error: f64) {
    for (bucket, bound) in buckets.iter_mut().zip(ERROR_BUCKET_BOUNDS) {
        if error >= bound {
            *bucket += 1;
        }
    }
}

fn percent(a: usize, b: usize) -> String {
    let pct = if b == 0 { 0.0 } else { 100.0 * a as f64 / b as f64 };
    format!("{pct:.4}%")
}
