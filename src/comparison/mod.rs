//! Literal comparison for tests and verification: exact (bitwise) equality and
//! tolerance based nearness.

mod near;

pub use near::{ErrorSpec, MiscompareCallback, NearComparator, NearElement};

use half::{bf16, f16};
use itertools::Itertools;
use num::complex::Complex32;
use tracing::debug;

use crate::{
    error::{EvalError, Result},
    invalid_argument, match_native,
    literal::Literal,
    shape::{try_for_each_index, Shape},
    types::{NativeType, PrimitiveType},
    unimplemented_err,
};

/// Check that two shapes agree on element type, tuple structure, rank and
/// dimensions. Layouts are ignored.
pub fn equal_shapes(expected: &Shape, actual: &Shape) -> Result<()> {
    if expected.element_type() != actual.element_type() {
        invalid_argument!("element type mismatch, want: {expected} got {actual}");
    }
    if expected.is_tuple() {
        let (want, got) = (expected.tuple_shapes(), actual.tuple_shapes());
        if want.len() != got.len() {
            invalid_argument!(
                "want tuple element count: {} got tuple element count: {}",
                want.len(),
                got.len()
            );
        }
        for (i, (e, a)) in want.iter().zip(got).enumerate() {
            if let Err(err) = equal_shapes(e, a) {
                invalid_argument!("{}; mismatch in tuple index {i}", err.message());
            }
        }
    } else if expected.is_array() {
        if expected.rank() != actual.rank() {
            invalid_argument!("want rank of {expected} got rank of {actual}");
        }
        if let Some(i) =
            (0..expected.rank()).find(|&i| expected.dimension(i) != actual.dimension(i))
        {
            invalid_argument!("mismatch in dimension #{i} expected: {expected} actual: {actual}");
        }
    }
    Ok(())
}

/// Exact equality. Floating point elements are compared by bit pattern, so
/// `-0.0 != +0.0` and NaNs only match when their encodings do.
pub fn equal(expected: &Literal, actual: &Literal) -> Result<()> {
    debug!("expected: {expected}");
    debug!("actual: {actual}");
    with_literals(equal_helper(expected, actual), expected, actual)
}

/// Compare within `error`. Floating and complex arrays go through a
/// [`NearComparator`]; everything else must be exactly [`equal`].
///
/// `miscompare_callback` receives the expected and actual literals plus a
/// predicate mask of the mismatching elements.
pub fn near(
    expected: &Literal,
    actual: &Literal,
    error: &ErrorSpec,
    detailed_message: bool,
    miscompare_callback: Option<&MiscompareCallback>,
) -> Result<()> {
    debug!("expected: {expected}");
    debug!("actual: {actual}");
    let result = near_helper(
        expected,
        actual,
        error,
        detailed_message,
        miscompare_callback,
        &[],
    );
    with_literals(result, expected, actual)
}

/// Elements in a literal, counting through tuples.
pub fn recursive_element_count(shape: &Shape) -> usize {
    if shape.is_tuple() {
        return shape.tuple_shapes().iter().map(recursive_element_count).sum();
    }
    if shape.is_array() {
        return shape.element_count();
    }
    0
}

/// `{1,2,0}` style rendering of a multi-index or shape index.
pub(crate) fn index_string(index: &[usize]) -> String {
    format!("{{{}}}", index.iter().join(","))
}

fn with_literals(result: Result<()>, expected: &Literal, actual: &Literal) -> Result<()> {
    result.map_err(|err| {
        EvalError::InvalidArgument(format!(
            "{}\n\nExpected literal:\n{}\n\nActual literal:\n{}",
            err.message(),
            expected.to_string_truncated(),
            actual.to_string_truncated()
        ))
    })
}

fn equal_helper(expected: &Literal, actual: &Literal) -> Result<()> {
    equal_shapes(expected.shape(), actual.shape())?;
    match expected.element_type() {
        PrimitiveType::Tuple => {
            // Every element is checked; the first failure wins.
            let mut result = Ok(());
            for (e, a) in expected.tuple_elements().iter().zip(actual.tuple_elements()) {
                let element = equal_helper(e, a);
                if result.is_ok() {
                    result = element;
                }
            }
            result
        }
        PrimitiveType::Token => Ok(()),
        ty => match_native!(ty, T => equal_arrays::<T>(expected, actual), _ => {
            unimplemented_err!("Unsupported primitive type: {ty}")
        }),
    }
}

fn equal_arrays<T: ExactEq>(expected: &Literal, actual: &Literal) -> Result<()> {
    let (want, got) = (expected.data::<T>()?, actual.data::<T>()?);
    try_for_each_index(expected.dimensions(), |index| {
        let e = want[expected.linear_index(index)];
        let a = got[actual.linear_index(index)];
        if e.exact_eq(a) {
            return Ok(());
        }
        Err(EvalError::InvalidArgument(T::mismatch_message(e, a, index)))
    })
}

/// Element equality used by [`equal`].
pub(crate) trait ExactEq: NativeType {
    fn exact_eq(self, other: Self) -> bool {
        self == other
    }

    fn mismatch_message(expected: Self, actual: Self, index: &[usize]) -> String {
        format!(
            "first mismatch at array index {}:\n  expected value: {}\n  actual value:   {}",
            index_string(index),
            expected.to_scalar(),
            actual.to_scalar()
        )
    }
}

impl ExactEq for bool {}
impl ExactEq for i8 {}
impl ExactEq for i16 {}
impl ExactEq for i32 {}
impl ExactEq for i64 {}
impl ExactEq for u8 {}
impl ExactEq for u16 {}
impl ExactEq for u32 {}
impl ExactEq for u64 {}

fn float_mismatch(
    expected: f64,
    expected_bits: u64,
    actual: f64,
    actual_bits: u64,
    index: &[usize],
) -> String {
    format!(
        "floating values are not bitwise-equal; and equality testing was requested: \
         expected={expected}={expected:e}=0x{expected_bits:x} vs actual={actual}={actual:e}=0x{actual_bits:x} \
         at array index {}",
        index_string(index)
    )
}

macro_rules! bitwise_eq {
    ($($t:ty => $to_f64:expr),*) => {$(
        impl ExactEq for $t {
            fn exact_eq(self, other: Self) -> bool {
                self.to_bits() == other.to_bits()
            }

            fn mismatch_message(expected: Self, actual: Self, index: &[usize]) -> String {
                let to_f64: fn($t) -> f64 = $to_f64;
                float_mismatch(
                    to_f64(expected),
                    expected.to_bits() as u64,
                    to_f64(actual),
                    actual.to_bits() as u64,
                    index,
                )
            }
        }
    )*};
}

bitwise_eq!(
    f16 => |v| v.to_f64(),
    bf16 => |v| v.to_f64(),
    f32 => |v| v as f64,
    f64 => |v| v
);

impl ExactEq for Complex32 {
    fn exact_eq(self, other: Self) -> bool {
        self.re.exact_eq(other.re) && self.im.exact_eq(other.im)
    }

    fn mismatch_message(expected: Self, actual: Self, index: &[usize]) -> String {
        if !expected.re.exact_eq(actual.re) {
            return f32::mismatch_message(expected.re, actual.re, index);
        }
        f32::mismatch_message(expected.im, actual.im, index)
    }
}

fn near_helper(
    expected: &Literal,
    actual: &Literal,
    error: &ErrorSpec,
    detailed_message: bool,
    miscompare_callback: Option<&MiscompareCallback>,
    shape_index: &[usize],
) -> Result<()> {
    equal_shapes(expected.shape(), actual.shape())?;

    if expected.is_tuple() {
        let mut messages = Vec::new();
        let elements = expected.tuple_elements().iter().zip(actual.tuple_elements());
        for (i, (e, a)) in elements.enumerate() {
            let mut element_index = shape_index.to_vec();
            element_index.push(i);
            let result =
                near_helper(e, a, error, detailed_message, miscompare_callback, &element_index);
            if let Err(err) = result {
                messages.push(format!(
                    "Array at shape index {}, {}",
                    index_string(&element_index),
                    err.message()
                ));
            }
        }
        if messages.is_empty() {
            return Ok(());
        }
        let message = messages.join("; ");
        if shape_index.is_empty() {
            invalid_argument!(
                "\nMismatches in shape {} ({} elements):\n{message}",
                actual.shape(),
                recursive_element_count(actual.shape())
            );
        }
        invalid_argument!("{message}");
    }

    let (detailed, callback) = (detailed_message, miscompare_callback);
    match expected.element_type() {
        PrimitiveType::F16 => {
            NearComparator::<f16>::compare(expected, actual, error, detailed, callback)
        }
        PrimitiveType::Bf16 => {
            NearComparator::<bf16>::compare(expected, actual, error, detailed, callback)
        }
        PrimitiveType::F32 => {
            NearComparator::<f32>::compare(expected, actual, error, detailed, callback)
        }
        PrimitiveType::F64 => {
            NearComparator::<f64>::compare(expected, actual, error, detailed, callback)
        }
        PrimitiveType::C64 => {
            NearComparator::<Complex32>::compare(expected, actual, error, detailed, callback)
        }
        _ => equal_helper(expected, actual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_shapes_messages() {
        let a = Shape::array(PrimitiveType::F32, [2, 3]);
        assert!(equal_shapes(&a, &a.clone().with_layout([0, 1])).is_ok());
        let err = equal_shapes(&a, &Shape::array(PrimitiveType::F32, [2, 4])).unwrap_err();
        assert_eq!(
            err.message(),
            "mismatch in dimension #1 expected: f32[2,3] actual: f32[2,4]"
        );
        let err = equal_shapes(&a, &a.with_element_type(PrimitiveType::F64)).unwrap_err();
        assert!(err.message().starts_with("element type mismatch"));
        let t1 = Shape::tuple(vec![a.clone()]);
        let t2 = Shape::tuple(vec![a.clone(), a.clone()]);
        assert_eq!(
            equal_shapes(&t1, &t2).unwrap_err().message(),
            "want tuple element count: 1 got tuple element count: 2"
        );
    }

    #[test]
    fn test_equal_is_bitwise() {
        let pos = Literal::vec1(&[0.0f32, 1.0]);
        let neg = Literal::vec1(&[-0.0f32, 1.0]);
        assert!(equal(&pos, &pos).is_ok());
        let err = equal(&pos, &neg).unwrap_err();
        assert!(err.message().contains("not bitwise-equal"));
        assert!(err.message().contains("at array index {0}"));
        assert!(err.message().contains("Expected literal:"));

        let quiet = Literal::scalar(f64::NAN);
        let other = Literal::scalar(f64::from_bits(f64::NAN.to_bits() | 1));
        assert!(equal(&quiet, &quiet).is_ok());
        assert!(equal(&quiet, &other).is_err());
    }

    #[test]
    fn test_equal_integers_and_tuples() {
        let a = Literal::matrix(&[[1, 2], [3, 4]]);
        let b = Literal::matrix(&[[1, 2], [3, 5]]);
        let err = equal(&a, &b).unwrap_err();
        assert!(err
            .message()
            .starts_with("first mismatch at array index {1,1}:\n  expected value: 4\n  actual value:   5"));

        let t = Literal::tuple(vec![a.clone(), Literal::token()]);
        assert!(equal(&t, &t.clone()).is_ok());
        assert!(equal(&t, &Literal::tuple(vec![b, Literal::token()])).is_err());
    }

    #[test]
    fn test_equal_ignores_layout() {
        let a = Literal::matrix(&[[1u8, 2, 3], [4, 5, 6]]);
        let b = a
            .relayout(&Shape::array(PrimitiveType::U8, [2, 3]).with_layout([0, 1]))
            .unwrap();
        assert!(equal(&a, &b).is_ok());
    }

    #[test]
    fn test_near_tuple_prefix() {
        let good = Literal::vec1(&[1.0f32, 2.0]);
        let bad = Literal::vec1(&[1.0f32, 3.0]);
        let expected = Literal::tuple(vec![good.clone(), good.clone()]);
        let actual = Literal::tuple(vec![good, bad]);
        let err = near(&expected, &actual, &ErrorSpec::new(0.1, 0.1), false, None).unwrap_err();
        assert!(err.message().starts_with("\nMismatches in shape (f32[2], f32[2]) (4 elements):"));
        assert!(err.message().contains("Array at shape index {1}, "));
    }

    #[test]
    fn test_near_falls_back_to_equal() {
        let a = Literal::vec1(&[1i32, 2]);
        let b = Literal::vec1(&[1i32, 3]);
        let spec = ErrorSpec::new(10.0, 10.0);
        assert!(near(&a, &a, &spec, false, None).is_ok());
        assert!(near(&a, &b, &spec, false, None).is_err());
    }
}
