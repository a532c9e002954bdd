//! Scalar kernels per element type.
//!
//! Each storage type names the type it computes in (`f16`/`bf16` compute in
//! `f32`) and hands out plain function pointers for every op it supports. A
//! kernel is looked up once per instruction and then applied to every element.

use half::{bf16, f16};
use num::complex::Complex32;
use num_traits::Float;

use crate::{
    op::{BinaryOp, ComparisonDirection, UnaryOp},
    types::NativeType,
};

pub type UnaryKernel<C> = fn(C) -> C;
pub type BinaryKernel<C> = fn(C, C) -> C;
pub type TernaryKernel<C> = fn(C, C, C) -> C;
pub type CompareKernel<C> = fn(C, C) -> bool;

pub trait ElementType: NativeType {
    type Compute: Copy + Send + Sync + 'static;

    fn widen(self) -> Self::Compute;
    fn narrow(value: Self::Compute) -> Self;
    fn zero() -> Self::Compute;

    fn unary_kernel(op: UnaryOp) -> Option<UnaryKernel<Self::Compute>>;
    fn binary_kernel(op: BinaryOp) -> Option<BinaryKernel<Self::Compute>>;
    /// `(low, value, high)`
    fn clamp_kernel() -> Option<TernaryKernel<Self::Compute>>;
    fn compare_kernel(direction: ComparisonDirection) -> Option<CompareKernel<Self::Compute>>;
    /// `acc + lhs * rhs`, used by dot and convolution.
    fn multiply_accumulate() -> TernaryKernel<Self::Compute>;

    /// Strict weak order used by sort.
    fn sort_less() -> Option<fn(&Self, &Self) -> bool> {
        None
    }

    fn reduce_precision_kernel() -> Option<fn(Self::Compute, u32, u32) -> Self::Compute> {
        None
    }
}

fn ordered_compare<C: PartialOrd + Copy>(direction: ComparisonDirection) -> CompareKernel<C> {
    match direction {
        ComparisonDirection::Eq => |l, r| l == r,
        ComparisonDirection::Ne => |l, r| l != r,
        ComparisonDirection::Ge => |l, r| l >= r,
        ComparisonDirection::Gt => |l, r| l > r,
        ComparisonDirection::Le => |l, r| l <= r,
        ComparisonDirection::Lt => |l, r| l < r,
    }
}

/// Total order for floats: `-NaN < -inf < .. < -0 < +0 < .. < +inf < +NaN`.
pub fn safe_less<F: Float>(a: &F, b: &F) -> bool {
    let (a_negative, b_negative) = (a.is_sign_negative(), b.is_sign_negative());
    if a_negative != b_negative {
        return a_negative;
    }
    match (a.is_nan(), b.is_nan()) {
        (true, false) => a_negative,
        (false, true) => !b_negative,
        _ => a < b,
    }
}

/// Round an f32 to `mantissa_bits` of mantissa (to nearest, ties to even) and
/// clamp it into the range of `exponent_bits` of exponent.
pub fn reduce_precision(value: f32, exponent_bits: u32, mantissa_bits: u32) -> f32 {
    const MANTISSA_BITS: u32 = 23;
    const EXPONENT_BITS: u32 = 8;
    let mut bits = value.to_bits();
    if mantissa_bits < MANTISSA_BITS {
        let shift = MANTISSA_BITS - mantissa_bits;
        let last_mantissa_bit_mask = 1u32 << shift;
        let base_rounding_bias = (last_mantissa_bit_mask >> 1) - 1;
        let x_last_mantissa_bit = (bits & last_mantissa_bit_mask) >> shift;
        let truncation_mask = !(last_mantissa_bit_mask - 1);
        bits = bits.wrapping_add(x_last_mantissa_bit + base_rounding_bias) & truncation_mask;
    }
    if exponent_bits < EXPONENT_BITS {
        let sign_bit_mask = 1u32 << 31;
        let exponent_mask = 0xffu32 << MANTISSA_BITS;
        let f32_exponent_bias = (1u32 << (EXPONENT_BITS - 1)) - 1;
        let reduced_exponent_bias = (1u32 << (exponent_bits.max(1) - 1)) - 1;
        let reduced_max_exponent = f32_exponent_bias + reduced_exponent_bias;
        let reduced_min_exponent = f32_exponent_bias - reduced_exponent_bias;
        let x_exponent = bits & exponent_mask;
        let signed_zero = bits & sign_bit_mask;
        if x_exponent > reduced_max_exponent << MANTISSA_BITS {
            bits = signed_zero | exponent_mask;
        } else if x_exponent <= reduced_min_exponent << MANTISSA_BITS {
            bits = signed_zero;
        }
    }
    if value.is_nan() {
        return if mantissa_bits > 0 { value } else { f32::INFINITY };
    }
    f32::from_bits(bits)
}

macro_rules! signed_element {
    ($($t:ty => $u:ty),*) => {$(
        impl ElementType for $t {
            type Compute = $t;

            fn widen(self) -> $t {
                self
            }

            fn narrow(value: $t) -> Self {
                value
            }

            fn zero() -> $t {
                0
            }

            fn unary_kernel(op: UnaryOp) -> Option<UnaryKernel<$t>> {
                let f: UnaryKernel<$t> = match op {
                    UnaryOp::Abs => |x| x.wrapping_abs(),
                    UnaryOp::Negate => |x| (x as $u).wrapping_neg() as $t,
                    UnaryOp::Sign => |x| x.signum(),
                    UnaryOp::Not => |x| !x,
                    UnaryOp::Copy | UnaryOp::Ceil | UnaryOp::Floor | UnaryOp::Round => |x| x,
                    UnaryOp::Clz if <$t>::BITS >= 32 => |x| x.leading_zeros() as $t,
                    UnaryOp::Exp => |x| (x as f64).exp() as $t,
                    UnaryOp::Expm1 => |x| (x as f64).exp_m1() as $t,
                    UnaryOp::Log => |x| (x as f64).ln() as $t,
                    UnaryOp::Log1p => |x| (x as f64).ln_1p() as $t,
                    UnaryOp::Tanh => |x| (x as f64).tanh() as $t,
                    _ => return None,
                };
                Some(f)
            }

            fn binary_kernel(op: BinaryOp) -> Option<BinaryKernel<$t>> {
                let f: BinaryKernel<$t> = match op {
                    BinaryOp::Add => |l, r| l.wrapping_add(r),
                    BinaryOp::Subtract => |l, r| l.wrapping_sub(r),
                    BinaryOp::Multiply => |l, r| l.wrapping_mul(r),
                    // MIN / -1 wraps back to MIN.
                    BinaryOp::Divide => |l, r| if r == 0 { -1 } else { l.wrapping_div(r) },
                    BinaryOp::Remainder => |l, r| if r == 0 { l } else { l.wrapping_rem(r) },
                    BinaryOp::Maximum => |l, r| l.max(r),
                    BinaryOp::Minimum => |l, r| l.min(r),
                    BinaryOp::Power => |l, r| (l as f64).powf(r as f64) as $t,
                    BinaryOp::And => |l, r| l & r,
                    BinaryOp::Or => |l, r| l | r,
                    BinaryOp::Xor => |l, r| l ^ r,
                    BinaryOp::ShiftLeft => |l, r| {
                        if (r as $u) >= <$t>::BITS as $u {
                            0
                        } else {
                            l.wrapping_shl(r as u32)
                        }
                    },
                    BinaryOp::ShiftRightArithmetic => |l, r| {
                        if (r as $u) >= <$t>::BITS as $u {
                            if l < 0 { -1 } else { 0 }
                        } else {
                            l.wrapping_shr(r as u32)
                        }
                    },
                    BinaryOp::ShiftRightLogical => |l, r| {
                        if (r as $u) >= <$t>::BITS as $u {
                            0
                        } else {
                            ((l as $u) >> (r as u32)) as $t
                        }
                    },
                    BinaryOp::Atan2 => return None,
                };
                Some(f)
            }

            fn clamp_kernel() -> Option<TernaryKernel<$t>> {
                let f: TernaryKernel<$t> = |low, value, high| high.min(value.max(low));
                Some(f)
            }

            fn compare_kernel(direction: ComparisonDirection) -> Option<CompareKernel<$t>> {
                Some(ordered_compare(direction))
            }

            fn multiply_accumulate() -> TernaryKernel<$t> {
                |acc, l, r| acc.wrapping_add(l.wrapping_mul(r))
            }

            fn sort_less() -> Option<fn(&Self, &Self) -> bool> {
                let f: fn(&$t, &$t) -> bool = |a, b| a < b;
                Some(f)
            }
        }
    )*};
}

macro_rules! unsigned_element {
    ($($t:ty => $s:ty),*) => {$(
        impl ElementType for $t {
            type Compute = $t;

            fn widen(self) -> $t {
                self
            }

            fn narrow(value: $t) -> Self {
                value
            }

            fn zero() -> $t {
                0
            }

            fn unary_kernel(op: UnaryOp) -> Option<UnaryKernel<$t>> {
                let f: UnaryKernel<$t> = match op {
                    UnaryOp::Abs | UnaryOp::Copy | UnaryOp::Ceil | UnaryOp::Floor | UnaryOp::Round => |x| x,
                    UnaryOp::Negate => |x| x.wrapping_neg(),
                    UnaryOp::Sign => |x| (x > 0) as $t,
                    UnaryOp::Not => |x| !x,
                    UnaryOp::Clz if <$t>::BITS >= 32 => |x| x.leading_zeros() as $t,
                    UnaryOp::Exp => |x| (x as f64).exp() as $t,
                    UnaryOp::Expm1 => |x| (x as f64).exp_m1() as $t,
                    UnaryOp::Log => |x| (x as f64).ln() as $t,
                    UnaryOp::Log1p => |x| (x as f64).ln_1p() as $t,
                    UnaryOp::Tanh => |x| (x as f64).tanh() as $t,
                    _ => return None,
                };
                Some(f)
            }

            fn binary_kernel(op: BinaryOp) -> Option<BinaryKernel<$t>> {
                let f: BinaryKernel<$t> = match op {
                    BinaryOp::Add => |l, r| l.wrapping_add(r),
                    BinaryOp::Subtract => |l, r| l.wrapping_sub(r),
                    BinaryOp::Multiply => |l, r| l.wrapping_mul(r),
                    BinaryOp::Divide => |l, r| if r == 0 { <$t>::MAX } else { l / r },
                    BinaryOp::Remainder => |l, r| if r == 0 { l } else { l % r },
                    BinaryOp::Maximum => |l, r| l.max(r),
                    BinaryOp::Minimum => |l, r| l.min(r),
                    BinaryOp::Power => |l, r| (l as f64).powf(r as f64) as $t,
                    BinaryOp::And => |l, r| l & r,
                    BinaryOp::Or => |l, r| l | r,
                    BinaryOp::Xor => |l, r| l ^ r,
                    BinaryOp::ShiftLeft => |l, r| {
                        if r >= <$t>::BITS as $t {
                            0
                        } else {
                            l << r
                        }
                    },
                    BinaryOp::ShiftRightArithmetic => |l, r| {
                        if r >= <$t>::BITS as $t {
                            if (l as $s) < 0 { <$t>::MAX } else { 0 }
                        } else {
                            ((l as $s) >> r) as $t
                        }
                    },
                    BinaryOp::ShiftRightLogical => |l, r| {
                        if r >= <$t>::BITS as $t {
                            0
                        } else {
                            l >> r
                        }
                    },
                    BinaryOp::Atan2 => return None,
                };
                Some(f)
            }

            fn clamp_kernel() -> Option<TernaryKernel<$t>> {
                let f: TernaryKernel<$t> = |low, value, high| high.min(value.max(low));
                Some(f)
            }

            fn compare_kernel(direction: ComparisonDirection) -> Option<CompareKernel<$t>> {
                Some(ordered_compare(direction))
            }

            fn multiply_accumulate() -> TernaryKernel<$t> {
                |acc, l, r| acc.wrapping_add(l.wrapping_mul(r))
            }

            fn sort_less() -> Option<fn(&Self, &Self) -> bool> {
                let f: fn(&$t, &$t) -> bool = |a, b| a < b;
                Some(f)
            }
        }
    )*};
}

signed_element!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);
unsigned_element!(u8 => i8, u16 => i16, u32 => i32, u64 => i64);

macro_rules! float_element {
    ($($t:ty => $reduce_precision:expr),*) => {$(
        impl ElementType for $t {
            type Compute = $t;

            fn widen(self) -> $t {
                self
            }

            fn narrow(value: $t) -> Self {
                value
            }

            fn zero() -> $t {
                0.0
            }

            fn unary_kernel(op: UnaryOp) -> Option<UnaryKernel<$t>> {
                let f: UnaryKernel<$t> = match op {
                    UnaryOp::Abs => |x| x.abs(),
                    UnaryOp::Ceil => |x| x.ceil(),
                    UnaryOp::Floor => |x| x.floor(),
                    UnaryOp::Round => |x| x.round(),
                    UnaryOp::Copy => |x| x,
                    UnaryOp::Cos => |x| x.cos(),
                    UnaryOp::Sin => |x| x.sin(),
                    UnaryOp::Exp => |x| x.exp(),
                    UnaryOp::Expm1 => |x| x.exp_m1(),
                    UnaryOp::Log => |x| x.ln(),
                    UnaryOp::Log1p => |x| x.ln_1p(),
                    UnaryOp::Tanh => |x| x.tanh(),
                    UnaryOp::Negate => |x| -x,
                    // NaN and both zeros map to zero.
                    UnaryOp::Sign => |x| ((0.0 < x) as i8 - (x < 0.0) as i8) as $t,
                    UnaryOp::Not => |x| if x == 0.0 { 1.0 } else { 0.0 },
                    _ => return None,
                };
                Some(f)
            }

            fn binary_kernel(op: BinaryOp) -> Option<BinaryKernel<$t>> {
                let f: BinaryKernel<$t> = match op {
                    BinaryOp::Add => |l, r| l + r,
                    BinaryOp::Subtract => |l, r| l - r,
                    BinaryOp::Multiply => |l, r| l * r,
                    BinaryOp::Divide => |l, r| l / r,
                    BinaryOp::Remainder => |l, r| l % r,
                    BinaryOp::Maximum => |l, r| if l >= r || l.is_nan() { l } else { r },
                    BinaryOp::Minimum => |l, r| if l <= r || l.is_nan() { l } else { r },
                    BinaryOp::Power => |l, r| l.powf(r),
                    BinaryOp::Atan2 => |l, r| l.atan2(r),
                    _ => return None,
                };
                Some(f)
            }

            fn clamp_kernel() -> Option<TernaryKernel<$t>> {
                let f: TernaryKernel<$t> = |low, value, high| high.min(value.max(low));
                Some(f)
            }

            fn compare_kernel(direction: ComparisonDirection) -> Option<CompareKernel<$t>> {
                Some(ordered_compare(direction))
            }

            fn multiply_accumulate() -> TernaryKernel<$t> {
                |acc, l, r| acc + l * r
            }

            fn sort_less() -> Option<fn(&Self, &Self) -> bool> {
                Some(safe_less::<$t>)
            }

            fn reduce_precision_kernel() -> Option<fn($t, u32, u32) -> $t> {
                $reduce_precision
            }
        }
    )*};
}

float_element!(f32 => Some(reduce_precision), f64 => None);

macro_rules! half_element {
    ($($t:ty),*) => {$(
        impl ElementType for $t {
            type Compute = f32;

            fn widen(self) -> f32 {
                self.to_f32()
            }

            fn narrow(value: f32) -> Self {
                <$t>::from_f32(value)
            }

            fn zero() -> f32 {
                0.0
            }

            fn unary_kernel(op: UnaryOp) -> Option<UnaryKernel<f32>> {
                f32::unary_kernel(op)
            }

            fn binary_kernel(op: BinaryOp) -> Option<BinaryKernel<f32>> {
                f32::binary_kernel(op)
            }

            fn clamp_kernel() -> Option<TernaryKernel<f32>> {
                f32::clamp_kernel()
            }

            fn compare_kernel(direction: ComparisonDirection) -> Option<CompareKernel<f32>> {
                f32::compare_kernel(direction)
            }

            fn multiply_accumulate() -> TernaryKernel<f32> {
                f32::multiply_accumulate()
            }

            fn sort_less() -> Option<fn(&Self, &Self) -> bool> {
                let f: fn(&$t, &$t) -> bool = |a, b| safe_less(&a.to_f32(), &b.to_f32());
                Some(f)
            }

            fn reduce_precision_kernel() -> Option<fn(f32, u32, u32) -> f32> {
                Some(reduce_precision)
            }
        }
    )*};
}

half_element!(f16, bf16);

impl ElementType for bool {
    type Compute = bool;

    fn widen(self) -> bool {
        self
    }

    fn narrow(value: bool) -> Self {
        value
    }

    fn zero() -> bool {
        false
    }

    fn unary_kernel(op: UnaryOp) -> Option<UnaryKernel<bool>> {
        let f: UnaryKernel<bool> = match op {
            UnaryOp::Not => |x| !x,
            UnaryOp::Abs
            | UnaryOp::Copy
            | UnaryOp::Ceil
            | UnaryOp::Floor
            | UnaryOp::Round
            | UnaryOp::Negate
            | UnaryOp::Sign => |x| x,
            _ => return None,
        };
        Some(f)
    }

    fn binary_kernel(op: BinaryOp) -> Option<BinaryKernel<bool>> {
        let f: BinaryKernel<bool> = match op {
            BinaryOp::Add | BinaryOp::Maximum | BinaryOp::Or => |l, r| l || r,
            BinaryOp::Multiply | BinaryOp::Minimum | BinaryOp::And => |l, r| l && r,
            BinaryOp::Subtract | BinaryOp::Xor => |l, r| l != r,
            BinaryOp::Divide => |l, r| if r { l } else { true },
            BinaryOp::Remainder => |l, r| if r { false } else { l },
            BinaryOp::Power => |l, r| l || !r,
            _ => return None,
        };
        Some(f)
    }

    fn clamp_kernel() -> Option<TernaryKernel<bool>> {
        let f: TernaryKernel<bool> = |low, value, high| high.min(value.max(low));
        Some(f)
    }

    fn compare_kernel(direction: ComparisonDirection) -> Option<CompareKernel<bool>> {
        Some(ordered_compare(direction))
    }

    fn multiply_accumulate() -> TernaryKernel<bool> {
        |acc, l, r| acc || (l && r)
    }
}

impl ElementType for Complex32 {
    type Compute = Complex32;

    fn widen(self) -> Complex32 {
        self
    }

    fn narrow(value: Complex32) -> Self {
        value
    }

    fn zero() -> Complex32 {
        Complex32::new(0.0, 0.0)
    }

    fn unary_kernel(op: UnaryOp) -> Option<UnaryKernel<Complex32>> {
        let f: UnaryKernel<Complex32> = match op {
            UnaryOp::Copy => |x| x,
            UnaryOp::Exp => |x| x.exp(),
            UnaryOp::Log => |x| x.ln(),
            UnaryOp::Tanh => |x| x.tanh(),
            UnaryOp::Negate => |x| -x,
            UnaryOp::Sign => |x| {
                let norm = x.norm();
                if norm == 0.0 {
                    Complex32::new(0.0, 0.0)
                } else {
                    x / norm
                }
            },
            _ => return None,
        };
        Some(f)
    }

    fn binary_kernel(op: BinaryOp) -> Option<BinaryKernel<Complex32>> {
        let f: BinaryKernel<Complex32> = match op {
            BinaryOp::Add => |l, r| l + r,
            BinaryOp::Subtract => |l, r| l - r,
            BinaryOp::Multiply => |l, r| l * r,
            BinaryOp::Divide => |l, r| l / r,
            BinaryOp::Power => |l, r| l.powc(r),
            _ => return None,
        };
        Some(f)
    }

    fn clamp_kernel() -> Option<TernaryKernel<Complex32>> {
        None
    }

    /// No total order on complex numbers, only (in)equality of both parts.
    fn compare_kernel(direction: ComparisonDirection) -> Option<CompareKernel<Complex32>> {
        let f: CompareKernel<Complex32> = match direction {
            ComparisonDirection::Eq => |l, r| l.re == r.re && l.im == r.im,
            ComparisonDirection::Ne => |l, r| l.re != r.re || l.im != r.im,
            _ => return None,
        };
        Some(f)
    }

    fn multiply_accumulate() -> TernaryKernel<Complex32> {
        |acc, l, r| acc + l * r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary<T: ElementType<Compute = T>>(op: BinaryOp, l: T, r: T) -> T {
        T::binary_kernel(op).unwrap()(l, r)
    }

    #[test]
    fn test_integer_division_by_zero() {
        assert_eq!(binary(BinaryOp::Divide, 7i32, 0), -1);
        assert_eq!(binary(BinaryOp::Remainder, 7i32, 0), 7);
        assert_eq!(binary(BinaryOp::Divide, i32::MIN, -1), i32::MIN);
        assert_eq!(binary(BinaryOp::Remainder, i32::MIN, -1), 0);
        assert_eq!(binary(BinaryOp::Divide, 7u8, 0), u8::MAX);
        assert_eq!(binary(BinaryOp::Remainder, 7u64, 0), 7);
    }

    #[test]
    fn test_shift_edges() {
        assert_eq!(binary(BinaryOp::ShiftLeft, 1i32, 32), 0);
        assert_eq!(binary(BinaryOp::ShiftLeft, 1i32, -1), 0);
        assert_eq!(binary(BinaryOp::ShiftRightArithmetic, -8i32, 40), -1);
        assert_eq!(binary(BinaryOp::ShiftRightArithmetic, -8i32, 1), -4);
        assert_eq!(binary(BinaryOp::ShiftRightLogical, -8i8, 1), 124);
        assert_eq!(binary(BinaryOp::ShiftRightArithmetic, 0x80u8, 9), u8::MAX);
    }

    #[test]
    fn test_float_max_propagates_lhs_nan() {
        assert!(binary(BinaryOp::Maximum, f32::NAN, 1.0).is_nan());
        assert_eq!(binary(BinaryOp::Maximum, 1.0f32, f32::NAN), 1.0);
        assert_eq!(binary(BinaryOp::Minimum, -0.5f64, 2.0), -0.5);
    }

    #[test]
    fn test_signs() {
        let sign = f32::unary_kernel(UnaryOp::Sign).unwrap();
        assert_eq!(sign(-3.0), -1.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(f32::NAN), 0.0);
        let sign = i64::unary_kernel(UnaryOp::Sign).unwrap();
        assert_eq!(sign(-9), -1);
        assert_eq!(i8::unary_kernel(UnaryOp::Negate).unwrap()(i8::MIN), i8::MIN);
    }

    #[test]
    fn test_clz_width() {
        assert_eq!(u32::unary_kernel(UnaryOp::Clz).unwrap()(1), 31);
        assert_eq!(i64::unary_kernel(UnaryOp::Clz).unwrap()(0), 64);
        assert!(i8::unary_kernel(UnaryOp::Clz).is_none());
    }

    #[test]
    fn test_integer_transcendentals_go_through_f64() {
        assert_eq!(i32::unary_kernel(UnaryOp::Exp).unwrap()(2), 7);
        assert_eq!(u8::unary_kernel(UnaryOp::Log).unwrap()(100), 4);
        assert_eq!(i64::unary_kernel(UnaryOp::Tanh).unwrap()(-3), 0);
        assert!(i32::unary_kernel(UnaryOp::Sin).is_none());
        assert!(u16::unary_kernel(UnaryOp::Cos).is_none());
    }

    #[test]
    fn test_bool_arithmetic() {
        assert!(binary(BinaryOp::Add, true, false));
        assert!(!binary(BinaryOp::Subtract, true, true));
        assert!(binary(BinaryOp::Divide, false, false));
        assert!(!binary(BinaryOp::Power, false, true));
        assert!(bool::unary_kernel(UnaryOp::Exp).is_none());
    }

    #[test]
    fn test_safe_less_order() {
        let ordered = [-f32::NAN, f32::NEG_INFINITY, -1.0, -0.0, 0.0, 1.0, f32::INFINITY, f32::NAN];
        for (i, a) in ordered.iter().enumerate() {
            for (j, b) in ordered.iter().enumerate() {
                assert_eq!(safe_less(a, b), i < j, "{a} < {b}");
            }
        }
    }

    #[test]
    fn test_reduce_precision() {
        // 1 + 2^-10 rounds away with 7 mantissa bits.
        assert_eq!(reduce_precision(1.0 + 2f32.powi(-10), 8, 7), 1.0);
        // Ties round to even.
        assert_eq!(reduce_precision(1.0 + 3.0 * 2f32.powi(-8), 8, 7), 1.0 + 2f32.powi(-6));
        // f16-like exponent range.
        assert_eq!(reduce_precision(1.0e6, 5, 10), f32::INFINITY);
        assert_eq!(reduce_precision(-1.0e-9, 5, 10), -0.0);
        assert!(reduce_precision(-1.0e-9, 5, 10).is_sign_negative());
        assert!(reduce_precision(f32::NAN, 8, 1).is_nan());
        assert_eq!(reduce_precision(f32::NAN, 8, 0), f32::INFINITY);
    }

    #[test]
    fn test_complex_compare() {
        let a = Complex32::new(1.0, 2.0);
        assert!(Complex32::compare_kernel(ComparisonDirection::Eq).unwrap()(a, a));
        assert!(Complex32::compare_kernel(ComparisonDirection::Lt).is_none());
    }
}
