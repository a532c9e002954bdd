use std::fmt::{self, Debug};

use half::{bf16, f16};
use num::complex::Complex32;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::literal::ArrayData;

/// Element type tag carried by every shape.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    Bf16,
    F32,
    F64,
    C64,
    Tuple,
    Opaque,
    Token,
}

impl PrimitiveType {
    /// Size in bytes of one element. Zero for non-array types.
    pub fn byte_width(&self) -> usize {
        match self {
            PrimitiveType::Pred | PrimitiveType::S8 | PrimitiveType::U8 => 1,
            PrimitiveType::S16 | PrimitiveType::U16 | PrimitiveType::F16 | PrimitiveType::Bf16 => 2,
            PrimitiveType::S32 | PrimitiveType::U32 | PrimitiveType::F32 => 4,
            PrimitiveType::S64 | PrimitiveType::U64 | PrimitiveType::F64 | PrimitiveType::C64 => 8,
            PrimitiveType::Tuple | PrimitiveType::Opaque | PrimitiveType::Token => 0,
        }
    }

    pub fn bit_width(&self) -> usize {
        self.byte_width() * 8
    }

    pub fn is_signed_integral(&self) -> bool {
        matches!(
            self,
            PrimitiveType::S8 | PrimitiveType::S16 | PrimitiveType::S32 | PrimitiveType::S64
        )
    }

    pub fn is_unsigned_integral(&self) -> bool {
        matches!(
            self,
            PrimitiveType::U8 | PrimitiveType::U16 | PrimitiveType::U32 | PrimitiveType::U64
        )
    }

    pub fn is_integral(&self) -> bool {
        self.is_signed_integral() || self.is_unsigned_integral()
    }

    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            PrimitiveType::F16 | PrimitiveType::Bf16 | PrimitiveType::F32 | PrimitiveType::F64
        )
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, PrimitiveType::C64)
    }

    /// True for every type that can back a dense array.
    pub fn is_array_type(&self) -> bool {
        !matches!(
            self,
            PrimitiveType::Tuple | PrimitiveType::Opaque | PrimitiveType::Token
        )
    }
}

/// A single element pulled out of a literal, independent of its storage type.
///
/// Conversions between element types go through this value and follow C-style
/// cast rules: integers wrap, floats truncate toward zero (saturating), and
/// anything non-zero becomes `true`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Pred(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(Complex32),
}

impl Scalar {
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Scalar::Pred(b) => Some(b as i64),
            Scalar::Int(i) => Some(i),
            Scalar::UInt(u) => Some(u as i64),
            Scalar::Float(_) | Scalar::Complex(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Pred(b) => b as u8 as f64,
            Scalar::Int(i) => i as f64,
            Scalar::UInt(u) => u as f64,
            Scalar::Float(f) => f,
            Scalar::Complex(c) => c.re as f64,
        }
    }

    pub fn is_nan(&self) -> bool {
        match *self {
            Scalar::Float(f) => f.is_nan(),
            Scalar::Complex(c) => c.re.is_nan() || c.im.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Pred(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::UInt(u) => write!(f, "{u}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Complex(c) => write!(f, "({}, {})", c.re, c.im),
        }
    }
}

/// Rust storage types that can live inside a literal.
pub trait NativeType: Copy + Debug + Default + PartialEq + Send + Sync + 'static {
    const TYPE: PrimitiveType;

    fn slice(data: &ArrayData) -> Option<&[Self]>;
    fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]>;
    fn into_data(values: Vec<Self>) -> ArrayData;

    fn to_scalar(self) -> Scalar;
    fn from_scalar(value: Scalar) -> Self;

    fn write_le(self, out: &mut Vec<u8>);
    /// `bytes` holds exactly `TYPE.byte_width()` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! signed_native {
    ($($t:ty),*) => {$(
        impl ScalarCast for $t {
            fn cast_to_scalar(self) -> Scalar {
                Scalar::Int(self as i64)
            }
            fn cast_from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Pred(b) => b as $t,
                    Scalar::Int(i) => i as $t,
                    Scalar::UInt(u) => u as $t,
                    Scalar::Float(f) => f as $t,
                    Scalar::Complex(c) => c.re as $t,
                }
            }
        }
    )*};
}

macro_rules! unsigned_native {
    ($($t:ty),*) => {$(
        impl ScalarCast for $t {
            fn cast_to_scalar(self) -> Scalar {
                Scalar::UInt(self as u64)
            }
            fn cast_from_scalar(value: Scalar) -> Self {
                match value {
                    Scalar::Pred(b) => b as $t,
                    Scalar::Int(i) => i as $t,
                    Scalar::UInt(u) => u as $t,
                    Scalar::Float(f) => f as $t,
                    Scalar::Complex(c) => c.re as $t,
                }
            }
        }
    )*};
}

macro_rules! le_bytes {
    ($($t:ty),*) => {$(
        impl LeBytes for $t {
            fn put_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
            fn get_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }
        }
    )*};
}

/// Cast rules shared by the storage types; `NativeType` forwards to these.
pub(crate) trait ScalarCast: Sized {
    fn cast_to_scalar(self) -> Scalar;
    fn cast_from_scalar(value: Scalar) -> Self;
}

pub(crate) trait LeBytes: Sized {
    fn put_le(self, out: &mut Vec<u8>);
    fn get_le(bytes: &[u8]) -> Self;
}

signed_native!(i8, i16, i32, i64);
unsigned_native!(u8, u16, u32, u64);
le_bytes!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl ScalarCast for bool {
    fn cast_to_scalar(self) -> Scalar {
        Scalar::Pred(self)
    }
    fn cast_from_scalar(value: Scalar) -> Self {
        match value {
            Scalar::Pred(b) => b,
            Scalar::Int(i) => i != 0,
            Scalar::UInt(u) => u != 0,
            Scalar::Float(f) => f != 0.0,
            Scalar::Complex(c) => c.re != 0.0 || c.im != 0.0,
        }
    }
}

impl LeBytes for bool {
    fn put_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
    fn get_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

fn float_from_scalar(value: Scalar) -> f64 {
    match value {
        Scalar::Pred(b) => b as u8 as f64,
        Scalar::Int(i) => i as f64,
        Scalar::UInt(u) => u as f64,
        Scalar::Float(f) => f,
        Scalar::Complex(c) => c.re as f64,
    }
}

impl ScalarCast for f32 {
    fn cast_to_scalar(self) -> Scalar {
        Scalar::Float(self as f64)
    }
    fn cast_from_scalar(value: Scalar) -> Self {
        match value {
            // Keep single precision values exact instead of rounding twice.
            Scalar::Complex(c) => c.re,
            other => float_from_scalar(other) as f32,
        }
    }
}

impl ScalarCast for f64 {
    fn cast_to_scalar(self) -> Scalar {
        Scalar::Float(self)
    }
    fn cast_from_scalar(value: Scalar) -> Self {
        float_from_scalar(value)
    }
}

impl ScalarCast for f16 {
    fn cast_to_scalar(self) -> Scalar {
        Scalar::Float(self.to_f64())
    }
    fn cast_from_scalar(value: Scalar) -> Self {
        f16::from_f64(float_from_scalar(value))
    }
}

impl LeBytes for f16 {
    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }
    fn get_le(bytes: &[u8]) -> Self {
        f16::from_bits(u16::get_le(bytes))
    }
}

impl ScalarCast for bf16 {
    fn cast_to_scalar(self) -> Scalar {
        Scalar::Float(self.to_f64())
    }
    fn cast_from_scalar(value: Scalar) -> Self {
        bf16::from_f64(float_from_scalar(value))
    }
}

impl LeBytes for bf16 {
    fn put_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }
    fn get_le(bytes: &[u8]) -> Self {
        bf16::from_bits(u16::get_le(bytes))
    }
}

impl ScalarCast for Complex32 {
    fn cast_to_scalar(self) -> Scalar {
        Scalar::Complex(self)
    }
    fn cast_from_scalar(value: Scalar) -> Self {
        match value {
            Scalar::Complex(c) => c,
            other => Complex32::new(float_from_scalar(other) as f32, 0.0),
        }
    }
}

impl LeBytes for Complex32 {
    fn put_le(self, out: &mut Vec<u8>) {
        self.re.put_le(out);
        self.im.put_le(out);
    }
    fn get_le(bytes: &[u8]) -> Self {
        Complex32::new(f32::get_le(&bytes[..4]), f32::get_le(&bytes[4..8]))
    }
}

/// Run `$body` with `$T` aliased to the storage type behind a primitive type tag.
/// Non-array tags fall through to `$other`.
#[macro_export]
macro_rules! match_native {
    ($ty:expr, $T:ident => $body:expr, _ => $other:expr) => {{
        use $crate::types::PrimitiveType as __P;
        match $ty {
            __P::Pred => { type $T = bool; $body }
            __P::S8 => { type $T = i8; $body }
            __P::S16 => { type $T = i16; $body }
            __P::S32 => { type $T = i32; $body }
            __P::S64 => { type $T = i64; $body }
            __P::U8 => { type $T = u8; $body }
            __P::U16 => { type $T = u16; $body }
            __P::U32 => { type $T = u32; $body }
            __P::U64 => { type $T = u64; $body }
            __P::F16 => { type $T = half::f16; $body }
            __P::Bf16 => { type $T = half::bf16; $body }
            __P::F32 => { type $T = f32; $body }
            __P::F64 => { type $T = f64; $body }
            __P::C64 => { type $T = num::complex::Complex32; $body }
            __P::Tuple | __P::Opaque | __P::Token => $other,
        }
    }};
}
