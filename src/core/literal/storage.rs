use half::{bf16, f16};
use num::complex::Complex32;

use super::Literal;
use crate::{
    error::{EvalError, Result},
    types::{LeBytes, NativeType, PrimitiveType, Scalar, ScalarCast},
};

macro_rules! define_array_data {
    ($($variant:ident: $t:ty),* $(,)?) => {
        /// Typed element storage of a literal, one variant per element type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ArrayData {
            $($variant(Vec<$t>),)*
            Tuple(Vec<Literal>),
            /// Tokens and opaque values carry no data.
            Empty,
        }

        impl ArrayData {
            pub fn zeros(ty: PrimitiveType, len: usize) -> Option<Self> {
                match ty {
                    $(PrimitiveType::$variant => Some(ArrayData::$variant(vec![<$t>::default(); len])),)*
                    _ => None,
                }
            }

            pub fn element_type(&self) -> PrimitiveType {
                match self {
                    $(ArrayData::$variant(_) => PrimitiveType::$variant,)*
                    ArrayData::Tuple(_) => PrimitiveType::Tuple,
                    ArrayData::Empty => PrimitiveType::Token,
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(ArrayData::$variant(v) => v.len(),)*
                    ArrayData::Tuple(elements) => elements.len(),
                    ArrayData::Empty => 0,
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// New storage holding `self[positions[i]]` at position `i`.
            pub fn gather(&self, positions: &[usize]) -> Self {
                match self {
                    $(ArrayData::$variant(v) => {
                        ArrayData::$variant(positions.iter().map(|&p| v[p]).collect())
                    })*
                    other => other.clone(),
                }
            }

            /// Copy `src[src_positions[i]]` over `self[dst_positions[i]]`.
            pub fn copy_from(
                &mut self,
                dst_positions: &[usize],
                src: &ArrayData,
                src_positions: &[usize],
            ) -> Result<()> {
                match (self, src) {
                    $((ArrayData::$variant(dst), ArrayData::$variant(src)) => {
                        for (&d, &s) in dst_positions.iter().zip(src_positions) {
                            dst[d] = src[s];
                        }
                        Ok(())
                    })*
                    (dst, src) => Err(EvalError::InvalidArgument(format!(
                        "cannot copy {} elements into {} storage",
                        src.element_type(),
                        dst.element_type()
                    ))),
                }
            }

            pub fn scalar(&self, position: usize) -> Option<Scalar> {
                match self {
                    $(ArrayData::$variant(v) => Some(ScalarCast::cast_to_scalar(v[position])),)*
                    _ => None,
                }
            }

            /// Element-wise cast into another element type.
            pub fn convert(&self, ty: PrimitiveType) -> Option<Self> {
                let scalars = (0..self.len())
                    .map(|i| self.scalar(i))
                    .collect::<Option<Vec<_>>>()?;
                match ty {
                    $(PrimitiveType::$variant => Some(ArrayData::$variant(
                        scalars.into_iter().map(<$t as ScalarCast>::cast_from_scalar).collect(),
                    )),)*
                    _ => None,
                }
            }

            pub fn to_le_bytes(&self) -> Vec<u8> {
                match self {
                    $(ArrayData::$variant(v) => {
                        let mut out = Vec::with_capacity(v.len() * PrimitiveType::$variant.byte_width());
                        for x in v {
                            LeBytes::put_le(*x, &mut out);
                        }
                        out
                    })*
                    _ => vec![],
                }
            }

            pub fn from_le_bytes(ty: PrimitiveType, bytes: &[u8]) -> Option<Self> {
                match ty {
                    $(PrimitiveType::$variant => Some(ArrayData::$variant(
                        bytes
                            .chunks_exact(ty.byte_width())
                            .map(<$t as LeBytes>::get_le)
                            .collect(),
                    )),)*
                    _ => None,
                }
            }
        }

        $(
            impl NativeType for $t {
                const TYPE: PrimitiveType = PrimitiveType::$variant;

                fn slice(data: &ArrayData) -> Option<&[Self]> {
                    match data {
                        ArrayData::$variant(v) => Some(v.as_slice()),
                        _ => None,
                    }
                }

                fn slice_mut(data: &mut ArrayData) -> Option<&mut [Self]> {
                    match data {
                        ArrayData::$variant(v) => Some(v.as_mut_slice()),
                        _ => None,
                    }
                }

                fn into_data(values: Vec<Self>) -> ArrayData {
                    ArrayData::$variant(values)
                }

                fn to_scalar(self) -> Scalar {
                    ScalarCast::cast_to_scalar(self)
                }

                fn from_scalar(value: Scalar) -> Self {
                    <Self as ScalarCast>::cast_from_scalar(value)
                }

                fn write_le(self, out: &mut Vec<u8>) {
                    LeBytes::put_le(self, out)
                }

                fn read_le(bytes: &[u8]) -> Self {
                    <Self as LeBytes>::get_le(bytes)
                }
            }
        )*
    };
}

define_array_data! {
    Pred: bool,
    S8: i8,
    S16: i16,
    S32: i32,
    S64: i64,
    U8: u8,
    U16: u16,
    U32: u32,
    U64: u64,
    F16: f16,
    Bf16: bf16,
    F32: f32,
    F64: f64,
    C64: Complex32,
}
