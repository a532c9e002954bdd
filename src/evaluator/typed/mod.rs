//! Element-type specific evaluation.
//!
//! The evaluator builds one [`TypedVisitor`] per primitive type up front and
//! dispatches each instruction to the visitor of its result (or operand) type.
//! Inside a visitor every kernel is resolved once and then run over the whole
//! index space.

mod elementwise;
pub mod kernels;
mod linalg;
mod sort;

use std::{fmt::Debug, marker::PhantomData};

use dyn_clone::{clone_trait_object, DynClone};

pub(crate) use self::elementwise::map_positions;
use self::kernels::ElementType;
use super::Visit;
use crate::{
    error::{EvalError, Result},
    invalid_argument, match_native, unimplemented_err,
    literal::Literal,
    op::{BinaryOp, ComparisonDirection, Op, UnaryOp},
    types::PrimitiveType,
};

pub trait TypedVisitor: DynClone + Send + Sync + Debug {
    fn element_type(&self) -> PrimitiveType;

    /// Evaluate an instruction whose result has this visitor's element type.
    fn visit(&self, visit: &Visit) -> Result<Literal>;

    /// Compare two operands of this visitor's element type.
    fn compare(&self, visit: &Visit, direction: ComparisonDirection) -> Result<Literal>;

    /// Sort along `dimension` with keys of this visitor's element type.
    fn sort(&self, visit: &Visit, dimension: usize) -> Result<Literal>;
}

clone_trait_object!(TypedVisitor);

/// Visitor for a type the evaluator has been configured not to handle.
#[derive(Debug, Clone, Copy)]
pub struct UnsupportedVisitor(pub PrimitiveType);

impl TypedVisitor for UnsupportedVisitor {
    fn element_type(&self) -> PrimitiveType {
        self.0
    }

    fn visit(&self, _: &Visit) -> Result<Literal> {
        Err(EvalError::unhandled_type(self.0))
    }

    fn compare(&self, _: &Visit, _: ComparisonDirection) -> Result<Literal> {
        Err(EvalError::unhandled_type(self.0))
    }

    fn sort(&self, _: &Visit, _: usize) -> Result<Literal> {
        Err(EvalError::unhandled_type(self.0))
    }
}

#[derive(Debug)]
pub struct ElementVisitor<T>(PhantomData<T>);

impl<T> Default for ElementVisitor<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Clone for ElementVisitor<T> {
    fn clone(&self) -> Self {
        Self(PhantomData)
    }
}

/// The full visitor for `ty`, or `None` for types without element storage.
pub fn visitor_for(ty: PrimitiveType) -> Option<Box<dyn TypedVisitor>> {
    match_native!(
        ty,
        T => Some(Box::new(ElementVisitor::<T>::default()) as Box<dyn TypedVisitor>),
        _ => None
    )
}

impl<T: ElementType> ElementVisitor<T> {
    fn unsupported(visit: &Visit) -> EvalError {
        EvalError::unsupported_type(visit.instruction.op.name(), &visit.instruction.name, T::TYPE)
    }

    fn unary(&self, visit: &Visit, op: UnaryOp) -> Result<Literal> {
        let kernel = T::unary_kernel(op).ok_or_else(|| Self::unsupported(visit))?;
        let operand = visit.operand(0)?;
        let x = operand.data::<T>()?;
        map_positions(visit.shape(), [operand], |[i]| {
            T::narrow(kernel(x[i].widen()))
        })
    }

    fn binary(&self, visit: &Visit, op: BinaryOp) -> Result<Literal> {
        let kernel = T::binary_kernel(op).ok_or_else(|| Self::unsupported(visit))?;
        let (lhs, rhs) = (visit.operand(0)?, visit.operand(1)?);
        let (l, r) = (lhs.data::<T>()?, rhs.data::<T>()?);
        map_positions(visit.shape(), [lhs, rhs], |[i, j]| {
            T::narrow(kernel(l[i].widen(), r[j].widen()))
        })
    }

    /// Scalar bounds are broadcast against the value.
    fn clamp(&self, visit: &Visit) -> Result<Literal> {
        let kernel = T::clamp_kernel().ok_or_else(|| Self::unsupported(visit))?;
        let value = visit.operand(1)?;
        let low = visit.operand(0)?.broadcast_scalar_to(value.shape())?;
        let high = visit.operand(2)?.broadcast_scalar_to(value.shape())?;
        let (lo, x, hi) = (low.data::<T>()?, value.data::<T>()?, high.data::<T>()?);
        map_positions(visit.shape(), [&*low, value, &*high], |[a, b, c]| {
            T::narrow(kernel(lo[a].widen(), x[b].widen(), hi[c].widen()))
        })
    }

    /// Elementwise select. Scalar predicates never reach the typed visitor.
    fn select(&self, visit: &Visit) -> Result<Literal> {
        let (pred, on_true, on_false) = (visit.operand(0)?, visit.operand(1)?, visit.operand(2)?);
        let p = pred.data::<bool>()?;
        let (t, f) = (on_true.data::<T>()?, on_false.data::<T>()?);
        map_positions(visit.shape(), [pred, on_true, on_false], |[i, j, k]| {
            if p[i] {
                t[j]
            } else {
                f[k]
            }
        })
    }

    fn reduce_precision(
        &self,
        visit: &Visit,
        exponent_bits: u32,
        mantissa_bits: u32,
    ) -> Result<Literal> {
        if T::TYPE == PrimitiveType::F64 {
            unimplemented_err!("Double not supported for reduce precision");
        }
        let kernel = T::reduce_precision_kernel().ok_or_else(|| Self::unsupported(visit))?;
        if exponent_bits < 1 {
            invalid_argument!(
                "reduce-precision {} needs at least one exponent bit",
                visit.instruction.name
            );
        }
        let operand = visit.operand(0)?;
        let x = operand.data::<T>()?;
        map_positions(visit.shape(), [operand], |[i]| {
            T::narrow(kernel(x[i].widen(), exponent_bits, mantissa_bits))
        })
    }
}

impl<T: ElementType> TypedVisitor for ElementVisitor<T> {
    fn element_type(&self) -> PrimitiveType {
        T::TYPE
    }

    fn visit(&self, visit: &Visit) -> Result<Literal> {
        match &visit.instruction.op {
            Op::Unary(op) => self.unary(visit, *op),
            Op::Binary(op) => self.binary(visit, *op),
            Op::Clamp => self.clamp(visit),
            Op::Select => self.select(visit),
            Op::ReducePrecision {
                exponent_bits,
                mantissa_bits,
            } => self.reduce_precision(visit, *exponent_bits, *mantissa_bits),
            Op::Dot(dimension_numbers) => linalg::dot::<T>(visit, dimension_numbers),
            Op::Convolution {
                window,
                dimension_numbers,
                feature_group_count,
            } => linalg::convolution::<T>(visit, window, dimension_numbers, *feature_group_count),
            other => {
                debug_assert!(false, "{} has no typed handler", other.name());
                Err(EvalError::Internal(format!(
                    "{} has no typed handler",
                    other.name()
                )))
            }
        }
    }

    fn compare(&self, visit: &Visit, direction: ComparisonDirection) -> Result<Literal> {
        let kernel = T::compare_kernel(direction).ok_or_else(|| {
            let name: &'static str = direction.into();
            EvalError::Unimplemented(format!(
                "compare {name} is not defined for {} (instruction {})",
                T::TYPE,
                visit.instruction.name
            ))
        })?;
        let (lhs, rhs) = (visit.operand(0)?, visit.operand(1)?);
        let (l, r) = (lhs.data::<T>()?, rhs.data::<T>()?);
        map_positions(visit.shape(), [lhs, rhs], |[i, j]| {
            kernel(l[i].widen(), r[j].widen())
        })
    }

    fn sort(&self, visit: &Visit, dimension: usize) -> Result<Literal> {
        let less = T::sort_less().ok_or_else(|| Self::unsupported(visit))?;
        sort::sort_along(visit, dimension, less)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visitor_table() {
        assert!(visitor_for(PrimitiveType::Tuple).is_none());
        assert!(visitor_for(PrimitiveType::Token).is_none());
        let visitor = visitor_for(PrimitiveType::Bf16).unwrap();
        assert_eq!(visitor.element_type(), PrimitiveType::Bf16);
        let cloned = dyn_clone::clone_box(&*visitor);
        assert_eq!(cloned.element_type(), PrimitiveType::Bf16);
    }
}
