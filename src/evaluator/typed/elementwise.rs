use itertools::Itertools;

use crate::{
    error::Result,
    literal::Literal,
    shape::Shape,
    types::NativeType,
    unimplemented_err,
};

/// Fill an array of `shape` from `N` operands of the same dimensions. `f`
/// receives the physical position of the current element in each operand.
///
/// When every operand shares the result layout, positions coincide and the
/// buffers are walked directly.
pub(crate) fn map_positions<R: NativeType, const N: usize>(
    shape: &Shape,
    operands: [&Literal; N],
    f: impl Fn([usize; N]) -> R,
) -> Result<Literal> {
    for operand in operands {
        if !operand.shape().same_dimensions(shape) {
            unimplemented_err!(
                "Implicit broadcasting is currently unsupported in HLO evaluator Shape Mismatch: {} vs {}",
                shape,
                operands.iter().map(|o| o.shape()).join(" vs ")
            );
        }
    }
    if operands.iter().all(|o| o.shape().layouts_equal(shape)) && R::TYPE == shape.element_type() {
        let values = (0..shape.element_count()).map(|i| f([i; N])).collect_vec();
        return Ok(Literal::from_parts(shape.clone(), R::into_data(values)));
    }
    Literal::populate::<R>(shape, |index| {
        f(std::array::from_fn(|k| operands[k].linear_index(index)))
    })
}
