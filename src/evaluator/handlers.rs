//! Handlers that don't depend on the element type, plus the routing of
//! everything else to the typed visitors.

use std::borrow::Cow;

use itertools::Itertools;
use num::complex::Complex32;
use num_traits::Float;
use tracing::trace;

use super::{typed::map_positions, Visit};
use crate::{
    error::{EvalError, Result},
    graph::ComputationId,
    invalid_argument, match_native,
    literal::Literal,
    op::{
        ComparisonDirection, GatherDimensionNumbers, Op, PaddingConfig,
        ScatterDimensionNumbers, UnaryOp, Window,
    },
    shape::{linear_index, try_for_each_index, Shape},
    types::{NativeType, PrimitiveType, Scalar},
    unimplemented_err,
};

pub(super) fn dispatch(visit: &Visit) -> Result<Literal> {
    let instruction = visit.instruction;
    match &instruction.op {
        Op::Parameter(number) => invalid_argument!(
            "parameter {number} ({}) has no bound argument",
            instruction.name
        ),
        Op::Constant(literal) => Ok(literal.clone()),
        Op::Unary(UnaryOp::Copy) => Ok(visit.operand(0)?.clone()),
        Op::Unary(UnaryOp::IsFinite) => is_finite(visit),
        Op::Unary(op @ (UnaryOp::Real | UnaryOp::Imag)) => real_imag(visit, *op),
        Op::Unary(UnaryOp::Abs) if visit.operand(0)?.element_type().is_complex() => {
            complex_abs(visit)
        }
        Op::Unary(_)
        | Op::Binary(_)
        | Op::Clamp
        | Op::ReducePrecision { .. }
        | Op::Dot(_)
        | Op::Convolution { .. } => visit.typed(visit.shape().element_type())?.visit(visit),
        Op::Compare(direction) => compare(visit, *direction),
        Op::Select => select(visit),
        Op::TupleSelect => tuple_select(visit),
        Op::Convert => visit.operand(0)?.convert(visit.shape().element_type()),
        Op::BitcastConvert => visit
            .operand(0)?
            .bitcast_convert(visit.shape().element_type()),
        Op::Bitcast => Literal::from_bytes(visit.shape(), &visit.operand(0)?.to_bytes()),
        Op::Iota { dimension } => iota(visit.shape(), *dimension),
        Op::Broadcast { dimensions } => visit.operand(0)?.broadcast(visit.shape(), dimensions),
        Op::Reshape => visit.operand(0)?.reshape(visit.shape().dimensions()),
        Op::Transpose { permutation } => visit.operand(0)?.transpose(permutation),
        Op::Reverse { dimensions } => visit.operand(0)?.reverse(dimensions),
        Op::Concatenate { dimension } => Literal::concatenate(&visit.operands, *dimension),
        Op::Slice {
            starts,
            limits,
            strides,
        } => visit.operand(0)?.slice(starts, limits, strides),
        Op::DynamicSlice { sizes } => dynamic_slice(visit, sizes),
        Op::DynamicUpdateSlice => dynamic_update_slice(visit),
        Op::Pad(config) => pad(visit, config),
        Op::Reduce {
            dimensions,
            to_apply,
        } => reduce(visit, dimensions, *to_apply),
        Op::ReduceWindow { window, to_apply } => reduce_window(visit, window, *to_apply),
        Op::SelectAndScatter {
            window,
            select,
            scatter,
        } => select_and_scatter(visit, window, *select, *scatter),
        Op::Gather {
            dimension_numbers,
            slice_sizes,
        } => gather(visit, dimension_numbers, slice_sizes),
        Op::Scatter {
            dimension_numbers,
            to_apply,
        } => scatter(visit, dimension_numbers, *to_apply),
        Op::Sort { dimension } => {
            let keys = visit.operand(0)?;
            visit.typed(keys.element_type())?.sort(visit, *dimension)
        }
        Op::Tuple => Ok(Literal::tuple(
            visit.operands.iter().map(|o| (*o).clone()).collect(),
        )),
        Op::GetTupleElement { index } => {
            let tuple = visit.operand(0)?;
            if !tuple.is_tuple() {
                invalid_argument!(
                    "get-tuple-element {} of non-tuple {}",
                    instruction.name,
                    tuple.shape()
                );
            }
            Ok(tuple.tuple_element(*index)?.clone())
        }
        Op::Call { to_apply } => visit
            .nested()
            .evaluate(visit.module, *to_apply, visit.operands.as_slice()),
        Op::Map { to_apply } => map(visit, *to_apply),
        Op::Conditional {
            true_computation,
            false_computation,
        } => conditional(visit, *true_computation, *false_computation),
        Op::While { condition, body } => while_loop(visit, *condition, *body),
        Op::AfterAll => Ok(Literal::token()),
        Op::AddDependency => Ok(visit.operand(0)?.clone()),
    }
}

fn is_finite(visit: &Visit) -> Result<Literal> {
    fn finite<F: NativeType + Float>(visit: &Visit, operand: &Literal) -> Result<Literal> {
        let x = operand.data::<F>()?;
        map_positions(visit.shape(), [operand], |[i]| x[i].is_finite())
    }
    let operand = visit.operand(0)?;
    match operand.element_type() {
        PrimitiveType::F32 => finite::<f32>(visit, operand),
        PrimitiveType::F64 => finite::<f64>(visit, operand),
        ty if ty.is_floating() => Err(EvalError::unsupported_type(
            "is-finite",
            &visit.instruction.name,
            ty,
        )),
        ty => invalid_argument!(
            "expected element type in shape to be floating point for IsFinite operation; got {ty}"
        ),
    }
}

/// Components of complex values; real floats are their own real part and
/// have a zero imaginary part.
fn real_imag(visit: &Visit, op: UnaryOp) -> Result<Literal> {
    let operand = visit.operand(0)?;
    match operand.element_type() {
        PrimitiveType::C64 => {
            let x = operand.data::<Complex32>()?;
            map_positions(visit.shape(), [operand], |[i]| match op {
                UnaryOp::Real => x[i].re,
                _ => x[i].im,
            })
        }
        ty if ty.is_floating() => match op {
            UnaryOp::Real => Ok(operand.clone()),
            _ => Ok(Literal::new(visit.shape().clone())),
        },
        ty => Err(EvalError::unsupported_type(
            visit.instruction.op.name(),
            &visit.instruction.name,
            ty,
        )),
    }
}

fn complex_abs(visit: &Visit) -> Result<Literal> {
    let operand = visit.operand(0)?;
    let x = operand.data::<Complex32>()?;
    map_positions(visit.shape(), [operand], |[i]| x[i].norm())
}

fn compare(visit: &Visit, direction: ComparisonDirection) -> Result<Literal> {
    let (lhs, rhs) = (visit.operand(0)?, visit.operand(1)?);
    if !lhs.shape().same_dimensions(rhs.shape()) {
        unimplemented_err!(
            "Implicit broadcasting is currently unsupported in HLO evaluator Shape Mismatch: {} vs {}",
            lhs.shape(),
            rhs.shape()
        );
    }
    if lhs.element_type() != rhs.element_type() {
        invalid_argument!(
            "compare {} has mismatched operand types {} and {}",
            visit.instruction.name,
            lhs.shape(),
            rhs.shape()
        );
    }
    visit.typed(lhs.element_type())?.compare(visit, direction)
}

fn scalar_predicate(visit: &Visit) -> Result<Option<bool>> {
    let pred = visit.operand(0)?;
    if pred.element_type() != PrimitiveType::Pred {
        invalid_argument!(
            "{} needs a pred predicate, got {}",
            visit.instruction.name,
            pred.shape()
        );
    }
    if pred.rank() != 0 {
        return Ok(None);
    }
    Ok(Some(pred.get_first::<bool>()?))
}

fn select(visit: &Visit) -> Result<Literal> {
    let (on_true, on_false) = (visit.operand(1)?, visit.operand(2)?);
    match scalar_predicate(visit)? {
        Some(true) => Ok(on_true.clone()),
        Some(false) => Ok(on_false.clone()),
        None if on_true.is_tuple() || on_false.is_tuple() => invalid_argument!(
            "select {} needs a scalar predicate for tuple operands",
            visit.instruction.name
        ),
        None => visit.typed(visit.shape().element_type())?.visit(visit),
    }
}

fn tuple_select(visit: &Visit) -> Result<Literal> {
    match scalar_predicate(visit)? {
        Some(true) => Ok(visit.operand(1)?.clone()),
        Some(false) => Ok(visit.operand(2)?.clone()),
        None => invalid_argument!(
            "tuple-select {} needs a scalar predicate",
            visit.instruction.name
        ),
    }
}

fn iota(shape: &Shape, dimension: usize) -> Result<Literal> {
    if dimension >= shape.rank() {
        invalid_argument!("iota dimension {dimension} out of range for {shape}");
    }
    match_native!(
        shape.element_type(),
        T => Literal::populate::<T>(shape, |index| {
            T::from_scalar(Scalar::UInt(index[dimension] as u64))
        }),
        _ => Err(EvalError::unhandled_type(shape.element_type()))
    )
}

/// Start indices, clamped so that a box of `sizes` at the start stays inside
/// `operand`. They come either as one rank-1 operand or as one scalar
/// operand per dimension, starting at operand `first`.
fn clamped_starts(
    visit: &Visit,
    first: usize,
    operand: &Literal,
    sizes: &[usize],
) -> Result<Vec<usize>> {
    let rank = operand.rank();
    let rest = visit.operands.get(first..).unwrap_or(&[]);
    let starts = match rest {
        [vector] if vector.rank() == 1 => {
            if vector.dimensions()[0] != rank {
                invalid_argument!(
                    "{} has {} start indices for rank {rank}",
                    visit.instruction.name,
                    vector.dimensions()[0]
                );
            }
            (0..rank)
                .map(|i| vector.get_integral_as_i64(&[i]))
                .collect::<Result<Vec<_>>>()?
        }
        scalars => {
            if scalars.len() != rank || scalars.iter().any(|s| s.rank() != 0) {
                invalid_argument!(
                    "{} needs {rank} scalar start indices",
                    visit.instruction.name
                );
            }
            scalars
                .iter()
                .map(|s| s.get_integral_as_i64(&[]))
                .collect::<Result<Vec<_>>>()?
        }
    };
    if sizes.len() != rank
        || sizes
            .iter()
            .zip(operand.dimensions())
            .any(|(size, dim)| size > dim)
    {
        invalid_argument!(
            "slice sizes {sizes:?} do not fit in {}",
            operand.shape()
        );
    }
    Ok(starts
        .into_iter()
        .zip(sizes.iter().zip(operand.dimensions()))
        .map(|(start, (size, dim))| start.clamp(0, (dim - size) as i64) as usize)
        .collect())
}

fn dynamic_slice(visit: &Visit, sizes: &[usize]) -> Result<Literal> {
    let operand = visit.operand(0)?;
    let starts = clamped_starts(visit, 1, operand, sizes)?;
    let limits = starts.iter().zip(sizes).map(|(s, n)| s + n).collect_vec();
    operand.slice(&starts, &limits, &vec![1; sizes.len()])
}

fn dynamic_update_slice(visit: &Visit) -> Result<Literal> {
    let (operand, update) = (visit.operand(0)?, visit.operand(1)?);
    if update.rank() != operand.rank() || update.element_type() != operand.element_type() {
        invalid_argument!(
            "cannot update {} with {}",
            operand.shape(),
            update.shape()
        );
    }
    let starts = clamped_starts(visit, 2, operand, update.dimensions())?;
    let mut result = operand.clone();
    result.copy_slice_from(update, &vec![0; update.rank()], &starts, update.dimensions())?;
    Ok(result)
}

fn pad(visit: &Visit, config: &PaddingConfig) -> Result<Literal> {
    let (operand, padding_value) = (visit.operand(0)?, visit.operand(1)?);
    let shape = visit.shape();
    if padding_value.rank() != 0 {
        invalid_argument!(
            "pad {} needs a scalar padding value, got {}",
            visit.instruction.name,
            padding_value.shape()
        );
    }
    if config.dimensions.len() != operand.rank() || shape.rank() != operand.rank() {
        invalid_argument!(
            "padding config of {} does not match {}",
            visit.instruction.name,
            operand.shape()
        );
    }
    for (d, padding) in config.dimensions.iter().enumerate() {
        let size = operand.dimensions()[d] as i64;
        let dilated = if size == 0 {
            0
        } else {
            size + (size - 1) * padding.interior_padding as i64
        };
        let expected = padding.edge_padding_low + dilated + padding.edge_padding_high;
        if expected != shape.dimension(d) as i64 {
            invalid_argument!(
                "padding {} along dimension {d} gives {expected} elements, {shape} declares {}",
                operand.shape(),
                shape.dimension(d)
            );
        }
    }

    let mut result = padding_value.broadcast(shape, &[])?;
    let mut dst = Vec::with_capacity(operand.element_count());
    let mut src = Vec::with_capacity(operand.element_count());
    let mut target = vec![0; shape.rank()];
    try_for_each_index(operand.dimensions(), |index| {
        for (d, padding) in config.dimensions.iter().enumerate() {
            let position = padding.edge_padding_low
                + (index[d] * (padding.interior_padding + 1)) as i64;
            if position < 0 || position >= shape.dimension(d) as i64 {
                return Ok(());
            }
            target[d] = position as usize;
        }
        dst.push(result.linear_index(&target));
        src.push(operand.linear_index(index));
        Ok(())
    })?;
    result.copy_positions_from(&dst, operand, &src)?;
    Ok(result)
}

fn reduce(visit: &Visit, dimensions: &[usize], to_apply: ComputationId) -> Result<Literal> {
    let count = visit.operands.len() / 2;
    if count == 0 || visit.operands.len() % 2 != 0 {
        invalid_argument!(
            "reduce {} needs matching inputs and init values, got {} operands",
            visit.instruction.name,
            visit.operands.len()
        );
    }
    let (inputs, inits) = visit.operands.split_at(count);
    let input = inputs[0];
    if inputs.iter().any(|i| !i.shape().same_dimensions(input.shape()))
        || inits.iter().any(|i| i.rank() != 0)
    {
        invalid_argument!(
            "reduce {} needs same-shaped inputs and scalar init values",
            visit.instruction.name
        );
    }
    if dimensions.iter().any(|d| *d >= input.rank()) || !dimensions.iter().all_unique() {
        invalid_argument!(
            "cannot reduce dimensions {dimensions:?} of {}",
            input.shape()
        );
    }

    let result_shapes = if count == 1 {
        vec![visit.shape().clone()]
    } else {
        visit.shape().tuple_shapes().to_vec()
    };
    if result_shapes.len() != count {
        invalid_argument!(
            "reduce {} declares {} but has {count} inputs",
            visit.instruction.name,
            visit.shape()
        );
    }
    if !result_shapes
        .iter()
        .map(|s| s.element_type())
        .all_equal()
    {
        unimplemented_err!(
            "Reduce with several outputs that have mixed element types is unsupported"
        );
    }
    let kept = (0..input.rank())
        .filter(|d| !dimensions.contains(d))
        .collect_vec();
    let kept_sizes = kept.iter().map(|d| input.dimensions()[*d]).collect_vec();
    if result_shapes.iter().any(|s| s.dimensions() != kept_sizes) {
        invalid_argument!(
            "reducing {} over {dimensions:?} cannot produce {}",
            input.shape(),
            visit.shape()
        );
    }
    let reduced_sizes = dimensions
        .iter()
        .map(|d| input.dimensions()[*d])
        .collect_vec();

    let function = visit.subcomputation(to_apply)?;
    if count == 1 && function.is_scalar_add() && result_shapes[0].element_type().is_floating() {
        return reduce_add_f64(
            input,
            inits[0],
            &result_shapes[0],
            &kept,
            dimensions,
            &reduced_sizes,
        );
    }

    let mut embedded = visit.nested();
    let mut results = result_shapes.into_iter().map(Literal::new).collect_vec();
    let mut index = vec![0; input.rank()];
    try_for_each_index(&kept_sizes, |out| {
        for (k, d) in kept.iter().enumerate() {
            index[*d] = out[k];
        }
        let mut accumulators = inits.iter().map(|i| (*i).clone()).collect_vec();
        try_for_each_index(&reduced_sizes, |reduced| {
            for (k, d) in dimensions.iter().enumerate() {
                index[*d] = reduced[k];
            }
            let mut args = std::mem::take(&mut accumulators);
            for input in inputs {
                args.push(input.element_literal(&index)?);
            }
            let value = embedded.evaluate(visit.module, to_apply, &args)?;
            accumulators = if count == 1 {
                vec![value]
            } else {
                value.decompose_tuple()
            };
            if accumulators.len() != count {
                invalid_argument!(
                    "reduce function {} must produce {count} values",
                    function.name
                );
            }
            Ok(())
        })?;
        for (result, accumulator) in results.iter_mut().zip(&accumulators) {
            result.copy_element_from(accumulator, &[], out)?;
        }
        Ok(())
    })?;
    Ok(if count == 1 {
        results.remove(0)
    } else {
        Literal::tuple(results)
    })
}

/// Floating point sum accumulated in double precision.
fn reduce_add_f64(
    input: &Literal,
    init: &Literal,
    shape: &Shape,
    kept: &[usize],
    dimensions: &[usize],
    reduced_sizes: &[usize],
) -> Result<Literal> {
    let init = init.first_scalar()?.as_f64();
    let mut index = vec![0; input.rank()];
    let mut sum = |out: &[usize]| -> Result<f64> {
        for (k, d) in kept.iter().enumerate() {
            index[*d] = out[k];
        }
        let mut acc = init;
        try_for_each_index(reduced_sizes, |reduced| {
            for (k, d) in dimensions.iter().enumerate() {
                index[*d] = reduced[k];
            }
            acc += input.scalar_at(&index)?.as_f64();
            Ok(())
        })?;
        Ok(acc)
    };
    match_native!(
        shape.element_type(),
        T => Literal::try_populate::<T>(shape, |out| Ok(T::from_scalar(Scalar::Float(sum(out)?)))),
        _ => Err(EvalError::unhandled_type(shape.element_type()))
    )
}

/// Visit the in-bounds operand indices covered by the window placed at
/// output position `out`. Positions in padding or dilation holes are skipped.
fn for_each_window_position(
    window: &Window,
    base: &[usize],
    out: &[usize],
    mut f: impl FnMut(&[usize]) -> Result<()>,
) -> Result<()> {
    let mut index = vec![0; base.len()];
    try_for_each_index(&window.sizes(), |tap| {
        for (d, dim) in window.dimensions.iter().enumerate() {
            let position = (out[d] * dim.stride + tap[d] * dim.window_dilation) as i64
                - dim.padding_low;
            let base_dilation = dim.base_dilation as i64;
            if position % base_dilation != 0 {
                return Ok(());
            }
            let position = position / base_dilation;
            if position < 0 || position >= base[d] as i64 {
                return Ok(());
            }
            index[d] = position as usize;
        }
        f(&index)
    })
}

fn window_output_dimensions(visit: &Visit, window: &Window, base: &Literal) -> Result<Vec<usize>> {
    if window.rank() != base.rank() {
        invalid_argument!(
            "{}: window of rank {} over {}",
            visit.instruction.name,
            window.rank(),
            base.shape()
        );
    }
    if window
        .dimensions
        .iter()
        .any(|d| d.stride == 0 || d.window_dilation == 0 || d.base_dilation == 0)
    {
        invalid_argument!(
            "{}: window strides and dilations must be positive",
            visit.instruction.name
        );
    }
    Ok(window
        .dimensions
        .iter()
        .zip(base.dimensions())
        .map(|(d, size)| d.output_size(*size))
        .collect())
}

fn reduce_window(visit: &Visit, window: &Window, to_apply: ComputationId) -> Result<Literal> {
    let (operand, init) = (visit.operand(0)?, visit.operand(1)?);
    if init.rank() != 0 {
        invalid_argument!(
            "reduce-window {} needs a scalar init value",
            visit.instruction.name
        );
    }
    let out_dims = window_output_dimensions(visit, window, operand)?;
    if visit.shape().dimensions() != out_dims {
        invalid_argument!(
            "reduce-window {} over {} gives {out_dims:?}, declared {}",
            visit.instruction.name,
            operand.shape(),
            visit.shape()
        );
    }
    let mut embedded = visit.nested();
    let mut result = Literal::new(visit.shape().clone());
    try_for_each_index(&out_dims, |out| {
        let mut acc = init.clone();
        for_each_window_position(window, operand.dimensions(), out, |index| {
            let current = operand.element_literal(index)?;
            acc = embedded.evaluate(visit.module, to_apply, &[&acc, &current])?;
            Ok(())
        })?;
        result.copy_element_from(&acc, &[], out)
    })?;
    Ok(result)
}

/// For every source element, pick one operand element of its window with
/// `select` and combine the source value into the result there with
/// `scatter`.
fn select_and_scatter(
    visit: &Visit,
    window: &Window,
    select: ComputationId,
    scatter: ComputationId,
) -> Result<Literal> {
    let (operand, source, init) = (visit.operand(0)?, visit.operand(1)?, visit.operand(2)?);
    if init.rank() != 0 {
        invalid_argument!(
            "select-and-scatter {} needs a scalar init value",
            visit.instruction.name
        );
    }
    let source_dims = window_output_dimensions(visit, window, operand)?;
    if source.dimensions() != source_dims || !visit.shape().same_dimensions(operand.shape()) {
        invalid_argument!(
            "select-and-scatter {}: source {} does not match the windows over {}",
            visit.instruction.name,
            source.shape(),
            operand.shape()
        );
    }
    let mut selector = visit.nested();
    let mut scatterer = visit.nested();
    let mut result = init.broadcast(visit.shape(), &[])?;
    try_for_each_index(&source_dims, |source_index| {
        let mut selected: Option<(Vec<usize>, Literal)> = None;
        for_each_window_position(window, operand.dimensions(), source_index, |index| {
            let current = operand.element_literal(index)?;
            let keep = match &selected {
                None => false,
                Some((_, best)) => selector
                    .evaluate(visit.module, select, &[best, &current])?
                    .get_first::<bool>()?,
            };
            if !keep {
                selected = Some((index.to_vec(), current));
            }
            Ok(())
        })?;
        if let Some((index, _)) = selected {
            let existing = result.element_literal(&index)?;
            let value = source.element_literal(source_index)?;
            let combined = scatterer.evaluate(visit.module, scatter, &[&value, &existing])?;
            result.copy_element_from(&combined, &[], &index)?;
        }
        Ok(())
    })?;
    Ok(result)
}

/// Start indices with the index vector dimension made explicit.
fn with_index_vector_dim(indices: &Literal, index_vector_dim: usize) -> Result<Cow<'_, Literal>> {
    if index_vector_dim == indices.rank() {
        let mut dims = indices.dimensions().to_vec();
        dims.push(1);
        return Ok(Cow::Owned(indices.reshape(&dims)?));
    }
    if index_vector_dim > indices.rank() || !indices.element_type().is_integral() {
        invalid_argument!(
            "index vector dimension {index_vector_dim} is invalid for indices {}",
            indices.shape()
        );
    }
    Ok(Cow::Borrowed(indices))
}

fn gather(
    visit: &Visit,
    dnums: &GatherDimensionNumbers,
    slice_sizes: &[usize],
) -> Result<Literal> {
    let operand = visit.operand(0)?;
    let indices = with_index_vector_dim(visit.operand(1)?, dnums.index_vector_dim)?;
    let shape = visit.shape();
    let ivd = dnums.index_vector_dim;

    let index_batch_dims = (0..indices.rank()).filter(|d| *d != ivd).collect_vec();
    let output_batch_dims = (0..shape.rank())
        .filter(|d| !dnums.offset_dims.contains(d))
        .collect_vec();
    let offset_operand_dims = (0..operand.rank())
        .filter(|d| !dnums.collapsed_slice_dims.contains(d))
        .collect_vec();
    let valid = slice_sizes.len() == operand.rank()
        && slice_sizes
            .iter()
            .zip(operand.dimensions())
            .all(|(s, d)| s <= d)
        && indices.dimensions()[ivd] == dnums.start_index_map.len()
        && dnums.start_index_map.iter().all(|d| *d < operand.rank())
        && index_batch_dims.len() == output_batch_dims.len()
        && offset_operand_dims.len() == dnums.offset_dims.len()
        && dnums.offset_dims.iter().all(|d| *d < shape.rank())
        && offset_operand_dims
            .iter()
            .zip(&dnums.offset_dims)
            .all(|(od, out)| shape.dimension(*out) == slice_sizes[*od])
        && index_batch_dims
            .iter()
            .zip(&output_batch_dims)
            .all(|(i, o)| indices.dimensions()[*i] == shape.dimension(*o))
        && shape.element_type() == operand.element_type();
    if !valid {
        invalid_argument!(
            "gather {} of {} with indices {} cannot produce {shape} ({dnums:?}, slice sizes {slice_sizes:?})",
            visit.instruction.name,
            operand.shape(),
            indices.shape()
        );
    }

    let strides = shape.strides();
    let mut positions = vec![0; shape.element_count()];
    let mut index_index = vec![0; indices.rank()];
    let mut input = vec![0; operand.rank()];
    try_for_each_index(shape.dimensions(), |out| {
        input.iter_mut().for_each(|i| *i = 0);
        for (i, o) in index_batch_dims.iter().zip(&output_batch_dims) {
            index_index[*i] = out[*o];
        }
        for (k, operand_dim) in dnums.start_index_map.iter().enumerate() {
            index_index[ivd] = k;
            let start = indices.get_integral_as_i64(&index_index)?;
            let max = (operand.dimensions()[*operand_dim] - slice_sizes[*operand_dim]) as i64;
            input[*operand_dim] = start.clamp(0, max) as usize;
        }
        for (operand_dim, out_dim) in offset_operand_dims.iter().zip(&dnums.offset_dims) {
            input[*operand_dim] += out[*out_dim];
        }
        positions[linear_index(&strides, out)] = operand.linear_index(&input);
        Ok(())
    })?;
    Ok(operand.from_positions(shape.clone(), &positions))
}

fn scatter(
    visit: &Visit,
    dnums: &ScatterDimensionNumbers,
    to_apply: ComputationId,
) -> Result<Literal> {
    let operand = visit.operand(0)?;
    let indices = with_index_vector_dim(visit.operand(1)?, dnums.index_vector_dim)?;
    let updates = visit.operand(2)?;
    let ivd = dnums.index_vector_dim;

    let update_scatter_dims = (0..updates.rank())
        .filter(|d| !dnums.update_window_dims.contains(d))
        .collect_vec();
    let index_batch_dims = (0..indices.rank()).filter(|d| *d != ivd).collect_vec();
    let window_operand_dims = (0..operand.rank())
        .filter(|d| !dnums.inserted_window_dims.contains(d))
        .collect_vec();
    let valid = indices.dimensions()[ivd] == dnums.scatter_dims_to_operand_dims.len()
        && dnums
            .scatter_dims_to_operand_dims
            .iter()
            .all(|d| *d < operand.rank())
        && update_scatter_dims.len() == index_batch_dims.len()
        && window_operand_dims.len() == dnums.update_window_dims.len()
        && dnums.update_window_dims.iter().all(|d| *d < updates.rank())
        && update_scatter_dims
            .iter()
            .zip(&index_batch_dims)
            .all(|(u, i)| updates.dimensions()[*u] == indices.dimensions()[*i]);
    if !valid {
        invalid_argument!(
            "scatter {} of {} into {} with indices {} is malformed ({dnums:?})",
            visit.instruction.name,
            updates.shape(),
            operand.shape(),
            indices.shape()
        );
    }
    let mut window_sizes = vec![1; operand.rank()];
    for (operand_dim, update_dim) in window_operand_dims.iter().zip(&dnums.update_window_dims) {
        window_sizes[*operand_dim] = updates.dimensions()[*update_dim];
    }
    if window_sizes
        .iter()
        .zip(operand.dimensions())
        .any(|(w, d)| w > d)
    {
        invalid_argument!(
            "scatter {}: update windows of {} do not fit in {}",
            visit.instruction.name,
            updates.shape(),
            operand.shape()
        );
    }

    let mut embedded = visit.nested();
    let mut result = operand.clone();
    let mut index_index = vec![0; indices.rank()];
    let mut start = vec![0i64; operand.rank()];
    let mut target = vec![0; operand.rank()];
    try_for_each_index(updates.dimensions(), |update_index| {
        start.iter_mut().for_each(|s| *s = 0);
        for (u, i) in update_scatter_dims.iter().zip(&index_batch_dims) {
            index_index[*i] = update_index[*u];
        }
        for (k, operand_dim) in dnums.scatter_dims_to_operand_dims.iter().enumerate() {
            index_index[ivd] = k;
            start[*operand_dim] = indices.get_integral_as_i64(&index_index)?;
        }
        let in_bounds = (0..operand.rank()).all(|d| {
            start[d] >= 0 && start[d] <= (operand.dimensions()[d] - window_sizes[d]) as i64
        });
        if !in_bounds {
            return Ok(());
        }
        for d in 0..operand.rank() {
            target[d] = start[d] as usize;
        }
        for (operand_dim, update_dim) in window_operand_dims.iter().zip(&dnums.update_window_dims) {
            target[*operand_dim] += update_index[*update_dim];
        }
        let current = result.element_literal(&target)?;
        let update = updates.element_literal(update_index)?;
        let combined = embedded.evaluate(visit.module, to_apply, &[&current, &update])?;
        result.copy_element_from(&combined, &[], &target)
    })?;
    Ok(result)
}

/// Apply a scalar computation at every position of same-shaped operands.
fn map(visit: &Visit, to_apply: ComputationId) -> Result<Literal> {
    let shape = visit.shape();
    if visit
        .operands
        .iter()
        .any(|o| !o.shape().same_dimensions(shape))
    {
        invalid_argument!(
            "map {} needs operands of dimensions {shape}",
            visit.instruction.name
        );
    }
    let mut embedded = visit.nested();
    let mut result = Literal::new(shape.clone());
    try_for_each_index(shape.dimensions(), |index| {
        let args = visit
            .operands
            .iter()
            .map(|o| o.element_literal(index))
            .collect::<Result<Vec<_>>>()?;
        let value = embedded.evaluate(visit.module, to_apply, &args)?;
        result.copy_element_from(&value, &[], index)
    })?;
    Ok(result)
}

fn conditional(
    visit: &Visit,
    true_computation: ComputationId,
    false_computation: ComputationId,
) -> Result<Literal> {
    let (branch, arg) = match scalar_predicate(visit)? {
        Some(true) => (true_computation, visit.operand(1)?),
        Some(false) => (false_computation, visit.operand(2)?),
        None => invalid_argument!(
            "conditional {} needs a scalar predicate",
            visit.instruction.name
        ),
    };
    visit.nested().evaluate(visit.module, branch, &[arg])
}

fn while_loop(visit: &Visit, condition: ComputationId, body: ComputationId) -> Result<Literal> {
    let max_iterations = visit.config().max_loop_iterations;
    let mut condition_evaluator = visit.nested();
    let mut body_evaluator = visit.nested();
    let mut state = visit.operand(0)?.clone();
    let mut iterations = 0u64;
    loop {
        let keep_going = condition_evaluator.evaluate(visit.module, condition, &[&state])?;
        if keep_going.element_type() != PrimitiveType::Pred || keep_going.rank() != 0 {
            invalid_argument!(
                "while {} condition produced {}, expected pred[]",
                visit.instruction.name,
                keep_going.shape()
            );
        }
        if !keep_going.get_first::<bool>()? {
            break;
        }
        if let Some(max) = max_iterations {
            if iterations >= max {
                invalid_argument!(
                    "Loop {} exceeded loop iteration limit ({max}).",
                    visit.instruction.name
                );
            }
        }
        state = body_evaluator.evaluate(visit.module, body, &[&state])?;
        iterations += 1;
        trace!(
            instruction = %visit.instruction.name,
            iteration = iterations,
            state = %state.to_string_truncated(),
            "while iteration"
        );
    }
    Ok(state)
}
