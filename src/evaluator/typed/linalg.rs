use itertools::Itertools;

use super::kernels::ElementType;
use crate::{
    error::{EvalError, Result},
    evaluator::Visit,
    invalid_argument,
    literal::Literal,
    op::{ConvolutionDimensionNumbers, DotDimensionNumbers, Window},
    shape::Shape,
    types::PrimitiveType,
};

pub(super) fn dot<T: ElementType>(visit: &Visit, dnums: &DotDimensionNumbers) -> Result<Literal> {
    let (lhs, rhs) = (visit.operand(0)?, visit.operand(1)?);
    if T::TYPE == PrimitiveType::F32
        && visit.config().use_fast_path
        && is_plain_matmul(lhs, rhs, dnums, visit.shape())
    {
        return matmul_f32(lhs, rhs, visit.shape());
    }
    dot_general::<T>(lhs, rhs, dnums, visit.shape())
}

/// Rank-2 `[m, k] x [k, n]` over default layouts.
fn is_plain_matmul(
    lhs: &Literal,
    rhs: &Literal,
    dnums: &DotDimensionNumbers,
    shape: &Shape,
) -> bool {
    lhs.rank() == 2
        && rhs.rank() == 2
        && dnums.lhs_contracting_dimensions == [1]
        && dnums.rhs_contracting_dimensions == [0]
        && dnums.lhs_batch_dimensions.is_empty()
        && dnums.rhs_batch_dimensions.is_empty()
        && lhs.element_type() == PrimitiveType::F32
        && rhs.element_type() == PrimitiveType::F32
        && lhs.shape().has_default_layout()
        && rhs.shape().has_default_layout()
        && shape.has_default_layout()
        && shape.dimensions() == [lhs.dimensions()[0], rhs.dimensions()[1]]
        && lhs.dimensions()[1] == rhs.dimensions()[0]
        && lhs.dimensions().iter().chain(rhs.dimensions()).all(|d| *d > 0)
}

fn matmul_f32(lhs: &Literal, rhs: &Literal, shape: &Shape) -> Result<Literal> {
    let (m, k, n) = (lhs.dimensions()[0], lhs.dimensions()[1], rhs.dimensions()[1]);
    let (a, b) = (lhs.data::<f32>()?, rhs.data::<f32>()?);
    let mut c = vec![0.0f32; m * n];
    unsafe {
        matrixmultiply::sgemm(
            m,
            k,
            n,
            1.0,
            a.as_ptr(),
            k as isize,
            1,
            b.as_ptr(),
            n as isize,
            1,
            0.0,
            c.as_mut_ptr(),
            n as isize,
            1,
        );
    }
    Literal::from_vec(shape.dimensions(), c)
}

fn dot_general<T: ElementType>(
    lhs: &Literal,
    rhs: &Literal,
    dnums: &DotDimensionNumbers,
    shape: &Shape,
) -> Result<Literal> {
    dnums.validate(lhs.rank(), rhs.rank())?;
    let (&[lhs_contracting], &[rhs_contracting]) = (
        dnums.lhs_contracting_dimensions.as_slice(),
        dnums.rhs_contracting_dimensions.as_slice(),
    ) else {
        invalid_argument!(
            "dot expects exactly one contracting dimension per side, got {:?} and {:?}",
            dnums.lhs_contracting_dimensions,
            dnums.rhs_contracting_dimensions
        );
    };
    if lhs.dimensions()[lhs_contracting] != rhs.dimensions()[rhs_contracting] {
        invalid_argument!(
            "incompatible dot operands {} and {} for {dnums:?}",
            lhs.shape(),
            rhs.shape()
        );
    }
    let batch = dnums
        .lhs_batch_dimensions
        .iter()
        .copied()
        .zip(dnums.rhs_batch_dimensions.iter().copied())
        .collect_vec();
    let lhs_free = (0..lhs.rank())
        .filter(|d| *d != lhs_contracting && !dnums.lhs_batch_dimensions.contains(d))
        .collect_vec();
    let rhs_free = (0..rhs.rank())
        .filter(|d| *d != rhs_contracting && !dnums.rhs_batch_dimensions.contains(d))
        .collect_vec();

    let expected = batch
        .iter()
        .map(|(l, _)| lhs.dimensions()[*l])
        .chain(lhs_free.iter().map(|d| lhs.dimensions()[*d]))
        .chain(rhs_free.iter().map(|d| rhs.dimensions()[*d]))
        .collect_vec();
    if shape.dimensions() != expected
        || batch
            .iter()
            .any(|(l, r)| lhs.dimensions()[*l] != rhs.dimensions()[*r])
    {
        invalid_argument!(
            "dot of {} and {} cannot produce {shape}",
            lhs.shape(),
            rhs.shape()
        );
    }

    let contracted = lhs.dimensions()[lhs_contracting];
    let accumulate = T::multiply_accumulate();
    let (l, r) = (lhs.data::<T>()?, rhs.data::<T>()?);
    let mut lhs_index = vec![0; lhs.rank()];
    let mut rhs_index = vec![0; rhs.rank()];
    Literal::populate::<T>(shape, |out| {
        for (i, (lb, rb)) in batch.iter().enumerate() {
            lhs_index[*lb] = out[i];
            rhs_index[*rb] = out[i];
        }
        let mut position = batch.len();
        for d in &lhs_free {
            lhs_index[*d] = out[position];
            position += 1;
        }
        for d in &rhs_free {
            rhs_index[*d] = out[position];
            position += 1;
        }
        let mut acc = T::zero();
        for k in 0..contracted {
            lhs_index[lhs_contracting] = k;
            rhs_index[rhs_contracting] = k;
            acc = accumulate(
                acc,
                l[lhs.linear_index(&lhs_index)].widen(),
                r[rhs.linear_index(&rhs_index)].widen(),
            );
        }
        T::narrow(acc)
    })
}

pub(super) fn convolution<T: ElementType>(
    visit: &Visit,
    window: &Window,
    dnums: &ConvolutionDimensionNumbers,
    feature_group_count: usize,
) -> Result<Literal> {
    let (lhs, rhs) = (visit.operand(0)?, visit.operand(1)?);
    let shape = visit.shape();
    let spatial = dnums.input_spatial_dimensions.len();
    dnums
        .validate(lhs.rank(), rhs.rank(), shape.rank(), window.rank())
        .map_err(|e| {
            EvalError::InvalidArgument(format!(
                "convolution {}: {}",
                visit.instruction.name,
                e.message()
            ))
        })?;

    if window
        .dimensions
        .iter()
        .any(|d| d.stride == 0 || d.window_dilation == 0 || d.base_dilation == 0)
    {
        invalid_argument!(
            "convolution {}: window strides and dilations must be positive",
            visit.instruction.name
        );
    }

    let input_z_size = lhs.dimensions()[dnums.input_feature_dimension];
    let output_z_size = rhs.dimensions()[dnums.kernel_output_feature_dimension];
    if feature_group_count == 0
        || input_z_size % feature_group_count != 0
        || output_z_size % feature_group_count != 0
        || rhs.dimensions()[dnums.kernel_input_feature_dimension]
            != input_z_size / feature_group_count
    {
        invalid_argument!(
            "convolution {}: {} input features and {} output features do not split into {} groups",
            visit.instruction.name,
            input_z_size,
            output_z_size,
            feature_group_count
        );
    }
    let out_dims = shape.dimensions();
    if out_dims[dnums.output_batch_dimension] != lhs.dimensions()[dnums.input_batch_dimension]
        || out_dims[dnums.output_feature_dimension] != output_z_size
    {
        invalid_argument!(
            "convolution {} of {} with {} cannot produce {shape}",
            visit.instruction.name,
            lhs.shape(),
            rhs.shape()
        );
    }
    let input_group_size = input_z_size / feature_group_count;
    let output_group_size = output_z_size / feature_group_count;

    for k in 0..spatial {
        let expected = window.dimensions[k]
            .output_size(lhs.dimensions()[dnums.input_spatial_dimensions[k]]);
        if rhs.dimensions()[dnums.kernel_spatial_dimensions[k]] != window.dimensions[k].size
            || shape.dimensions()[dnums.output_spatial_dimensions[k]] != expected
        {
            invalid_argument!(
                "convolution {}: spatial dimension {k} of {shape} does not match the window",
                visit.instruction.name
            );
        }
    }

    let kernel_spatial_sizes = window.sizes();
    let accumulate = T::multiply_accumulate();
    let (l, r) = (lhs.data::<T>()?, rhs.data::<T>()?);
    let lhs_dims = lhs.dimensions();

    Literal::populate_parallel::<T>(shape, visit.config().parallel_threshold, |out| {
        let group = out[dnums.output_feature_dimension] / output_group_size;
        let mut lhs_index = vec![0; lhs.rank()];
        let mut rhs_index = vec![0; rhs.rank()];
        lhs_index[dnums.input_batch_dimension] = out[dnums.output_batch_dimension];
        rhs_index[dnums.kernel_output_feature_dimension] = out[dnums.output_feature_dimension];

        let mut acc = T::zero();
        crate::shape::try_for_each_index(&kernel_spatial_sizes, |tap| {
            for k in 0..spatial {
                let dim = &window.dimensions[k];
                let undilated = (out[dnums.output_spatial_dimensions[k]] * dim.stride) as i64
                    - dim.padding_low
                    + (tap[k] * dim.window_dilation) as i64;
                let base_dilation = dim.base_dilation as i64;
                if base_dilation > 1 && undilated % base_dilation != 0 {
                    return Ok(());
                }
                let input = undilated / base_dilation;
                let input_dim = dnums.input_spatial_dimensions[k];
                if input < 0 || input >= lhs_dims[input_dim] as i64 {
                    return Ok(());
                }
                lhs_index[input_dim] = input as usize;
                rhs_index[dnums.kernel_spatial_dimensions[k]] = if dim.window_reversal {
                    dim.size - 1 - tap[k]
                } else {
                    tap[k]
                };
            }
            for iz in 0..input_group_size {
                lhs_index[dnums.input_feature_dimension] = group * input_group_size + iz;
                rhs_index[dnums.kernel_input_feature_dimension] = iz;
                acc = accumulate(
                    acc,
                    l[lhs.linear_index(&lhs_index)].widen(),
                    r[rhs.linear_index(&rhs_index)].widen(),
                );
            }
            Ok(())
        })?;
        Ok(T::narrow(acc))
    })
}
