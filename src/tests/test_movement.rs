use dfdx::prelude::*;
use proptest::prelude::*;

use super::{assert_close, assert_exact, run, scalar_binary, single};
use crate::{comparison::equal, prelude::*, shape::Shape};

// Movement op tests

fn f32_shape(dims: &[usize]) -> Shape {
    Shape::array(PrimitiveType::F32, dims.to_vec())
}

fn s32_shape(dims: &[usize]) -> Shape {
    Shape::array(PrimitiveType::S32, dims.to_vec())
}

#[test]
fn test_reshape() {
    let mut b = ComputationBuilder::new("reshape");
    let a = b.constant(Literal::matrix(&[[1f32, 2., 3.], [1., 2., 3.]]));
    let root = b.add_op(Op::Reshape, f32_shape(&[6])).input(a).finish();
    let result = run(&single(b, root), &[]).unwrap();

    let d_dev = Cpu::default();
    let d_a = d_dev.tensor([[1., 2., 3.], [1., 2., 3.]]);
    let d_b: dfdx::tensor::Tensor<Rank1<6>, f32, Cpu> = d_a.reshape();

    assert_close(&result.to_vec::<f32>().unwrap(), &d_b.as_vec());
}

#[test]
fn test_transpose() {
    let mut b = ComputationBuilder::new("transpose");
    let a = b.constant(Literal::matrix(&[[1f32, 2., 3.], [4., 5., 6.]]));
    let root = b
        .add_op(
            Op::Transpose {
                permutation: vec![1, 0],
            },
            f32_shape(&[3, 2]),
        )
        .input(a)
        .finish();
    let result = run(&single(b, root), &[]).unwrap();

    let d_dev = Cpu::default();
    let d_a = d_dev.tensor([[1., 2., 3.], [4., 5., 6.]]);
    let d_b: dfdx::tensor::Tensor<Rank2<3, 2>, f32, Cpu> = d_a.permute();

    assert_close(&result.to_vec::<f32>().unwrap(), &d_b.as_vec());
}

#[test]
fn test_broadcast() {
    let mut b = ComputationBuilder::new("broadcast");
    let a = b.constant(Literal::vec1(&[1f32, 2., 3.]));
    let root = b
        .add_op(Op::Broadcast { dimensions: vec![0] }, f32_shape(&[3, 2]))
        .input(a)
        .finish();
    let result = run(&single(b, root), &[]).unwrap();

    let d_dev = Cpu::default();
    let d_a = d_dev.tensor([1., 2., 3.]);
    let d_b: dfdx::tensor::Tensor<Rank2<3, 2>, f32, Cpu> = d_a.broadcast();

    assert_close(&result.to_vec::<f32>().unwrap(), &d_b.as_vec());
}

#[test]
fn test_slice() {
    let mut b = ComputationBuilder::new("slice");
    let a = b.constant(Literal::matrix(&[[1f32, 2., 3.], [4., 5., 6.]]));
    let root = b
        .add_op(
            Op::Slice {
                starts: vec![1, 0],
                limits: vec![2, 3],
                strides: vec![1, 1],
            },
            f32_shape(&[1, 3]),
        )
        .input(a)
        .finish();
    let result = run(&single(b, root), &[]).unwrap();

    let d_dev = Cpu::default();
    let d_a = d_dev.tensor([[1., 2., 3.], [4., 5., 6.]]);
    let d_b = d_a.slice((1.., ..));

    assert_close(&result.to_vec::<f32>().unwrap(), &d_b.as_vec());
}

#[test]
fn test_strided_slice() {
    let mut b = ComputationBuilder::new("strided");
    let a = b.constant(Literal::vec1(&[0i32, 1, 2, 3, 4, 5, 6]));
    let root = b
        .add_op(
            Op::Slice {
                starts: vec![1],
                limits: vec![7],
                strides: vec![2],
            },
            s32_shape(&[3]),
        )
        .input(a)
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<i32>().unwrap(),
        &[1, 3, 5],
    );
}

#[test]
fn test_concatenate_and_reverse() {
    let mut b = ComputationBuilder::new("concat");
    let x = b.constant(Literal::matrix(&[[1i32, 2], [3, 4]]));
    let y = b.constant(Literal::matrix(&[[5i32, 6]]));
    let cat = b
        .add_op(Op::Concatenate { dimension: 0 }, s32_shape(&[3, 2]))
        .inputs(&[x, y])
        .finish();
    let root = b
        .add_op(Op::Reverse { dimensions: vec![1] }, s32_shape(&[3, 2]))
        .input(cat)
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<i32>().unwrap(),
        &[2, 1, 4, 3, 6, 5],
    );
}

#[test]
fn test_negative_padding() {
    let mut b = ComputationBuilder::new("pad");
    let x = b.constant(Literal::vec1(&[1f32, 2., 3., 4.]));
    let value = b.constant(Literal::scalar(9f32));
    let root = b
        .add_op(Op::Pad(PaddingConfig::new(&[(-1, 1, 0)])), f32_shape(&[4]))
        .inputs(&[x, value])
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<f32>().unwrap(),
        &[2., 3., 4., 9.],
    );
}

#[test]
fn test_interior_padding() {
    let mut b = ComputationBuilder::new("pad");
    let x = b.constant(Literal::matrix(&[[1i32, 2], [3, 4]]));
    let value = b.constant(Literal::scalar(0i32));
    let root = b
        .add_op(
            Op::Pad(PaddingConfig::new(&[(0, 0, 0), (1, 0, 1)])),
            s32_shape(&[2, 4]),
        )
        .inputs(&[x, value])
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<i32>().unwrap(),
        &[0, 1, 0, 2, 0, 3, 0, 4],
    );

    let mut b = ComputationBuilder::new("bad_pad");
    let x = b.constant(Literal::vec1(&[1i32, 2]));
    let value = b.constant(Literal::vec1(&[0i32]));
    let root = b
        .add_op(Op::Pad(PaddingConfig::new(&[(1, 1, 0)])), s32_shape(&[4]))
        .inputs(&[x, value])
        .finish();
    assert!(run(&single(b, root), &[]).unwrap_err().is_invalid_argument());
}

#[test]
fn test_dynamic_slice_vector_start() {
    let mut b = ComputationBuilder::new("dynamic_slice");
    let x = b.constant(Literal::matrix(&[
        [0i32, 1, 2, 3],
        [4, 5, 6, 7],
        [8, 9, 10, 11],
    ]));
    let starts = b.constant(Literal::vec1(&[1i32, 5]));
    let root = b
        .add_op(
            Op::DynamicSlice {
                sizes: vec![2, 2],
            },
            s32_shape(&[2, 2]),
        )
        .inputs(&[x, starts])
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<i32>().unwrap(),
        &[6, 7, 10, 11],
    );
}

#[test]
fn test_dynamic_update_slice() {
    let mut b = ComputationBuilder::new("update");
    let x = b.constant(Literal::vec1(&[0i32; 4]));
    let update = b.constant(Literal::vec1(&[7i32, 8]));
    let start = b.constant(Literal::scalar(3i32));
    let root = b
        .add_op(Op::DynamicUpdateSlice, s32_shape(&[4]))
        .inputs(&[x, update, start])
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<i32>().unwrap(),
        &[0, 0, 7, 8],
    );
}

fn rows_gather() -> GatherDimensionNumbers {
    GatherDimensionNumbers {
        offset_dims: vec![1],
        collapsed_slice_dims: vec![0],
        start_index_map: vec![0],
        index_vector_dim: 1,
    }
}

fn rows_scatter() -> ScatterDimensionNumbers {
    ScatterDimensionNumbers {
        update_window_dims: vec![1],
        inserted_window_dims: vec![0],
        scatter_dims_to_operand_dims: vec![0],
        index_vector_dim: 1,
    }
}

fn gather_rows(operand: Literal, rows: &[i32]) -> Result<Literal> {
    let mut b = ComputationBuilder::new("gather");
    let x = b.constant(operand);
    let indices = b.constant(Literal::vec1(rows));
    let root = b
        .add_op(
            Op::Gather {
                dimension_numbers: rows_gather(),
                slice_sizes: vec![1, 3],
            },
            s32_shape(&[rows.len(), 3]),
        )
        .inputs(&[x, indices])
        .finish();
    run(&single(b, root), &[])
}

fn scatter_add_rows(operand: Literal, rows: &[i32], updates: Literal) -> Result<Literal> {
    let mut module = HloModule::new("scatter");
    let add = module.add_computation(scalar_binary("add", BinaryOp::Add, PrimitiveType::S32));
    let mut b = ComputationBuilder::new("main");
    let shape = operand.shape().clone();
    let x = b.constant(operand);
    let indices = b.constant(Literal::vec1(rows));
    let updates = b.constant(updates);
    let root = b
        .add_op(
            Op::Scatter {
                dimension_numbers: rows_scatter(),
                to_apply: add,
            },
            shape,
        )
        .inputs(&[x, indices, updates])
        .finish();
    module.add_entry_computation(b.build(root).unwrap());
    run(&module, &[])
}

fn three_by_three() -> Literal {
    Literal::matrix(&[[1i32, 2, 3], [4, 5, 6], [7, 8, 9]])
}

#[test]
fn test_gather_rows() {
    let result = gather_rows(three_by_three(), &[0, 2]).unwrap();
    assert_eq!(result.dimensions(), &[2, 3]);
    assert_exact(&result.to_vec::<i32>().unwrap(), &[1, 2, 3, 7, 8, 9]);

    // Start indices are clamped into the operand.
    let result = gather_rows(three_by_three(), &[5, -1]).unwrap();
    assert_exact(&result.to_vec::<i32>().unwrap(), &[7, 8, 9, 1, 2, 3]);
}

#[test]
fn test_scatter_add_rows() {
    let zeros = Literal::new(s32_shape(&[3, 3]));
    let updates = Literal::matrix(&[[1i32, 2, 3], [4, 5, 6]]);
    let result = scatter_add_rows(zeros.clone(), &[0, 2], updates.clone()).unwrap();
    assert_exact(
        &result.to_vec::<i32>().unwrap(),
        &[1, 2, 3, 0, 0, 0, 4, 5, 6],
    );

    // Repeated indices accumulate; out of bounds windows are skipped.
    let result = scatter_add_rows(zeros, &[1, 3], updates.clone()).unwrap();
    assert_exact(
        &result.to_vec::<i32>().unwrap(),
        &[0, 0, 0, 1, 2, 3, 0, 0, 0],
    );
    let result = scatter_add_rows(three_by_three(), &[1, 1], updates).unwrap();
    assert_exact(
        &result.to_vec::<i32>().unwrap(),
        &[1, 2, 3, 9, 12, 15, 7, 8, 9],
    );
}

#[test]
fn test_scatter_then_gather() {
    let updates = Literal::matrix(&[[1i32, 2, 3], [4, 5, 6]]);
    let scattered =
        scatter_add_rows(Literal::new(s32_shape(&[3, 3])), &[2, 0], updates.clone()).unwrap();
    let gathered = gather_rows(scattered, &[2, 0]).unwrap();
    assert!(equal(&updates, &gathered).is_ok());
}

fn dims_and_values() -> impl Strategy<Value = (Vec<usize>, Vec<i32>)> {
    prop::collection::vec(1usize..=4, 1..=4).prop_flat_map(|dims| {
        let n = dims.iter().product::<usize>();
        (Just(dims), prop::collection::vec(any::<i32>(), n))
    })
}

fn transpose_case() -> impl Strategy<Value = (Vec<usize>, Vec<i32>, Vec<usize>)> {
    dims_and_values().prop_flat_map(|(dims, values)| {
        let permutation = (0..dims.len()).collect::<Vec<_>>();
        (Just(dims), Just(values), Just(permutation).prop_shuffle())
    })
}

fn pad_case() -> impl Strategy<Value = (Vec<usize>, Vec<i32>, Vec<(i64, i64, usize)>)> {
    dims_and_values().prop_flat_map(|(dims, values)| {
        let rank = dims.len();
        (
            Just(dims),
            Just(values),
            prop::collection::vec((0i64..3, 0i64..3, 0usize..3), rank),
        )
    })
}

proptest! {
    #[test]
    fn prop_transpose_moves_elements((dims, values, permutation) in transpose_case()) {
        let literal = Literal::from_vec(&dims, values).unwrap();
        let out_dims = permutation.iter().map(|p| dims[*p]).collect::<Vec<_>>();
        let mut b = ComputationBuilder::new("transpose");
        let x = b.constant(literal.clone());
        let root = b
            .add_op(Op::Transpose { permutation: permutation.clone() }, s32_shape(&out_dims))
            .input(x)
            .finish();
        let result = run(&single(b, root), &[]).unwrap();
        prop_assert_eq!(result.dimensions(), out_dims.as_slice());

        let mut source = vec![0; dims.len()];
        crate::shape::try_for_each_index(&out_dims, |index| {
            for (i, p) in permutation.iter().enumerate() {
                source[*p] = index[i];
            }
            assert_eq!(result.get::<i32>(index)?, literal.get::<i32>(&source)?);
            Ok(())
        })
        .unwrap();

        let mut inverse = vec![0; permutation.len()];
        for (i, p) in permutation.iter().enumerate() {
            inverse[*p] = i;
        }
        let back = result.transpose(&inverse).unwrap();
        prop_assert!(equal(&literal, &back).is_ok());
    }

    #[test]
    fn prop_reshape_round_trip((dims, values) in dims_and_values()) {
        let literal = Literal::from_vec(&dims, values.clone()).unwrap();
        let flat = literal.reshape(&[values.len()]).unwrap();
        prop_assert_eq!(flat.to_vec::<i32>().unwrap(), values);
        let back = flat.reshape(&dims).unwrap();
        prop_assert!(equal(&literal, &back).is_ok());
    }

    #[test]
    fn prop_slice_undoes_pad((dims, values, padding) in pad_case()) {
        let literal = Literal::from_vec(&dims, values).unwrap();
        let padded_dims = dims
            .iter()
            .zip(&padding)
            .map(|(n, (low, high, interior))| (*low + *high) as usize + n + (n - 1) * interior)
            .collect::<Vec<_>>();
        let starts = padding.iter().map(|(low, _, _)| *low as usize).collect::<Vec<_>>();
        let strides = padding.iter().map(|(_, _, interior)| interior + 1).collect::<Vec<_>>();
        let limits = dims
            .iter()
            .zip(&starts)
            .zip(&strides)
            .map(|((n, start), stride)| start + (n - 1) * stride + 1)
            .collect::<Vec<_>>();

        let mut b = ComputationBuilder::new("pad_slice");
        let x = b.constant(literal.clone());
        let value = b.constant(Literal::scalar(-1i32));
        let padded = b
            .add_op(Op::Pad(PaddingConfig::new(&padding)), s32_shape(&padded_dims))
            .inputs(&[x, value])
            .finish();
        let root = b
            .add_op(Op::Slice { starts, limits, strides }, s32_shape(&dims))
            .input(padded)
            .finish();
        let result = run(&single(b, root), &[]).unwrap();
        prop_assert!(equal(&literal, &result).is_ok());
    }

    #[test]
    fn prop_dynamic_slice_clamps(start in -20i32..20) {
        let mut b = ComputationBuilder::new("dynamic_slice");
        let x = b.constant(Literal::vec1(&[0i32, 1, 2, 3, 4, 5, 6, 7]));
        let s = b.constant(Literal::scalar(start));
        let root = b
            .add_op(Op::DynamicSlice { sizes: vec![3] }, s32_shape(&[3]))
            .inputs(&[x, s])
            .finish();
        let result = run(&single(b, root), &[]).unwrap();
        let first = start.clamp(0, 5);
        prop_assert_eq!(result.to_vec::<i32>().unwrap(), vec![first, first + 1, first + 2]);
    }
}
