use half::f16;
use num::complex::Complex32;
use proptest::prelude::*;

use super::{assert_close, assert_exact, random_vec, run, single};
use crate::prelude::*;

fn binary(op: BinaryOp, lhs: Literal, rhs: Literal) -> Result<Literal> {
    Evaluator::default().evaluate_elementwise_binary_op(op, &lhs, &rhs)
}

fn unary(op: UnaryOp, operand: Literal) -> Result<Literal> {
    Evaluator::default().evaluate_elementwise_unary_op(op, &operand)
}

/// Dimensions of rank 0 to 4 with two matching f32 buffers.
fn operands() -> impl Strategy<Value = (Vec<usize>, Vec<f32>, Vec<f32>)> {
    prop::collection::vec(1usize..=3, 0..=4).prop_flat_map(|dims| {
        let n = dims.iter().product::<usize>();
        (
            Just(dims),
            prop::collection::vec(-100f32..100., n),
            prop::collection::vec(-100f32..100., n),
        )
    })
}

proptest! {
    #[test]
    fn prop_binary_matches_scalar_op((dims, l, r) in operands()) {
        let cases: [(BinaryOp, fn(f32, f32) -> f32); 5] = [
            (BinaryOp::Add, |a, b| a + b),
            (BinaryOp::Subtract, |a, b| a - b),
            (BinaryOp::Multiply, |a, b| a * b),
            (BinaryOp::Maximum, |a, b| if a >= b { a } else { b }),
            (BinaryOp::Minimum, |a, b| if a <= b { a } else { b }),
        ];
        for (op, f) in cases {
            let lhs = Literal::from_vec(&dims, l.clone()).unwrap();
            let rhs = Literal::from_vec(&dims, r.clone()).unwrap();
            let result = binary(op, lhs, rhs).unwrap();
            prop_assert_eq!(result.dimensions(), dims.as_slice());
            let expected = l.iter().zip(&r).map(|(a, b)| f(*a, *b)).collect::<Vec<_>>();
            prop_assert_eq!(result.to_vec::<f32>().unwrap(), expected);
        }
    }

    #[test]
    fn prop_unary_matches_scalar_op((dims, x, _) in operands()) {
        let cases: [(UnaryOp, fn(f32) -> f32); 4] = [
            (UnaryOp::Negate, |a| -a),
            (UnaryOp::Abs, |a| a.abs()),
            (UnaryOp::Floor, |a| a.floor()),
            (UnaryOp::Tanh, |a| a.tanh()),
        ];
        for (op, f) in cases {
            let result = unary(op, Literal::from_vec(&dims, x.clone()).unwrap()).unwrap();
            let expected = x.iter().map(|a| f(*a)).collect::<Vec<_>>();
            prop_assert_eq!(result.to_vec::<f32>().unwrap(), expected);
        }
    }
}

#[test]
fn test_integer_division_by_zero() {
    let lhs = Literal::vec1(&[7i32, -7, i32::MIN, 5, i32::MIN]);
    let rhs = Literal::vec1(&[0i32, 0, -1, 2, 0]);
    let quotient = binary(BinaryOp::Divide, lhs.clone(), rhs.clone()).unwrap();
    assert_exact(&quotient.to_vec::<i32>().unwrap(), &[-1, -1, i32::MIN, 2, -1]);
    let remainder = binary(BinaryOp::Remainder, lhs, rhs).unwrap();
    assert_exact(&remainder.to_vec::<i32>().unwrap(), &[7, -7, 0, 1, i32::MIN]);

    let quotient =
        binary(BinaryOp::Divide, Literal::vec1(&[7u8, 0]), Literal::vec1(&[0u8, 0])).unwrap();
    assert_exact(&quotient.to_vec::<u8>().unwrap(), &[255, 255]);
    let quotient =
        binary(BinaryOp::Divide, Literal::vec1(&[9u64]), Literal::vec1(&[0u64])).unwrap();
    assert_exact(&quotient.to_vec::<u64>().unwrap(), &[u64::MAX]);
}

#[test]
fn test_integer_arithmetic_wraps() {
    let sum = binary(BinaryOp::Add, Literal::scalar(127i8), Literal::scalar(1i8)).unwrap();
    assert_eq!(sum.get_first::<i8>().unwrap(), -128);
    let product =
        binary(BinaryOp::Multiply, Literal::scalar(u32::MAX), Literal::scalar(2u32)).unwrap();
    assert_eq!(product.get_first::<u32>().unwrap(), u32::MAX - 1);
    let negated = unary(UnaryOp::Negate, Literal::scalar(i64::MIN)).unwrap();
    assert_eq!(negated.get_first::<i64>().unwrap(), i64::MIN);
}

#[test]
fn test_half_precision_computes_in_f32() {
    let values = [0.5f32, 1.25, -3.0];
    let x = Literal::vec1(&values.map(f16::from_f32));
    let result = binary(BinaryOp::Multiply, x.clone(), x).unwrap();
    assert_eq!(result.element_type(), PrimitiveType::F16);
    let squares = result
        .to_vec::<f16>()
        .unwrap()
        .into_iter()
        .map(f16::to_f32)
        .collect::<Vec<_>>();
    assert_close(&squares, &[0.25, 1.5625, 9.0]);
}

#[test]
fn test_sixteen_bit_integers_are_unsupported_by_default() {
    let x = Literal::vec1(&[1i16, 2]);
    let err = binary(BinaryOp::Add, x.clone(), x.clone()).unwrap_err();
    assert!(err.is_unimplemented());
    assert_eq!(err.message(), "unhandled primitive type: s16");

    let mut evaluator = Evaluator::new(EvaluatorConfig::default().with_unsupported_types(vec![]));
    let sum = evaluator
        .evaluate_elementwise_binary_op(BinaryOp::Add, &x, &x)
        .unwrap();
    assert_exact(&sum.to_vec::<i16>().unwrap(), &[2, 4]);
}

#[test]
fn test_missing_kernel_is_unimplemented() {
    let err = unary(UnaryOp::Sin, Literal::vec1(&[true, false])).unwrap_err();
    assert!(err.is_unimplemented());
    let err = binary(BinaryOp::Atan2, Literal::scalar(1i32), Literal::scalar(2i32)).unwrap_err();
    assert!(err.is_unimplemented());
}

#[test]
fn test_implicit_broadcast_is_rejected() {
    let err = binary(
        BinaryOp::Add,
        Literal::vec1(&[1f32, 2.]),
        Literal::vec1(&[1f32, 2., 3.]),
    )
    .unwrap_err();
    assert!(err.is_unimplemented());
    assert!(err.message().starts_with("Implicit broadcasting is currently unsupported"));
}

#[test]
fn test_compare_and_select() {
    let shape = Shape::array(PrimitiveType::F32, [3]);
    let mut b = ComputationBuilder::new("select");
    let x = b.constant(Literal::vec1(&[1f32, 5., 3.]));
    let y = b.constant(Literal::vec1(&[2f32, 2., 3.]));
    let lt = b.compare(ComparisonDirection::Lt, x, y);
    let root = b.add_op(Op::Select, shape).inputs(&[lt, x, y]).finish();
    let module = single(b, root);
    assert_exact(&run(&module, &[]).unwrap().to_vec::<f32>().unwrap(), &[1., 2., 3.]);

    let mut b = ComputationBuilder::new("ge");
    let x = b.constant(Literal::vec1(&[1u8, 5, 3]));
    let y = b.constant(Literal::vec1(&[2u8, 2, 3]));
    let root = b.compare(ComparisonDirection::Ge, x, y);
    let module = single(b, root);
    assert_exact(
        &run(&module, &[]).unwrap().to_vec::<bool>().unwrap(),
        &[false, true, true],
    );
}

#[test]
fn test_complex_compare_only_equality() {
    let a = Literal::vec1(&[Complex32::new(1., 2.), Complex32::new(0., 0.)]);
    let b_lit = Literal::vec1(&[Complex32::new(1., 2.), Complex32::new(0., 1.)]);
    for (direction, expected) in [
        (ComparisonDirection::Eq, Some([true, false])),
        (ComparisonDirection::Ne, Some([false, true])),
        (ComparisonDirection::Lt, None),
    ] {
        let mut b = ComputationBuilder::new("complex");
        let x = b.constant(a.clone());
        let y = b.constant(b_lit.clone());
        let root = b.compare(direction, x, y);
        let result = run(&single(b, root), &[]);
        match expected {
            Some(expected) => assert_exact(&result.unwrap().to_vec::<bool>().unwrap(), &expected),
            None => assert!(result.unwrap_err().is_unimplemented()),
        }
    }
}

#[test]
fn test_compare_type_mismatch() {
    let mut b = ComputationBuilder::new("mismatch");
    let x = b.constant(Literal::vec1(&[1f32]));
    let y = b.constant(Literal::vec1(&[1i32]));
    let root = b.compare(ComparisonDirection::Eq, x, y);
    assert!(run(&single(b, root), &[]).unwrap_err().is_invalid_argument());
}

#[test]
fn test_clamp_with_scalar_bounds() {
    let shape = Shape::array(PrimitiveType::F32, [4]);
    let mut b = ComputationBuilder::new("clamp");
    let low = b.constant(Literal::scalar(0f32));
    let x = b.constant(Literal::vec1(&[-1f32, 0.5, 2., 1.]));
    let high = b.constant(Literal::scalar(1f32));
    let root = b.add_op(Op::Clamp, shape).inputs(&[low, x, high]).finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<f32>().unwrap(),
        &[0., 0.5, 1., 1.],
    );
}

#[test]
fn test_convert_and_bitcast() {
    let mut b = ComputationBuilder::new("convert");
    let x = b.constant(Literal::vec1(&[1.7f32, -2.7, 1.0]));
    let root = b
        .add_op(Op::Convert, Shape::array(PrimitiveType::S32, [3]))
        .input(x)
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<i32>().unwrap(),
        &[1, -2, 1],
    );

    let mut b = ComputationBuilder::new("bitcast");
    let x = b.constant(Literal::vec1(&[1.0f32, -0.0]));
    let root = b
        .add_op(Op::BitcastConvert, Shape::array(PrimitiveType::U32, [2]))
        .input(x)
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<u32>().unwrap(),
        &[0x3f80_0000, 0x8000_0000],
    );
}

#[test]
fn test_is_finite() {
    let result = unary(UnaryOp::IsFinite, Literal::vec1(&[1f32, f32::INFINITY, f32::NAN])).unwrap();
    assert_exact(&result.to_vec::<bool>().unwrap(), &[true, false, false]);
    let result = unary(UnaryOp::IsFinite, Literal::vec1(&[f64::NEG_INFINITY])).unwrap();
    assert_exact(&result.to_vec::<bool>().unwrap(), &[false]);

    let err = unary(UnaryOp::IsFinite, Literal::vec1(&[f16::ONE])).unwrap_err();
    assert!(err.is_unimplemented());
    let err = unary(UnaryOp::IsFinite, Literal::vec1(&[1i32])).unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn test_complex_components() {
    let z = Literal::vec1(&[Complex32::new(3., 4.), Complex32::new(-1., 0.5)]);
    let real = unary(UnaryOp::Real, z.clone()).unwrap();
    assert_exact(&real.to_vec::<f32>().unwrap(), &[3., -1.]);
    let imag = unary(UnaryOp::Imag, z.clone()).unwrap();
    assert_exact(&imag.to_vec::<f32>().unwrap(), &[4., 0.5]);
    let abs = unary(UnaryOp::Abs, z).unwrap();
    assert_close(&abs.to_vec::<f32>().unwrap(), &[5., 1.118034]);

    let imag = unary(UnaryOp::Imag, Literal::vec1(&[2f32])).unwrap();
    assert_exact(&imag.to_vec::<f32>().unwrap(), &[0.]);
}

#[test]
fn test_reduce_precision_op() {
    let shape = Shape::array(PrimitiveType::F32, [2]);
    let mut b = ComputationBuilder::new("bf16ish");
    let x = b.constant(Literal::vec1(&[1.0 + 2f32.powi(-10), 3.0e38]));
    let root = b
        .add_op(
            Op::ReducePrecision {
                exponent_bits: 5,
                mantissa_bits: 7,
            },
            shape,
        )
        .input(x)
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<f32>().unwrap(),
        &[1.0, f32::INFINITY],
    );

    let mut b = ComputationBuilder::new("double");
    let x = b.constant(Literal::vec1(&[1.0f64]));
    let root = b
        .add_op(
            Op::ReducePrecision {
                exponent_bits: 8,
                mantissa_bits: 7,
            },
            Shape::array(PrimitiveType::F64, [1]),
        )
        .input(x)
        .finish();
    let err = run(&single(b, root), &[]).unwrap_err();
    assert!(err.is_unimplemented());
    assert_eq!(err.message(), "Double not supported for reduce precision");
}

#[test]
fn test_iota() {
    let mut b = ComputationBuilder::new("iota");
    let root = b
        .add_op(Op::Iota { dimension: 1 }, Shape::array(PrimitiveType::F32, [2, 3]))
        .finish();
    assert_exact(
        &run(&single(b, root), &[]).unwrap().to_vec::<f32>().unwrap(),
        &[0., 1., 2., 0., 1., 2.],
    );
}

#[test]
fn test_random_transcendentals() {
    let x = random_vec(16);
    let exp = unary(UnaryOp::Exp, Literal::vec1(&x)).unwrap();
    let expected = x.iter().map(|v| v.exp()).collect::<Vec<_>>();
    assert_close(&exp.to_vec::<f32>().unwrap(), &expected);
    let shifted = x.iter().map(|v| v + 1.0).collect::<Vec<_>>();
    let log = unary(UnaryOp::Log, Literal::vec1(&shifted)).unwrap();
    let expected = shifted.iter().map(|v| v.ln()).collect::<Vec<_>>();
    assert_close(&log.to_vec::<f32>().unwrap(), &expected);
}
