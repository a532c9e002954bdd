mod test_elementwise;
mod test_movement;

use std::fmt::Debug;

use rand::{thread_rng, Rng};

use crate::prelude::*;

// Integration and other tests

#[test]
fn test_add_constants() {
    let mut b = ComputationBuilder::new("add");
    let x = b.constant(Literal::vec1(&[1i32, 2, 3]));
    let y = b.constant(Literal::vec1(&[10i32, 20, 30]));
    let root = b.binary(BinaryOp::Add, x, y);
    let module = single(b, root);

    let result = run(&module, &[]).unwrap();
    assert_exact(&result.to_vec::<i32>().unwrap(), &[11, 22, 33]);
    assert!(equal(&result, &Literal::vec1(&[11i32, 22, 33])).is_ok());
}

#[test]
fn test_parameters_follow_declared_layout() {
    let col_major = Shape::array(PrimitiveType::F32, [2, 3]).with_layout([0, 1]);
    let mut b = ComputationBuilder::new("negate");
    let x = b.parameter(0, col_major.clone());
    let root = b
        .add_op(Op::Unary(UnaryOp::Negate), col_major.clone())
        .input(x)
        .finish();
    let module = single(b, root);

    let arg = Literal::matrix(&[[1f32, 2., 3.], [4., 5., 6.]]);
    let result = run(&module, &[arg]).unwrap();
    assert!(result.shape().layouts_equal(&col_major));
    assert_exact(
        &result.to_vec::<f32>().unwrap(),
        &[-1., -2., -3., -4., -5., -6.],
    );
    // Physical order is column major.
    assert_exact(result.data::<f32>().unwrap(), &[-1., -4., -2., -5., -3., -6.]);
}

#[test]
fn test_evaluator_is_reusable() {
    let shape = Shape::array(PrimitiveType::F32, [4]);
    let mut b = ComputationBuilder::new("square");
    let x = b.parameter(0, shape);
    let root = b.binary(BinaryOp::Multiply, x, x);
    let module = single(b, root);

    let mut evaluator = Evaluator::default();
    for _ in 0..3 {
        let input = random_vec(4);
        let result = evaluator
            .evaluate_module(&module, &[Literal::vec1(&input)])
            .unwrap();
        let expected = input.iter().map(|v| v * v).collect::<Vec<_>>();
        assert_close(&result.to_vec::<f32>().unwrap(), &expected);
    }
}

#[test]
fn test_debug_evaluation_matches() {
    let shape = Shape::array(PrimitiveType::F32, [2, 2]);
    let mut b = ComputationBuilder::new("debug");
    let x = b.parameter(0, shape.clone());
    let e = b.unary(UnaryOp::Exp, x);
    let root = b.binary(BinaryOp::Subtract, e, x);
    let module = single(b, root);
    let entry = module.entry().unwrap();

    let arg = Literal::matrix(&[[0.5f32, -1.], [2., 0.]]);
    let mut evaluator = Evaluator::default();
    let plain = evaluator.evaluate(&module, entry, &[&arg]).unwrap();
    let debug = evaluator.evaluate_debug(&module, entry, &[&arg]).unwrap();
    assert!(equal(&plain, &debug).is_ok());
}

#[test]
fn test_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
    let mut b = ComputationBuilder::new("logged");
    let x = b.constant(Literal::vec1(&[1.5f32, 2.5]));
    let root = b.unary(UnaryOp::Floor, x);
    let module = single(b, root);
    assert_exact(&run(&module, &[]).unwrap().to_vec::<f32>().unwrap(), &[1., 2.]);
}

/// Wrap a builder into a module with it as the entry computation.
pub fn single(builder: ComputationBuilder, root: NodeIndex) -> HloModule {
    let mut module = HloModule::new("test");
    module.add_entry_computation(builder.build(root).unwrap());
    module
}

/// Evaluate a module's entry computation with a default evaluator.
pub fn run(module: &HloModule, args: &[Literal]) -> Result<Literal> {
    Evaluator::default().evaluate_module(module, args)
}

/// `op(p0, p1)` over two scalars of `ty`.
pub fn scalar_binary(name: &str, op: BinaryOp, ty: PrimitiveType) -> Computation {
    let mut b = ComputationBuilder::new(name);
    let p0 = b.parameter(0, Shape::scalar(ty));
    let p1 = b.parameter(1, Shape::scalar(ty));
    let root = b.binary(op, p0, p1);
    b.build(root).unwrap()
}

/// `direction(p0, p1)` over two scalars of `ty`.
pub fn scalar_compare(
    name: &str,
    direction: ComparisonDirection,
    ty: PrimitiveType,
) -> Computation {
    let mut b = ComputationBuilder::new(name);
    let p0 = b.parameter(0, Shape::scalar(ty));
    let p1 = b.parameter(1, Shape::scalar(ty));
    let root = b.compare(direction, p0, p1);
    b.build(root).unwrap()
}

/// Ensure two arrays are nearly equal
pub fn assert_close(a_vec: &[f32], b_vec: &[f32]) {
    assert_eq!(a_vec.len(), b_vec.len(), "Number of elements doesn't match");
    for (a, b) in a_vec.iter().zip(b_vec.iter()) {
        if (a - b).abs() > 1e-3 {
            panic!(
                "{a} is not close to {b}, avg distance: {}",
                a_vec
                    .iter()
                    .zip(b_vec.iter())
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f32>()
                    / a_vec.len() as f32
            );
        }
    }
}

/// Ensure two arrays are exactly equal
pub fn assert_exact<T: PartialEq + Debug>(a_vec: &[T], b_vec: &[T]) {
    assert_eq!(a_vec.len(), b_vec.len(), "Number of elements doesn't match");
    for (a, b) in a_vec.iter().zip(b_vec.iter()) {
        if a != b {
            panic!("{a:?} is not equal to {b:?}");
        }
    }
}

pub fn random_vec(n: usize) -> Vec<f32> {
    let mut rng = thread_rng();
    (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect()
}
