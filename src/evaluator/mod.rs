//! The evaluation engine.
//!
//! An [`Evaluator`] walks a computation's schedule once, caching each
//! instruction's result by node. Subcomputations (call, map, reduce, while,
//! conditional, ...) run in fresh nested evaluators that share the parent's
//! config and visitor table but never its cache.

mod config;
mod handlers;
pub(crate) mod typed;

use std::{borrow::Borrow, io::Write, time::Duration};

use colored::Colorize;
use itertools::Itertools;
use rustc_hash::FxHashMap;
use strum::IntoEnumIterator;
use tracing::{debug, info_span, trace};

pub use config::EvaluatorConfig;
pub use typed::{
    kernels::{reduce_precision, safe_less},
    ElementVisitor, TypedVisitor, UnsupportedVisitor,
};

use crate::{
    error::{EvalError, Result},
    graph::{Computation, ComputationBuilder, ComputationId, HloModule, NodeIndex},
    literal::Literal,
    op::{BinaryOp, DotDimensionNumbers, Instruction, Op, UnaryOp},
    shape::Shape,
    types::PrimitiveType,
};

#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    visitors: FxHashMap<PrimitiveType, Box<dyn TypedVisitor>>,
    evaluated: FxHashMap<NodeIndex, Literal>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

/// Everything a handler sees while evaluating one instruction.
pub struct Visit<'a> {
    evaluator: &'a Evaluator,
    pub(crate) module: &'a HloModule,
    pub(crate) instruction: &'a Instruction,
    pub(crate) operands: Vec<&'a Literal>,
}

impl<'a> Visit<'a> {
    /// Declared result shape.
    pub fn shape(&self) -> &'a Shape {
        &self.instruction.shape
    }

    pub fn instruction(&self) -> &'a Instruction {
        self.instruction
    }

    pub fn operands(&self) -> &[&'a Literal] {
        &self.operands
    }

    pub fn operand(&self, i: usize) -> Result<&'a Literal> {
        self.operands.get(i).copied().ok_or_else(|| {
            EvalError::InvalidArgument(format!(
                "{} ({}) has {} operands, expected at least {}",
                self.instruction.name,
                self.instruction.op.name(),
                self.operands.len(),
                i + 1
            ))
        })
    }

    pub fn config(&self) -> &'a EvaluatorConfig {
        &self.evaluator.config
    }

    pub fn subcomputation(&self, id: ComputationId) -> Result<&'a Computation> {
        self.module.computation(id)
    }

    /// A fresh evaluator for running subcomputations of this instruction.
    pub fn nested(&self) -> Evaluator {
        trace!(instruction = %self.instruction.name, "spinning up nested evaluator");
        self.evaluator.nested()
    }

    pub fn typed(&self, ty: PrimitiveType) -> Result<&'a dyn TypedVisitor> {
        self.evaluator
            .visitors
            .get(&ty)
            .map(|v| v.as_ref())
            .ok_or_else(|| EvalError::unhandled_type(ty))
    }
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let mut visitors = FxHashMap::default();
        for ty in PrimitiveType::iter() {
            let visitor = if config.unsupported_types.contains(&ty) {
                Some(Box::new(UnsupportedVisitor(ty)) as Box<dyn TypedVisitor>)
            } else {
                typed::visitor_for(ty)
            };
            if let Some(visitor) = visitor {
                visitors.insert(ty, visitor);
            }
        }
        Self {
            config,
            visitors,
            evaluated: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn nested(&self) -> Self {
        Self {
            config: self.config.clone(),
            visitors: self.visitors.clone(),
            evaluated: FxHashMap::default(),
        }
    }

    /// Evaluate the module's entry computation.
    pub fn evaluate_module<L: Borrow<Literal>>(
        &mut self,
        module: &HloModule,
        args: &[L],
    ) -> Result<Literal> {
        self.evaluate(module, module.entry()?, args)
    }

    /// Evaluate `computation` with `args` bound to its parameters in order.
    pub fn evaluate<L: Borrow<Literal>>(
        &mut self,
        module: &HloModule,
        computation: ComputationId,
        args: &[L],
    ) -> Result<Literal> {
        let computation = module.computation(computation)?;
        let _span = info_span!("evaluate", computation = %computation.name).entered();
        self.evaluated.clear();
        self.bind_arguments(computation, args)?;
        for (node, operands) in computation.schedule() {
            if !self.evaluated.contains_key(node) {
                self.visit_node(module, computation, *node, operands)?;
            }
        }
        self.take_result(computation, computation.root())
    }

    fn bind_arguments<L: Borrow<Literal>>(
        &mut self,
        computation: &Computation,
        args: &[L],
    ) -> Result<()> {
        if args.len() != computation.num_parameters() {
            return Err(EvalError::InvalidArgument(format!(
                "computation {} expects {} arguments, got {}",
                computation.name,
                computation.num_parameters(),
                args.len()
            )));
        }
        for (node, arg) in computation.parameters().iter().zip(args) {
            self.bind_parameter(computation, *node, arg.borrow())?;
        }
        Ok(())
    }

    fn bind_parameter(
        &mut self,
        computation: &Computation,
        node: NodeIndex,
        arg: &Literal,
    ) -> Result<()> {
        let parameter = computation.instruction(node)?;
        if !arg.shape().compatible(&parameter.shape) {
            return Err(EvalError::InvalidArgument(format!(
                "argument for {} has shape {}, expected {}",
                parameter.name,
                arg.shape(),
                parameter.shape
            )));
        }
        self.evaluated.insert(node, arg.relayout(&parameter.shape)?);
        Ok(())
    }

    fn take_result(&mut self, computation: &Computation, node: NodeIndex) -> Result<Literal> {
        self.evaluated.remove(&node).ok_or_else(|| {
            EvalError::Internal(format!(
                "no value was produced for node {} of {}",
                node.index(),
                computation.name
            ))
        })
    }

    fn preprocess(&self, instruction: &Instruction) -> Result<()> {
        debug!(
            instruction = %instruction.name,
            op = instruction.op.name(),
            shape = %instruction.shape,
            "about to visit"
        );
        instruction.shape.validate()
    }

    fn postprocess(&self, instruction: &Instruction, result: Literal) -> Result<Literal> {
        if !result.shape().compatible(&instruction.shape) {
            return Err(EvalError::InvalidArgument(format!(
                "{} ({}) produced {} but declares {}",
                instruction.name,
                instruction.op.name(),
                result.shape(),
                instruction.shape
            )));
        }
        let result = if result.shape().layouts_equal(&instruction.shape) {
            result
        } else {
            result.relayout(&instruction.shape)?
        };
        debug!(
            instruction = %instruction.name,
            shape = %result.shape().human_string_with_layout(),
            "finished visiting"
        );
        Ok(result)
    }

    /// Run one instruction whose operands are all cached. The result is only
    /// cached if every step succeeds.
    fn visit_node(
        &mut self,
        module: &HloModule,
        computation: &Computation,
        node: NodeIndex,
        operands: &[NodeIndex],
    ) -> Result<()> {
        let instruction = computation.instruction(node)?;
        self.preprocess(instruction)?;
        let result = {
            let operands = operands
                .iter()
                .map(|o| {
                    self.evaluated.get(o).ok_or_else(|| {
                        EvalError::Internal(format!(
                            "operand {} of {} has not been evaluated",
                            o.index(),
                            instruction.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let visit = Visit {
                evaluator: self,
                module,
                instruction,
                operands,
            };
            handlers::dispatch(&visit)?
        };
        let result = self.postprocess(instruction, result)?;
        self.evaluated.insert(node, result);
        Ok(())
    }

    /// Evaluate one instruction whose operands are all constants.
    pub fn evaluate_instruction(
        &mut self,
        module: &HloModule,
        computation: ComputationId,
        node: NodeIndex,
    ) -> Result<Literal> {
        let computation = module.computation(computation)?;
        let instruction = computation.instruction(node)?;
        if instruction.is_parameter() {
            return Err(EvalError::FailedPrecondition(
                "Cannot evaluate a parameter.".to_string(),
            ));
        }
        let operands = computation.operands(node);
        if !operands
            .iter()
            .all(|o| computation.graph()[*o].is_constant())
        {
            return Err(EvalError::FailedPrecondition(
                "Not all operands are constants.".to_string(),
            ));
        }
        self.evaluated.clear();
        for operand in &operands {
            if !self.evaluated.contains_key(operand) {
                self.visit_node(module, computation, *operand, &[])?;
            }
        }
        self.visit_node(module, computation, node, &operands)?;
        self.take_result(computation, node)
    }

    /// Evaluate one instruction whose operands are parameters (bound from
    /// `args` by parameter number) or constants.
    pub fn evaluate_instruction_with_args<L: Borrow<Literal>>(
        &mut self,
        module: &HloModule,
        computation: ComputationId,
        node: NodeIndex,
        args: &[L],
    ) -> Result<Literal> {
        let computation = module.computation(computation)?;
        let operands = computation.operands(node);
        self.evaluated.clear();
        for operand in &operands {
            if self.evaluated.contains_key(operand) {
                continue;
            }
            match &computation.instruction(*operand)?.op {
                Op::Parameter(number) => {
                    let arg = args.get(*number).ok_or_else(|| {
                        EvalError::InvalidArgument(format!(
                            "no argument for parameter {number}, got {} arguments",
                            args.len()
                        ))
                    })?;
                    self.bind_parameter(computation, *operand, arg.borrow())?;
                }
                Op::Constant(_) => self.visit_node(module, computation, *operand, &[])?,
                _ => {
                    return Err(EvalError::FailedPrecondition(
                        "Not all operands are parameters or constants.".to_string(),
                    ))
                }
            }
        }
        self.visit_node(module, computation, node, &operands)?;
        self.take_result(computation, node)
    }

    /// Like [`Evaluator::evaluate_instruction`], logging and discarding errors.
    pub fn try_evaluate(
        &mut self,
        module: &HloModule,
        computation: ComputationId,
        node: NodeIndex,
    ) -> Option<Literal> {
        match self.evaluate_instruction(module, computation, node) {
            Ok(literal) => Some(literal),
            Err(error) => {
                debug!(%error, "try_evaluate failed");
                None
            }
        }
    }

    /// Evaluate one instruction with some operands replaced by literals. The
    /// remaining operands must be constants.
    pub fn evaluate_with_substitutions(
        &mut self,
        module: &HloModule,
        computation: ComputationId,
        node: NodeIndex,
        substitutions: &FxHashMap<NodeIndex, Literal>,
    ) -> Result<Literal> {
        let computation = module.computation(computation)?;
        if computation.instruction(node)?.is_parameter() {
            return Err(EvalError::FailedPrecondition(
                "Cannot evaluate a parameter.".to_string(),
            ));
        }
        let operands = computation.operands(node);
        self.evaluated.clear();
        for operand in &operands {
            if self.evaluated.contains_key(operand) {
                continue;
            }
            if let Some(literal) = substitutions.get(operand) {
                let replaced = computation.instruction(*operand)?;
                if !literal.shape().compatible(&replaced.shape) {
                    return Err(EvalError::InvalidArgument(format!(
                        "substitution for {} has shape {}, expected {}",
                        replaced.name,
                        literal.shape(),
                        replaced.shape
                    )));
                }
                self.evaluated.insert(*operand, literal.clone());
            } else if computation.instruction(*operand)?.is_constant() {
                self.visit_node(module, computation, *operand, &[])?;
            } else {
                return Err(EvalError::FailedPrecondition(
                    "Not all operands are constants.".to_string(),
                ));
            }
        }
        self.visit_node(module, computation, node, &operands)?;
        self.take_result(computation, node)
    }

    /// Wrap `op` over constants in a throwaway module and evaluate it.
    fn evaluate_detached(
        &mut self,
        build: impl FnOnce(&mut ComputationBuilder) -> Result<NodeIndex>,
    ) -> Result<Literal> {
        let mut builder = ComputationBuilder::new("detached");
        let root = build(&mut builder)?;
        let mut module = HloModule::new("detached");
        let id = module.add_entry_computation(builder.build(root)?);
        self.evaluate_instruction(&module, id, root)
    }

    pub fn evaluate_elementwise_binary_op(
        &mut self,
        op: BinaryOp,
        lhs: &Literal,
        rhs: &Literal,
    ) -> Result<Literal> {
        self.evaluate_detached(|b| {
            let (l, r) = (b.constant(lhs.clone()), b.constant(rhs.clone()));
            Ok(b.binary(op, l, r))
        })
    }

    pub fn evaluate_elementwise_unary_op(
        &mut self,
        op: UnaryOp,
        operand: &Literal,
    ) -> Result<Literal> {
        self.evaluate_detached(|b| {
            let x = b.constant(operand.clone());
            Ok(b.unary(op, x))
        })
    }

    /// Dot of two literals; the result shape is batch dimensions, then the
    /// free lhs dimensions, then the free rhs dimensions.
    pub fn evaluate_dot_op(
        &mut self,
        dimension_numbers: &DotDimensionNumbers,
        lhs: &Literal,
        rhs: &Literal,
    ) -> Result<Literal> {
        let shape = infer_dot_shape(lhs.shape(), rhs.shape(), dimension_numbers)?;
        self.evaluate_detached(|b| {
            let (l, r) = (b.constant(lhs.clone()), b.constant(rhs.clone()));
            Ok(b.add_op(Op::Dot(dimension_numbers.clone()), shape)
                .inputs(&[l, r])
                .finish())
        })
    }

    /// [`Evaluator::evaluate`], printing every instruction with its operand
    /// shapes and run time, then the total time spent per op.
    pub fn evaluate_debug<L: Borrow<Literal>>(
        &mut self,
        module: &HloModule,
        computation: ComputationId,
        args: &[L],
    ) -> Result<Literal> {
        let computation = module.computation(computation)?;
        let width = term_size::dimensions().map(|(w, _)| w).unwrap_or(80);
        let mut op_times: FxHashMap<&'static str, Duration> = FxHashMap::default();
        self.evaluated.clear();
        self.bind_arguments(computation, args)?;

        println!(
            "{:->2$} Evaluating {:->2$}",
            "",
            "",
            width.saturating_sub(" Evaluating ".len()) / 2
        );
        for (node, operands) in computation.schedule() {
            if self.evaluated.contains_key(node) {
                continue;
            }
            let instruction = computation.instruction(*node)?;
            let op_name = instruction.op.name();
            print!("{}", op_name.bold().bright_green());
            let mut shapes_string = operands
                .iter()
                .filter_map(|o| self.evaluated.get(o))
                .map(|l| l.shape().to_string())
                .join(", ");
            if !shapes_string.is_empty() {
                shapes_string = format!(" ({shapes_string})");
            }
            print!("{shapes_string}");
            let _ = std::io::stdout().flush();

            let now = std::time::Instant::now();
            self.visit_node(module, computation, *node, operands)?;
            let elapsed = now.elapsed();
            println!(
                "{:.>1$}",
                format_duration(elapsed).bold(),
                width
                    .saturating_sub(op_name.len())
                    .saturating_sub(shapes_string.len()),
            );
            *op_times.entry(op_name).or_default() += elapsed;
        }

        println!();
        println!(
            "{:->2$} Total Times {:->2$}",
            "",
            "",
            width.saturating_sub(" Total Times ".len()) / 2
        );
        for (name, elapsed) in op_times.into_iter().sorted_by(|(_, a), (_, b)| b.cmp(a)) {
            print!("{}", name.bold().bright_green());
            println!(
                "{:.>1$}",
                format_duration(elapsed).bold(),
                width.saturating_sub(name.len()),
            );
        }
        self.take_result(computation, computation.root())
    }
}

fn format_duration(elapsed: Duration) -> String {
    if elapsed.as_secs() > 0 {
        format!("{:.2}s", elapsed.as_secs_f32())
    } else if elapsed.as_millis() > 0 {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{}µs", elapsed.as_micros())
    }
}

pub fn infer_dot_shape(lhs: &Shape, rhs: &Shape, dnums: &DotDimensionNumbers) -> Result<Shape> {
    dnums.validate(lhs.rank(), rhs.rank())?;
    let contracted_mismatch = dnums
        .lhs_contracting_dimensions
        .iter()
        .zip(&dnums.rhs_contracting_dimensions)
        .chain(dnums.lhs_batch_dimensions.iter().zip(&dnums.rhs_batch_dimensions))
        .any(|(l, r)| lhs.dimension(*l) != rhs.dimension(*r));
    if contracted_mismatch || lhs.element_type() != rhs.element_type() {
        return Err(EvalError::InvalidArgument(format!(
            "cannot infer the shape of dot({lhs}, {rhs}) with {dnums:?}"
        )));
    }
    let free = |shape: &Shape, contracting: &[usize], batch: &[usize]| {
        (0..shape.rank())
            .filter(|d| !contracting.contains(d) && !batch.contains(d))
            .map(|d| shape.dimension(d))
            .collect_vec()
    };
    let dimensions = dnums
        .lhs_batch_dimensions
        .iter()
        .map(|d| lhs.dimension(*d))
        .chain(free(lhs, &dnums.lhs_contracting_dimensions, &dnums.lhs_batch_dimensions))
        .chain(free(rhs, &dnums.rhs_contracting_dimensions, &dnums.rhs_batch_dimensions))
        .collect_vec();
    Ok(Shape::array(lhs.element_type(), dimensions))
}
