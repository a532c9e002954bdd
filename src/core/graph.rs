use std::fmt;

use colored::Colorize;
use itertools::Itertools;
use petgraph::{stable_graph::StableGraph, visit::EdgeRef, Direction};
use rustc_hash::FxHashSet;

pub use petgraph::stable_graph::NodeIndex;

use crate::{
    error::{EvalError, Result},
    literal::Literal,
    op::{BinaryOp, ComparisonDirection, Instruction, Op, UnaryOp},
    shape::Shape,
    types::PrimitiveType,
};

/// Operand edge, pointing from the operand to its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandEdge {
    pub input_order: u32,
}

pub type InstructionGraph = StableGraph<Instruction, OperandEdge>;

/// Index of a computation inside its [`HloModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(pub usize);

/// A named dataflow graph with one root. Immutable once built.
#[derive(Debug, Clone)]
pub struct Computation {
    pub name: String,
    graph: InstructionGraph,
    root: NodeIndex,
    parameters: Vec<NodeIndex>,
    /// Nodes reachable from the root in dependency order, each with its
    /// operands sorted by input order.
    schedule: Vec<(NodeIndex, Vec<NodeIndex>)>,
}

impl Computation {
    pub fn graph(&self) -> &InstructionGraph {
        &self.graph
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn root_instruction(&self) -> &Instruction {
        &self.graph[self.root]
    }

    pub fn schedule(&self) -> &[(NodeIndex, Vec<NodeIndex>)] {
        &self.schedule
    }

    pub fn instruction(&self, node: NodeIndex) -> Result<&Instruction> {
        self.graph.node_weight(node).ok_or_else(|| {
            EvalError::InvalidArgument(format!(
                "node {} is not part of computation {}",
                node.index(),
                self.name
            ))
        })
    }

    /// Operands of `node`, in input order.
    pub fn operands(&self, node: NodeIndex) -> Vec<NodeIndex> {
        operands_of(&self.graph, node)
    }

    pub fn parameter(&self, number: usize) -> Option<NodeIndex> {
        self.parameters.get(number).copied()
    }

    pub fn parameters(&self) -> &[NodeIndex] {
        &self.parameters
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_shapes(&self) -> Vec<&Shape> {
        self.parameters.iter().map(|p| &self.graph[*p].shape).collect()
    }

    /// True for `add(p0, p1)` over two distinct scalar parameters.
    pub fn is_scalar_add(&self) -> bool {
        let root = self.root_instruction();
        if root.op != Op::Binary(BinaryOp::Add) || self.num_parameters() != 2 {
            return false;
        }
        let operands = self.operands(self.root);
        operands.len() == 2
            && operands[0] != operands[1]
            && operands.iter().all(|o| {
                let instruction = &self.graph[*o];
                instruction.is_parameter() && instruction.shape.is_scalar()
            })
    }

    /// Print the computation with op names highlighted.
    pub fn pretty_print(&self) {
        println!("{}", self.name.bold());
        for (node, operands) in &self.schedule {
            let instruction = &self.graph[*node];
            println!(
                "  {} = {} {}({})",
                format!("%{}", instruction.name).bright_blue(),
                instruction.shape.human_string_with_layout(),
                instruction.op.name().bold().bright_green(),
                operands
                    .iter()
                    .map(|o| format!("%{}", self.graph[*o].name))
                    .join(", ")
            );
        }
    }
}

impl fmt::Display for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {{", self.name)?;
        for (node, operands) in &self.schedule {
            let instruction = &self.graph[*node];
            let marker = if *node == self.root { "ROOT " } else { "" };
            writeln!(
                f,
                "  {marker}%{} = {} {}({})",
                instruction.name,
                instruction.shape,
                instruction.op.name(),
                operands
                    .iter()
                    .map(|o| format!("%{}", self.graph[*o].name))
                    .join(", ")
            )?;
        }
        write!(f, "}}")
    }
}

fn operands_of(graph: &InstructionGraph, node: NodeIndex) -> Vec<NodeIndex> {
    graph
        .edges_directed(node, Direction::Incoming)
        .sorted_by_key(|e| e.weight().input_order)
        .map(|e| e.source())
        .collect()
}

/// Post-order DFS from the root: every node comes after all of its operands and
/// appears exactly once.
fn post_order(graph: &InstructionGraph, root: NodeIndex) -> Vec<(NodeIndex, Vec<NodeIndex>)> {
    let mut order = vec![];
    let mut visited = FxHashSet::default();
    let mut stack = vec![(root, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push((node, operands_of(graph, node)));
            continue;
        }
        if !visited.insert(node) {
            continue;
        }
        stack.push((node, true));
        for operand in operands_of(graph, node).into_iter().rev() {
            if !visited.contains(&operand) {
                stack.push((operand, false));
            }
        }
    }
    order
}

/// Incrementally builds a [`Computation`]. Operands must already exist when
/// they are attached, so the graph is acyclic by construction.
#[derive(Debug)]
pub struct ComputationBuilder {
    name: String,
    graph: InstructionGraph,
    parameters: Vec<Option<NodeIndex>>,
}

pub struct NewOp<'a> {
    id: NodeIndex,
    builder: &'a mut ComputationBuilder,
    num_srcs: u32,
}

impl<'a> NewOp<'a> {
    pub fn finish(self) -> NodeIndex {
        self.id
    }

    pub fn input(mut self, id: NodeIndex) -> Self {
        self.builder.graph.add_edge(
            id,
            self.id,
            OperandEdge {
                input_order: self.num_srcs,
            },
        );
        self.num_srcs += 1;
        self
    }

    pub fn inputs(self, ids: &[NodeIndex]) -> Self {
        ids.iter().fold(self, |op, id| op.input(*id))
    }
}

impl ComputationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: InstructionGraph::default(),
            parameters: vec![],
        }
    }

    /// Add an op with its declared result shape; attach operands with
    /// [`NewOp::input`].
    pub fn add_op(&mut self, op: Op, shape: Shape) -> NewOp {
        let name = format!("{}.{}", op.name(), self.graph.node_count());
        self.add_named_op(name, op, shape)
    }

    pub fn add_named_op(&mut self, name: impl Into<String>, op: Op, shape: Shape) -> NewOp {
        let param = match op {
            Op::Parameter(number) => Some(number),
            _ => None,
        };
        let id = self.graph.add_node(Instruction::new(name, op, shape));
        if let Some(number) = param {
            if self.parameters.len() <= number {
                self.parameters.resize(number + 1, None);
            }
            self.parameters[number] = Some(id);
        }
        NewOp {
            id,
            builder: self,
            num_srcs: 0,
        }
    }

    pub fn shape(&self, id: NodeIndex) -> &Shape {
        &self.graph[id].shape
    }

    pub fn parameter(&mut self, number: usize, shape: Shape) -> NodeIndex {
        self.add_named_op(format!("p{number}"), Op::Parameter(number), shape)
            .finish()
    }

    pub fn constant(&mut self, literal: Literal) -> NodeIndex {
        let shape = literal.shape().clone();
        self.add_op(Op::Constant(literal), shape).finish()
    }

    /// Elementwise unary op with the result shape inferred from the operand.
    pub fn unary(&mut self, op: UnaryOp, operand: NodeIndex) -> NodeIndex {
        let operand_shape = self.shape(operand).without_layout();
        let shape = match op {
            UnaryOp::IsFinite => operand_shape.with_element_type(PrimitiveType::Pred),
            UnaryOp::Real | UnaryOp::Imag | UnaryOp::Abs
                if operand_shape.element_type().is_complex() =>
            {
                operand_shape.with_element_type(PrimitiveType::F32)
            }
            _ => operand_shape,
        };
        self.add_op(Op::Unary(op), shape).input(operand).finish()
    }

    /// Elementwise binary op; the result takes the lhs shape.
    pub fn binary(&mut self, op: BinaryOp, lhs: NodeIndex, rhs: NodeIndex) -> NodeIndex {
        let shape = self.shape(lhs).without_layout();
        self.add_op(Op::Binary(op), shape)
            .input(lhs)
            .input(rhs)
            .finish()
    }

    pub fn compare(
        &mut self,
        direction: ComparisonDirection,
        lhs: NodeIndex,
        rhs: NodeIndex,
    ) -> NodeIndex {
        let shape = self
            .shape(lhs)
            .without_layout()
            .with_element_type(PrimitiveType::Pred);
        self.add_op(Op::Compare(direction), shape)
            .input(lhs)
            .input(rhs)
            .finish()
    }

    pub fn tuple(&mut self, elements: &[NodeIndex]) -> NodeIndex {
        let shape = Shape::tuple(
            elements
                .iter()
                .map(|e| self.shape(*e).clone())
                .collect::<Vec<_>>(),
        );
        self.add_op(Op::Tuple, shape).inputs(elements).finish()
    }

    pub fn get_tuple_element(&mut self, tuple: NodeIndex, index: usize) -> NodeIndex {
        let shape = self
            .shape(tuple)
            .tuple_element(index)
            .cloned()
            .unwrap_or_else(|| Shape::tuple(vec![]));
        self.add_op(Op::GetTupleElement { index }, shape)
            .input(tuple)
            .finish()
    }

    /// Freeze the graph with `root` as its result.
    pub fn build(self, root: NodeIndex) -> Result<Computation> {
        if self.graph.node_weight(root).is_none() {
            return Err(EvalError::InvalidArgument(format!(
                "root {} is not part of computation {}",
                root.index(),
                self.name
            )));
        }
        let parameters = self
            .parameters
            .iter()
            .enumerate()
            .map(|(number, p)| {
                p.ok_or_else(|| {
                    EvalError::InvalidArgument(format!(
                        "computation {} is missing parameter {number}",
                        self.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let schedule = post_order(&self.graph, root);
        Ok(Computation {
            name: self.name,
            graph: self.graph,
            root,
            parameters,
            schedule,
        })
    }
}

/// A set of computations with one entry point. Ops refer to the computations
/// they call by [`ComputationId`].
#[derive(Debug, Clone, Default)]
pub struct HloModule {
    pub name: String,
    computations: Vec<Computation>,
    entry: Option<ComputationId>,
}

impl HloModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_computation(&mut self, computation: Computation) -> ComputationId {
        self.computations.push(computation);
        ComputationId(self.computations.len() - 1)
    }

    pub fn add_entry_computation(&mut self, computation: Computation) -> ComputationId {
        let id = self.add_computation(computation);
        self.entry = Some(id);
        id
    }

    pub fn computation(&self, id: ComputationId) -> Result<&Computation> {
        self.computations.get(id.0).ok_or_else(|| {
            EvalError::InvalidArgument(format!(
                "module {} has no computation {}",
                self.name, id.0
            ))
        })
    }

    pub fn entry(&self) -> Result<ComputationId> {
        self.entry.ok_or_else(|| {
            EvalError::FailedPrecondition(format!(
                "module {} has no entry computation",
                self.name
            ))
        })
    }

    pub fn entry_computation(&self) -> Result<&Computation> {
        self.computation(self.entry()?)
    }

    pub fn computations(&self) -> impl Iterator<Item = (ComputationId, &Computation)> {
        self.computations
            .iter()
            .enumerate()
            .map(|(i, c)| (ComputationId(i), c))
    }
}

impl fmt::Display for HloModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HloModule {}", self.name)?;
        for (id, computation) in self.computations() {
            let marker = if Some(id) == self.entry { "ENTRY " } else { "" };
            writeln!(f, "{marker}{computation}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_dependency_ordered() {
        let shape = Shape::array(PrimitiveType::F32, [3]);
        let mut b = ComputationBuilder::new("diamond");
        let x = b.parameter(0, shape.clone());
        let e = b.unary(UnaryOp::Exp, x);
        let n = b.unary(UnaryOp::Negate, x);
        let root = b.binary(BinaryOp::Subtract, e, n);
        let _unused = b.unary(UnaryOp::Sin, x);
        let computation = b.build(root).unwrap();

        let order = computation
            .schedule()
            .iter()
            .map(|(n, _)| *n)
            .collect::<Vec<_>>();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], x);
        assert_eq!(*order.last().unwrap(), root);
        assert_eq!(computation.operands(root), vec![e, n]);
    }

    #[test]
    fn test_scalar_add_detection() {
        let scalar = Shape::scalar(PrimitiveType::F32);
        let mut b = ComputationBuilder::new("add");
        let p0 = b.parameter(0, scalar.clone());
        let p1 = b.parameter(1, scalar.clone());
        let root = b.binary(BinaryOp::Add, p0, p1);
        assert!(b.build(root).unwrap().is_scalar_add());

        let mut b = ComputationBuilder::new("double");
        let p0 = b.parameter(0, scalar.clone());
        let _p1 = b.parameter(1, scalar);
        let root = b.binary(BinaryOp::Add, p0, p0);
        assert!(!b.build(root).unwrap().is_scalar_add());
    }

    #[test]
    fn test_missing_parameter() {
        let mut b = ComputationBuilder::new("gap");
        let p1 = b.parameter(1, Shape::scalar(PrimitiveType::S32));
        assert!(b.build(p1).is_err());
    }
}
