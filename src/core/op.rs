use itertools::Itertools;
use strum::IntoStaticStr;

use crate::{error::Result, graph::ComputationId, invalid_argument, literal::Literal, shape::Shape};

/// Elementwise operations of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum UnaryOp {
    Abs,
    Ceil,
    Clz,
    Copy,
    Cos,
    Exp,
    Expm1,
    Floor,
    Imag,
    IsFinite,
    Log,
    Log1p,
    Negate,
    Not,
    Real,
    #[strum(serialize = "round-nearest-afz")]
    Round,
    Sign,
    Sin,
    Tanh,
}

/// Elementwise operations of two same-shaped operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum BinaryOp {
    Add,
    And,
    Atan2,
    Divide,
    Maximum,
    Minimum,
    Multiply,
    Or,
    Power,
    Remainder,
    ShiftLeft,
    ShiftRightArithmetic,
    ShiftRightLogical,
    Subtract,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ComparisonDirection {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
}

/// One spatial dimension of a sliding window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDimension {
    pub size: usize,
    pub stride: usize,
    pub padding_low: i64,
    pub padding_high: i64,
    pub window_dilation: usize,
    pub base_dilation: usize,
    pub window_reversal: bool,
}

impl WindowDimension {
    /// A window of `size` with unit stride, no padding and no dilation.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            stride: 1,
            padding_low: 0,
            padding_high: 0,
            window_dilation: 1,
            base_dilation: 1,
            window_reversal: false,
        }
    }

    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn padding(mut self, low: i64, high: i64) -> Self {
        self.padding_low = low;
        self.padding_high = high;
        self
    }

    pub fn dilation(mut self, window_dilation: usize, base_dilation: usize) -> Self {
        self.window_dilation = window_dilation;
        self.base_dilation = base_dilation;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.window_reversal = true;
        self
    }

    /// Number of window positions along an input dimension of `input` elements.
    pub fn output_size(&self, input: usize) -> usize {
        let dilated_base = if input == 0 {
            0
        } else {
            (input as i64 - 1) * self.base_dilation as i64 + 1
        };
        let padded = dilated_base + self.padding_low + self.padding_high;
        let dilated_window = (self.size as i64 - 1) * self.window_dilation as i64 + 1;
        if padded < dilated_window || self.stride == 0 {
            return 0;
        }
        ((padded - dilated_window) / self.stride as i64 + 1) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Window {
    pub dimensions: Vec<WindowDimension>,
}

impl Window {
    pub fn new(dimensions: Vec<WindowDimension>) -> Self {
        Self { dimensions }
    }

    /// Unit-stride, unpadded window with the given sizes.
    pub fn of_sizes(sizes: &[usize]) -> Self {
        Self::new(sizes.iter().map(|&s| WindowDimension::new(s)).collect())
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.dimensions.iter().map(|d| d.size).collect()
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingDimension {
    pub edge_padding_low: i64,
    pub edge_padding_high: i64,
    pub interior_padding: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaddingConfig {
    pub dimensions: Vec<PaddingDimension>,
}

impl PaddingConfig {
    /// `(low, high, interior)` per dimension.
    pub fn new(dimensions: &[(i64, i64, usize)]) -> Self {
        Self {
            dimensions: dimensions
                .iter()
                .map(|&(low, high, interior)| PaddingDimension {
                    edge_padding_low: low,
                    edge_padding_high: high,
                    interior_padding: interior,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DotDimensionNumbers {
    pub lhs_contracting_dimensions: Vec<usize>,
    pub rhs_contracting_dimensions: Vec<usize>,
    pub lhs_batch_dimensions: Vec<usize>,
    pub rhs_batch_dimensions: Vec<usize>,
}

impl DotDimensionNumbers {
    /// Plain matrix product: contract lhs dimension 1 with rhs dimension 0.
    pub fn matmul() -> Self {
        Self {
            lhs_contracting_dimensions: vec![1],
            rhs_contracting_dimensions: vec![0],
            ..Default::default()
        }
    }

    /// Check every contracting and batch dimension against the operand ranks.
    /// Per side, the dimensions must be in range and pairwise distinct.
    pub fn validate(&self, lhs_rank: usize, rhs_rank: usize) -> Result<()> {
        if self.lhs_batch_dimensions.len() != self.rhs_batch_dimensions.len()
            || self.lhs_contracting_dimensions.len() != self.rhs_contracting_dimensions.len()
        {
            invalid_argument!("dot dimension numbers pair unequal lhs and rhs counts: {self:?}");
        }
        for (side, rank, contracting, batch) in [
            ("lhs", lhs_rank, &self.lhs_contracting_dimensions, &self.lhs_batch_dimensions),
            ("rhs", rhs_rank, &self.rhs_contracting_dimensions, &self.rhs_batch_dimensions),
        ] {
            if let Some(d) = contracting.iter().chain(batch).find(|d| **d >= rank) {
                invalid_argument!("{side} dot dimension {d} is out of range for rank {rank}");
            }
            if !contracting.iter().chain(batch).all_unique() {
                invalid_argument!(
                    "{side} dot dimensions repeat: contracting {contracting:?}, batch {batch:?}"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvolutionDimensionNumbers {
    pub input_batch_dimension: usize,
    pub input_feature_dimension: usize,
    pub input_spatial_dimensions: Vec<usize>,
    pub kernel_input_feature_dimension: usize,
    pub kernel_output_feature_dimension: usize,
    pub kernel_spatial_dimensions: Vec<usize>,
    pub output_batch_dimension: usize,
    pub output_feature_dimension: usize,
    pub output_spatial_dimensions: Vec<usize>,
}

impl ConvolutionDimensionNumbers {
    /// NCHW-style numbering for `spatial` spatial dimensions: batch and feature
    /// first, spatial dimensions after. Kernels are `[out, in, spatial..]`.
    pub fn default_for(spatial: usize) -> Self {
        let spatial_dims: Vec<usize> = (2..2 + spatial).collect();
        Self {
            input_batch_dimension: 0,
            input_feature_dimension: 1,
            input_spatial_dimensions: spatial_dims.clone(),
            kernel_input_feature_dimension: 1,
            kernel_output_feature_dimension: 0,
            kernel_spatial_dimensions: spatial_dims.clone(),
            output_batch_dimension: 0,
            output_feature_dimension: 1,
            output_spatial_dimensions: spatial_dims,
        }
    }

    /// Each of input, kernel and output must have rank `spatial + 2`, and its
    /// dimension numbers must be a permutation of `0..rank`. The window needs
    /// one entry per spatial dimension.
    pub fn validate(
        &self,
        input_rank: usize,
        kernel_rank: usize,
        output_rank: usize,
        window_rank: usize,
    ) -> Result<()> {
        let spatial = self.input_spatial_dimensions.len();
        if window_rank != spatial
            || self.kernel_spatial_dimensions.len() != spatial
            || self.output_spatial_dimensions.len() != spatial
        {
            invalid_argument!(
                "{} input, {} kernel and {} output spatial dimensions with a window of rank {}",
                spatial,
                self.kernel_spatial_dimensions.len(),
                self.output_spatial_dimensions.len(),
                window_rank
            );
        }
        for (role, rank, major, minor, spatial_dims) in [
            (
                "input",
                input_rank,
                self.input_batch_dimension,
                self.input_feature_dimension,
                &self.input_spatial_dimensions,
            ),
            (
                "kernel",
                kernel_rank,
                self.kernel_output_feature_dimension,
                self.kernel_input_feature_dimension,
                &self.kernel_spatial_dimensions,
            ),
            (
                "output",
                output_rank,
                self.output_batch_dimension,
                self.output_feature_dimension,
                &self.output_spatial_dimensions,
            ),
        ] {
            if rank != spatial + 2 {
                invalid_argument!("{role} has rank {rank}, expected {}", spatial + 2);
            }
            let dims = [major, minor]
                .into_iter()
                .chain(spatial_dims.iter().copied())
                .collect_vec();
            if dims.iter().any(|d| *d >= rank) || !dims.iter().all_unique() {
                invalid_argument!(
                    "{role} dimension numbers {dims:?} are not a permutation of 0..{rank}"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatherDimensionNumbers {
    pub offset_dims: Vec<usize>,
    pub collapsed_slice_dims: Vec<usize>,
    pub start_index_map: Vec<usize>,
    pub index_vector_dim: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScatterDimensionNumbers {
    pub update_window_dims: Vec<usize>,
    pub inserted_window_dims: Vec<usize>,
    pub scatter_dims_to_operand_dims: Vec<usize>,
    pub index_vector_dim: usize,
}

/// Every operation the evaluator understands, with its immutable parameters.
/// Operands live on the graph edges.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Op {
    Parameter(usize),
    Constant(Literal),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Compare(ComparisonDirection),
    /// `(low, value, high)`
    Clamp,
    /// `(pred, on_true, on_false)`
    Select,
    TupleSelect,
    Convert,
    BitcastConvert,
    Bitcast,
    ReducePrecision {
        exponent_bits: u32,
        mantissa_bits: u32,
    },
    Iota {
        dimension: usize,
    },
    Broadcast {
        dimensions: Vec<usize>,
    },
    Reshape,
    Transpose {
        permutation: Vec<usize>,
    },
    Reverse {
        dimensions: Vec<usize>,
    },
    Concatenate {
        dimension: usize,
    },
    Slice {
        starts: Vec<usize>,
        limits: Vec<usize>,
        strides: Vec<usize>,
    },
    /// `(operand, start indices..)`
    DynamicSlice {
        sizes: Vec<usize>,
    },
    /// `(operand, update, start indices..)`
    DynamicUpdateSlice,
    /// `(operand, padding value)`
    Pad(PaddingConfig),
    Dot(DotDimensionNumbers),
    Convolution {
        window: Window,
        dimension_numbers: ConvolutionDimensionNumbers,
        feature_group_count: usize,
    },
    /// `(inputs.., init values..)`
    Reduce {
        dimensions: Vec<usize>,
        to_apply: ComputationId,
    },
    /// `(operand, init value)`
    ReduceWindow {
        window: Window,
        to_apply: ComputationId,
    },
    /// `(operand, source, init value)`
    SelectAndScatter {
        window: Window,
        select: ComputationId,
        scatter: ComputationId,
    },
    /// `(operand, start indices)`
    Gather {
        dimension_numbers: GatherDimensionNumbers,
        slice_sizes: Vec<usize>,
    },
    /// `(operand, scatter indices, updates)`
    Scatter {
        dimension_numbers: ScatterDimensionNumbers,
        to_apply: ComputationId,
    },
    /// `(keys, values..)`
    Sort {
        dimension: usize,
    },
    Tuple,
    GetTupleElement {
        index: usize,
    },
    Call {
        to_apply: ComputationId,
    },
    Map {
        to_apply: ComputationId,
    },
    /// `(pred, true operand, false operand)`
    Conditional {
        true_computation: ComputationId,
        false_computation: ComputationId,
    },
    While {
        condition: ComputationId,
        body: ComputationId,
    },
    AfterAll,
    AddDependency,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Unary(op) => op.into(),
            Op::Binary(op) => op.into(),
            other => other.into(),
        }
    }

    pub fn is_elementwise(&self) -> bool {
        matches!(
            self,
            Op::Unary(_)
                | Op::Binary(_)
                | Op::Compare(_)
                | Op::Clamp
                | Op::Select
                | Op::Convert
                | Op::ReducePrecision { .. }
                | Op::Map { .. }
        )
    }

    /// Subcomputations this op calls into.
    pub fn called_computations(&self) -> Vec<ComputationId> {
        match self {
            Op::Reduce { to_apply, .. }
            | Op::ReduceWindow { to_apply, .. }
            | Op::Scatter { to_apply, .. }
            | Op::Call { to_apply }
            | Op::Map { to_apply } => vec![*to_apply],
            Op::SelectAndScatter {
                select, scatter, ..
            } => vec![*select, *scatter],
            Op::Conditional {
                true_computation,
                false_computation,
            } => vec![*true_computation, *false_computation],
            Op::While { condition, body } => vec![*condition, *body],
            _ => vec![],
        }
    }
}

/// A graph node: an op, its declared result shape and a name for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub name: String,
    pub op: Op,
    pub shape: Shape,
}

impl Instruction {
    pub fn new(name: impl Into<String>, op: Op, shape: Shape) -> Self {
        Self {
            name: name.into(),
            op,
            shape,
        }
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.op, Op::Parameter(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.op, Op::Constant(_))
    }
}
