use crate::types::PrimitiveType;

/// Knobs for one [`Evaluator`](super::Evaluator). Nested evaluators spun up for
/// subcomputations inherit their parent's config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Cap on while-loop body executions. `None` never gives up.
    pub max_loop_iterations: Option<u64>,
    /// Route rank-2 F32 dots through the dense matmul kernel.
    pub use_fast_path: bool,
    /// Element types whose typed kernels report "unhandled primitive type".
    pub unsupported_types: Vec<PrimitiveType>,
    /// Element count from which `populate_parallel` fans out.
    pub parallel_threshold: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: None,
            use_fast_path: true,
            unsupported_types: vec![PrimitiveType::S16, PrimitiveType::U16],
            parallel_threshold: 1 << 12,
        }
    }
}

impl EvaluatorConfig {
    pub fn with_max_loop_iterations(mut self, max: impl Into<Option<u64>>) -> Self {
        self.max_loop_iterations = max.into();
        self
    }

    pub fn with_fast_path(mut self, enabled: bool) -> Self {
        self.use_fast_path = enabled;
        self
    }

    pub fn with_unsupported_types(mut self, types: Vec<PrimitiveType>) -> Self {
        self.unsupported_types = types;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}
