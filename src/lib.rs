mod core;
pub use crate::core::*;
pub mod comparison;
pub mod evaluator;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::comparison::*;
    pub use crate::error::*;
    pub use crate::evaluator::{infer_dot_shape, Evaluator, EvaluatorConfig};
    pub use crate::graph::*;
    pub use crate::literal::*;
    pub use crate::op::*;
    pub use crate::shape::*;
    pub use crate::types::*;
}
