pub mod error;
pub mod graph;
pub mod literal;
pub mod op;
pub mod shape;
pub mod types;
