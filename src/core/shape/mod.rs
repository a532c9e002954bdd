mod index;

pub use index::*;

use std::fmt;

use itertools::Itertools;

use crate::{
    error::{EvalError, Result},
    types::PrimitiveType,
};

/// Physical ordering of an array's dimensions, listed from the fastest varying
/// (minor) to the slowest varying (major).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Layout {
    pub minor_to_major: Vec<usize>,
}

impl Layout {
    pub fn new(minor_to_major: Vec<usize>) -> Self {
        Self { minor_to_major }
    }

    /// Row major: the last dimension is the minor one.
    pub fn default_for_rank(rank: usize) -> Self {
        Self {
            minor_to_major: (0..rank).rev().collect(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.minor_to_major
            .iter()
            .rev()
            .enumerate()
            .all(|(i, d)| i == *d)
    }
}

/// Type, dimensions and layout of an array, or the child shapes of a tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    element_type: PrimitiveType,
    dimensions: Vec<usize>,
    layout: Option<Layout>,
    tuple_shapes: Vec<Shape>,
}

impl Shape {
    pub fn array(element_type: PrimitiveType, dimensions: impl Into<Vec<usize>>) -> Self {
        Self {
            element_type,
            dimensions: dimensions.into(),
            layout: None,
            tuple_shapes: vec![],
        }
    }

    pub fn scalar(element_type: PrimitiveType) -> Self {
        Self::array(element_type, vec![])
    }

    pub fn tuple(shapes: impl Into<Vec<Shape>>) -> Self {
        Self {
            element_type: PrimitiveType::Tuple,
            dimensions: vec![],
            layout: None,
            tuple_shapes: shapes.into(),
        }
    }

    pub fn token() -> Self {
        Self::array(PrimitiveType::Token, vec![])
    }

    /// Attach an explicit layout. Arrays without one use the row-major default.
    pub fn with_layout(mut self, minor_to_major: impl Into<Vec<usize>>) -> Self {
        self.layout = Some(Layout::new(minor_to_major.into()));
        self
    }

    pub fn with_element_type(&self, element_type: PrimitiveType) -> Self {
        let mut shape = self.clone();
        shape.element_type = element_type;
        shape
    }

    pub fn with_dimensions(&self, dimensions: impl Into<Vec<usize>>) -> Self {
        Self::array(self.element_type, dimensions)
    }

    /// Same element type and dimensions, default layout.
    pub fn without_layout(&self) -> Self {
        let mut shape = self.clone();
        shape.clear_layouts();
        shape
    }

    fn clear_layouts(&mut self) {
        self.layout = None;
        self.tuple_shapes.iter_mut().for_each(Shape::clear_layouts);
    }

    pub fn element_type(&self) -> PrimitiveType {
        self.element_type
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn dimension(&self, i: usize) -> usize {
        self.dimensions[i]
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn minor_to_major(&self) -> Vec<usize> {
        match &self.layout {
            Some(layout) => layout.minor_to_major.clone(),
            None => Layout::default_for_rank(self.rank()).minor_to_major,
        }
    }

    pub fn has_default_layout(&self) -> bool {
        self.layout.as_ref().map(Layout::is_default).unwrap_or(true)
    }

    pub fn tuple_shapes(&self) -> &[Shape] {
        &self.tuple_shapes
    }

    pub fn tuple_element(&self, index: usize) -> Option<&Shape> {
        self.tuple_shapes.get(index)
    }

    pub fn is_tuple(&self) -> bool {
        self.element_type == PrimitiveType::Tuple
    }

    pub fn is_token(&self) -> bool {
        self.element_type == PrimitiveType::Token
    }

    pub fn is_array(&self) -> bool {
        self.element_type.is_array_type()
    }

    pub fn is_scalar(&self) -> bool {
        self.is_array() && self.dimensions.is_empty()
    }

    pub fn element_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn byte_size(&self) -> usize {
        if self.is_tuple() {
            self.tuple_shapes.iter().map(Shape::byte_size).sum()
        } else {
            self.element_count() * self.element_type.byte_width()
        }
    }

    /// Distance between neighbouring elements of each dimension in the
    /// physical buffer.
    pub fn strides(&self) -> Vec<usize> {
        strides_for(&self.dimensions, &self.minor_to_major())
    }

    /// Check the structural invariants: tuples carry no dimensions, arrays
    /// carry no children, and a layout is a permutation of the dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.is_tuple() {
            if !self.dimensions.is_empty() || self.layout.is_some() {
                return Err(EvalError::InvalidArgument(format!(
                    "tuple shape {self} has dimensions or a layout"
                )));
            }
            return self.tuple_shapes.iter().try_for_each(Shape::validate);
        }
        if !self.tuple_shapes.is_empty() {
            return Err(EvalError::InvalidArgument(format!(
                "non-tuple shape {self} has tuple children"
            )));
        }
        if let Some(layout) = &self.layout {
            let mut seen = vec![false; self.rank()];
            if layout.minor_to_major.len() != self.rank() {
                return Err(EvalError::InvalidArgument(format!(
                    "layout {:?} does not match rank of {self}",
                    layout.minor_to_major
                )));
            }
            for &d in &layout.minor_to_major {
                if d >= self.rank() || seen[d] {
                    return Err(EvalError::InvalidArgument(format!(
                        "layout {:?} is not a permutation for {self}",
                        layout.minor_to_major
                    )));
                }
                seen[d] = true;
            }
        }
        Ok(())
    }

    pub fn same_dimensions(&self, other: &Shape) -> bool {
        self.dimensions == other.dimensions
    }

    /// Equal up to layout.
    pub fn compatible(&self, other: &Shape) -> bool {
        if self.is_tuple() || other.is_tuple() {
            return self.is_tuple()
                && other.is_tuple()
                && self.tuple_shapes.len() == other.tuple_shapes.len()
                && self
                    .tuple_shapes
                    .iter()
                    .zip(&other.tuple_shapes)
                    .all(|(a, b)| a.compatible(b));
        }
        self.element_type == other.element_type && self.dimensions == other.dimensions
    }

    pub fn layouts_equal(&self, other: &Shape) -> bool {
        if self.is_tuple() {
            return other.is_tuple()
                && self.tuple_shapes.len() == other.tuple_shapes.len()
                && self
                    .tuple_shapes
                    .iter()
                    .zip(&other.tuple_shapes)
                    .all(|(a, b)| a.layouts_equal(b));
        }
        self.minor_to_major() == other.minor_to_major()
    }

    pub fn human_string_with_layout(&self) -> String {
        if self.is_tuple() {
            return format!(
                "({})",
                self.tuple_shapes
                    .iter()
                    .map(Shape::human_string_with_layout)
                    .join(", ")
            );
        }
        if !self.is_array() {
            return self.to_string();
        }
        format!("{self}{{{}}}", self.minor_to_major().iter().join(","))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tuple() {
            return write!(f, "({})", self.tuple_shapes.iter().join(", "));
        }
        if !self.is_array() {
            return write!(f, "{}", self.element_type);
        }
        write!(f, "{}[{}]", self.element_type, self.dimensions.iter().join(","))
    }
}
