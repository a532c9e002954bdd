mod display;
mod ops;
mod storage;

pub use storage::ArrayData;

use rayon::prelude::*;

use crate::{
    error::{EvalError, Result},
    shape::{delinearize, linear_index, try_for_each_index, Shape},
    types::{NativeType, PrimitiveType, Scalar},
};

/// A concrete value: dense element storage plus the shape (and layout) that
/// gives it meaning, or a tuple of child literals.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    shape: Shape,
    strides: Vec<usize>,
    data: ArrayData,
}

impl Literal {
    /// A zero filled literal (all `false` for predicates).
    pub fn new(shape: Shape) -> Self {
        if shape.is_tuple() {
            let elements = shape
                .tuple_shapes()
                .iter()
                .cloned()
                .map(Literal::new)
                .collect();
            return Self {
                strides: vec![],
                data: ArrayData::Tuple(elements),
                shape,
            };
        }
        let data = ArrayData::zeros(shape.element_type(), shape.element_count())
            .unwrap_or(ArrayData::Empty);
        Self {
            strides: shape.strides(),
            data,
            shape,
        }
    }

    pub(crate) fn from_parts(shape: Shape, data: ArrayData) -> Self {
        debug_assert!(shape.is_tuple() || !shape.is_array() || shape.element_count() == data.len());
        Self {
            strides: shape.strides(),
            shape,
            data,
        }
    }

    pub fn scalar<T: NativeType>(value: T) -> Self {
        Self::from_parts(Shape::scalar(T::TYPE), T::into_data(vec![value]))
    }

    pub fn vec1<T: NativeType>(values: &[T]) -> Self {
        Self::from_parts(
            Shape::array(T::TYPE, [values.len()]),
            T::into_data(values.to_vec()),
        )
    }

    pub fn matrix<T: NativeType, const N: usize>(rows: &[[T; N]]) -> Self {
        Self::from_parts(
            Shape::array(T::TYPE, [rows.len(), N]),
            T::into_data(rows.iter().flatten().copied().collect()),
        )
    }

    /// Row-major values with the given dimensions.
    pub fn from_vec<T: NativeType>(dimensions: &[usize], values: Vec<T>) -> Result<Self> {
        let shape = Shape::array(T::TYPE, dimensions);
        if shape.element_count() != values.len() {
            return Err(EvalError::InvalidArgument(format!(
                "{} values do not fill shape {shape}",
                values.len()
            )));
        }
        Ok(Self::from_parts(shape, T::into_data(values)))
    }

    pub fn tuple(elements: Vec<Literal>) -> Self {
        let shape = Shape::tuple(elements.iter().map(|e| e.shape.clone()).collect::<Vec<_>>());
        Self {
            shape,
            strides: vec![],
            data: ArrayData::Tuple(elements),
        }
    }

    pub fn token() -> Self {
        Self {
            shape: Shape::token(),
            strides: vec![],
            data: ArrayData::Empty,
        }
    }

    /// Build an array literal by computing every element from its index.
    pub fn try_populate<T: NativeType>(
        shape: &Shape,
        mut generator: impl FnMut(&[usize]) -> Result<T>,
    ) -> Result<Self> {
        check_element_type::<T>(shape)?;
        let strides = shape.strides();
        let mut values = vec![T::default(); shape.element_count()];
        try_for_each_index(shape.dimensions(), |index| {
            values[linear_index(&strides, index)] = generator(index)?;
            Ok(())
        })?;
        Ok(Self::from_parts(shape.clone(), T::into_data(values)))
    }

    pub fn populate<T: NativeType>(
        shape: &Shape,
        mut generator: impl FnMut(&[usize]) -> T,
    ) -> Result<Self> {
        Self::try_populate(shape, |index| Ok(generator(index)))
    }

    /// Like [`Literal::try_populate`], splitting the work across the rayon
    /// pool once the element count reaches `threshold`. The generator must not
    /// depend on the order elements are produced in.
    pub fn populate_parallel<T: NativeType>(
        shape: &Shape,
        threshold: usize,
        generator: impl Fn(&[usize]) -> Result<T> + Sync + Send,
    ) -> Result<Self> {
        let count = shape.element_count();
        if count < threshold.max(2) {
            return Self::try_populate(shape, generator);
        }
        check_element_type::<T>(shape)?;
        let dimensions = shape.dimensions();
        let minor_to_major = shape.minor_to_major();
        let values = (0..count)
            .into_par_iter()
            .map_init(
                || vec![0; dimensions.len()],
                |index, linear| {
                    delinearize(linear, dimensions, &minor_to_major, index);
                    generator(index)
                },
            )
            .collect::<Result<Vec<T>>>()?;
        Ok(Self::from_parts(shape.clone(), T::into_data(values)))
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn element_type(&self) -> PrimitiveType {
        self.shape.element_type()
    }

    pub fn dimensions(&self) -> &[usize] {
        self.shape.dimensions()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn storage(&self) -> &ArrayData {
        &self.data
    }

    /// Elements in physical (layout) order.
    pub fn data<T: NativeType>(&self) -> Result<&[T]> {
        T::slice(&self.data).ok_or_else(|| self.type_mismatch::<T>())
    }

    pub fn data_mut<T: NativeType>(&mut self) -> Result<&mut [T]> {
        match T::slice_mut(&mut self.data) {
            Some(values) => Ok(values),
            None => Err(EvalError::InvalidArgument(format!(
                "literal of type {} accessed as {}",
                self.shape.element_type(),
                T::TYPE
            ))),
        }
    }

    fn type_mismatch<T: NativeType>(&self) -> EvalError {
        EvalError::InvalidArgument(format!(
            "literal of type {} accessed as {}",
            self.shape.element_type(),
            T::TYPE
        ))
    }

    /// Physical position of a multi-dimensional index.
    pub fn linear_index(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.rank());
        linear_index(&self.strides, index)
    }

    fn checked_position(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.rank()
            || index.iter().zip(self.dimensions()).any(|(i, d)| i >= d)
        {
            return Err(EvalError::InvalidArgument(format!(
                "index {index:?} out of bounds for {}",
                self.shape
            )));
        }
        Ok(self.linear_index(index))
    }

    pub fn get<T: NativeType>(&self, index: &[usize]) -> Result<T> {
        let position = self.checked_position(index)?;
        Ok(self.data::<T>()?[position])
    }

    pub fn set<T: NativeType>(&mut self, index: &[usize], value: T) -> Result<()> {
        let position = self.checked_position(index)?;
        self.data_mut::<T>()?[position] = value;
        Ok(())
    }

    pub fn get_first<T: NativeType>(&self) -> Result<T> {
        self.data::<T>()?
            .first()
            .copied()
            .ok_or_else(|| EvalError::InvalidArgument(format!("{} has no elements", self.shape)))
    }

    /// Element at `index` as a type-erased scalar.
    pub fn scalar_at(&self, index: &[usize]) -> Result<Scalar> {
        let position = self.checked_position(index)?;
        self.data.scalar(position).ok_or_else(|| {
            EvalError::InvalidArgument(format!("{} holds no array data", self.shape))
        })
    }

    pub fn first_scalar(&self) -> Result<Scalar> {
        if self.element_count() == 0 || !self.shape.is_array() {
            return Err(EvalError::InvalidArgument(format!(
                "{} has no elements",
                self.shape
            )));
        }
        self.data.scalar(0).ok_or_else(|| {
            EvalError::InvalidArgument(format!("{} holds no array data", self.shape))
        })
    }

    /// Read an index operand element as a signed 64 bit integer.
    pub fn get_integral_as_i64(&self, index: &[usize]) -> Result<i64> {
        if !self.element_type().is_integral() {
            return Err(EvalError::InvalidArgument(format!(
                "expected an integral index literal, got {}",
                self.shape
            )));
        }
        self.scalar_at(index)?.as_i64().ok_or_else(|| {
            EvalError::InvalidArgument(format!("non-integral element in {}", self.shape))
        })
    }

    /// The element at `index` as a rank-0 literal.
    pub fn element_literal(&self, index: &[usize]) -> Result<Literal> {
        let position = self.checked_position(index)?;
        Ok(Self::from_parts(
            Shape::scalar(self.element_type()),
            self.data.gather(&[position]),
        ))
    }

    /// Elements in row-major logical order, independent of the layout.
    pub fn to_vec<T: NativeType>(&self) -> Result<Vec<T>> {
        let values = self.data::<T>()?;
        if self.shape.has_default_layout() {
            return Ok(values.to_vec());
        }
        Ok(self
            .row_major_positions()
            .into_iter()
            .map(|p| values[p])
            .collect())
    }

    /// Physical positions visited in row-major logical order.
    pub(crate) fn row_major_positions(&self) -> Vec<usize> {
        let mut positions = Vec::with_capacity(self.element_count());
        crate::shape::for_each_index(self.dimensions(), |index| {
            positions.push(linear_index(&self.strides, index))
        });
        positions
    }

    pub fn is_tuple(&self) -> bool {
        self.shape.is_tuple()
    }

    pub fn tuple_elements(&self) -> &[Literal] {
        match &self.data {
            ArrayData::Tuple(elements) => elements,
            _ => &[],
        }
    }

    pub fn tuple_element(&self, index: usize) -> Result<&Literal> {
        self.tuple_elements().get(index).ok_or_else(|| {
            EvalError::InvalidArgument(format!(
                "tuple index {index} out of range for {}",
                self.shape
            ))
        })
    }

    /// Split a tuple into its elements. A non-tuple decomposes into itself.
    pub fn decompose_tuple(self) -> Vec<Literal> {
        match self.data {
            ArrayData::Tuple(elements) => elements,
            _ => vec![self],
        }
    }
}

fn check_element_type<T: NativeType>(shape: &Shape) -> Result<()> {
    if shape.element_type() != T::TYPE {
        return Err(EvalError::InvalidArgument(format!(
            "cannot populate {shape} with {} elements",
            T::TYPE
        )));
    }
    Ok(())
}
