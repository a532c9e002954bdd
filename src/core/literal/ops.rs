use std::borrow::Cow;

use itertools::Itertools;

use super::{ArrayData, Literal};
use crate::{
    error::{EvalError, Result},
    shape::{delinearize, for_each_index, linear_index, Layout, Shape},
    types::PrimitiveType,
};

impl Literal {
    /// Build a literal of `shape` whose element at each index is read from
    /// `self` at the index `source` writes into its second argument.
    fn remap(&self, shape: Shape, mut source: impl FnMut(&[usize], &mut [usize])) -> Literal {
        let strides = shape.strides();
        let mut positions = vec![0; shape.element_count()];
        let mut src = vec![0; self.rank()];
        for_each_index(shape.dimensions(), |index| {
            source(index, &mut src);
            positions[linear_index(&strides, index)] = linear_index(&self.strides, &src);
        });
        Literal {
            data: self.data.gather(&positions),
            strides,
            shape,
        }
    }

    fn expect_array(&self, op: &str) -> Result<()> {
        if !self.shape.is_array() {
            return Err(EvalError::InvalidArgument(format!(
                "{op} expects an array operand, got {}",
                self.shape
            )));
        }
        Ok(())
    }

    /// Same elements in row-major order under new dimensions.
    pub fn reshape(&self, dimensions: &[usize]) -> Result<Literal> {
        self.expect_array("reshape")?;
        let shape = Shape::array(self.element_type(), dimensions);
        if shape.element_count() != self.element_count() {
            return Err(EvalError::InvalidArgument(format!(
                "cannot reshape {} to {shape}",
                self.shape
            )));
        }
        let source_dims = self.dimensions().to_vec();
        let row_major = Layout::default_for_rank(source_dims.len()).minor_to_major;
        let mut logical = 0;
        Ok(self.remap(shape, |_, src| {
            delinearize(logical, &source_dims, &row_major, src);
            logical += 1;
        }))
    }

    /// Output dimension `i` is input dimension `permutation[i]`.
    pub fn transpose(&self, permutation: &[usize]) -> Result<Literal> {
        self.expect_array("transpose")?;
        if permutation.len() != self.rank()
            || !permutation.iter().sorted().copied().eq(0..self.rank())
        {
            return Err(EvalError::InvalidArgument(format!(
                "{permutation:?} is not a permutation of {}",
                self.shape
            )));
        }
        let dims = permutation.iter().map(|&p| self.dimension(p)).collect_vec();
        Ok(self.remap(self.shape.with_dimensions(dims), |index, src| {
            for (i, &p) in permutation.iter().enumerate() {
                src[p] = index[i];
            }
        }))
    }

    fn dimension(&self, i: usize) -> usize {
        self.shape.dimension(i)
    }

    /// A rank-0 literal replicated over `shape`'s dimensions. Anything else is
    /// returned as is.
    pub fn broadcast_scalar_to(&self, shape: &Shape) -> Result<Cow<'_, Literal>> {
        if self.rank() == 0 && shape.rank() > 0 {
            return Ok(Cow::Owned(self.broadcast(shape, &[])?));
        }
        Ok(Cow::Borrowed(self))
    }

    /// A literal of `shape` (same element type) whose element at physical
    /// position `i` is `self`'s element at `positions[i]`.
    pub(crate) fn from_positions(&self, shape: Shape, positions: &[usize]) -> Literal {
        debug_assert_eq!(shape.element_count(), positions.len());
        Literal::from_parts(shape, self.data.gather(positions))
    }

    /// Element-wise copy between physical positions.
    pub(crate) fn copy_positions_from(
        &mut self,
        dst_positions: &[usize],
        src: &Literal,
        src_positions: &[usize],
    ) -> Result<()> {
        self.data.copy_from(dst_positions, &src.data, src_positions)
    }

    /// Strided window `[starts, limits)` of every dimension.
    pub fn slice(&self, starts: &[usize], limits: &[usize], strides: &[usize]) -> Result<Literal> {
        self.expect_array("slice")?;
        let rank = self.rank();
        if starts.len() != rank || limits.len() != rank || strides.len() != rank {
            return Err(EvalError::InvalidArgument(format!(
                "slice bounds have the wrong rank for {}",
                self.shape
            )));
        }
        let mut dims = Vec::with_capacity(rank);
        for d in 0..rank {
            if starts[d] > limits[d] || limits[d] > self.dimension(d) || strides[d] == 0 {
                return Err(EvalError::InvalidArgument(format!(
                    "invalid slice [{}:{}:{}] of dimension {d} in {}",
                    starts[d], limits[d], strides[d], self.shape
                )));
            }
            dims.push((limits[d] - starts[d]).div_ceil(strides[d]));
        }
        Ok(self.remap(self.shape.with_dimensions(dims), |index, src| {
            for d in 0..rank {
                src[d] = starts[d] + index[d] * strides[d];
            }
        }))
    }

    /// Replicate into `shape`; operand dimension `i` becomes result dimension
    /// `dimensions[i]`.
    pub fn broadcast(&self, shape: &Shape, dimensions: &[usize]) -> Result<Literal> {
        self.expect_array("broadcast")?;
        if dimensions.len() != self.rank() {
            return Err(EvalError::InvalidArgument(format!(
                "broadcast dimensions {dimensions:?} do not match {}",
                self.shape
            )));
        }
        for (i, &d) in dimensions.iter().enumerate() {
            if d >= shape.rank() || shape.dimension(d) != self.dimension(i) {
                return Err(EvalError::InvalidArgument(format!(
                    "cannot broadcast {} into {shape} along {dimensions:?}",
                    self.shape
                )));
            }
        }
        let shape = shape.with_element_type(self.element_type());
        Ok(self.remap(shape, |index, src| {
            for (i, &d) in dimensions.iter().enumerate() {
                src[i] = index[d];
            }
        }))
    }

    pub fn reverse(&self, dimensions: &[usize]) -> Result<Literal> {
        self.expect_array("reverse")?;
        if dimensions.iter().any(|&d| d >= self.rank()) {
            return Err(EvalError::InvalidArgument(format!(
                "cannot reverse {dimensions:?} of {}",
                self.shape
            )));
        }
        let dims = self.dimensions().to_vec();
        Ok(self.remap(self.shape.clone(), |index, src| {
            src.copy_from_slice(index);
            for &d in dimensions {
                src[d] = dims[d] - 1 - index[d];
            }
        }))
    }

    /// Join arrays end to end along `dimension`.
    pub fn concatenate(parts: &[&Literal], dimension: usize) -> Result<Literal> {
        let Some(first) = parts.first() else {
            return Err(EvalError::InvalidArgument(
                "concatenate needs at least one operand".to_string(),
            ));
        };
        first.expect_array("concatenate")?;
        if dimension >= first.rank() {
            return Err(EvalError::InvalidArgument(format!(
                "concatenate dimension {dimension} out of range for {}",
                first.shape
            )));
        }
        let mut dims = first.dimensions().to_vec();
        dims[dimension] = 0;
        for part in parts {
            let compatible = part.element_type() == first.element_type()
                && part.rank() == first.rank()
                && (0..first.rank())
                    .all(|d| d == dimension || part.dimension(d) == first.dimension(d));
            if !compatible {
                return Err(EvalError::InvalidArgument(format!(
                    "cannot concatenate {} with {} along {dimension}",
                    first.shape, part.shape
                )));
            }
            dims[dimension] += part.dimension(dimension);
        }
        let mut result = Literal::new(first.shape.with_dimensions(dims));
        let mut dest_base = vec![0; first.rank()];
        for part in parts {
            result.copy_slice_from(part, &vec![0; part.rank()], &dest_base, part.dimensions())?;
            dest_base[dimension] += part.dimension(dimension);
        }
        Ok(result)
    }

    /// Copy the box `[src_base, src_base + size)` of `src` over
    /// `[dest_base, dest_base + size)` of `self`. The box is clipped to the
    /// bounds of both literals.
    pub fn copy_slice_from(
        &mut self,
        src: &Literal,
        src_base: &[usize],
        dest_base: &[usize],
        size: &[usize],
    ) -> Result<()> {
        if src.element_type() != self.element_type() || src.rank() != self.rank() {
            return Err(EvalError::InvalidArgument(format!(
                "cannot copy a slice of {} into {}",
                src.shape, self.shape
            )));
        }
        let clipped = (0..self.rank())
            .map(|d| {
                size[d]
                    .min(src.dimension(d).saturating_sub(src_base[d]))
                    .min(self.dimension(d).saturating_sub(dest_base[d]))
            })
            .collect_vec();
        let mut dst_positions = Vec::with_capacity(clipped.iter().product());
        let mut src_positions = Vec::with_capacity(dst_positions.capacity());
        let mut s = vec![0; self.rank()];
        let mut t = vec![0; self.rank()];
        for_each_index(&clipped, |index| {
            for d in 0..index.len() {
                s[d] = src_base[d] + index[d];
                t[d] = dest_base[d] + index[d];
            }
            src_positions.push(linear_index(&src.strides, &s));
            dst_positions.push(linear_index(&self.strides, &t));
        });
        self.data
            .copy_from(&dst_positions, &src.data, &src_positions)
    }

    /// Copy one element across literals of the same element type.
    pub fn copy_element_from(
        &mut self,
        src: &Literal,
        src_index: &[usize],
        dest_index: &[usize],
    ) -> Result<()> {
        let s = src.checked_position(src_index)?;
        let t = self.checked_position(dest_index)?;
        self.data.copy_from(&[t], &src.data, &[s])
    }

    /// Same logical value stored under another layout.
    pub fn relayout(&self, shape: &Shape) -> Result<Literal> {
        if self.is_tuple() {
            let elements = self
                .tuple_elements()
                .iter()
                .zip(shape.tuple_shapes())
                .map(|(element, shape)| element.relayout(shape))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Literal::tuple(elements));
        }
        if !self.shape.is_array() || self.shape.layouts_equal(shape) {
            return Ok(self.clone());
        }
        let target = self.shape.with_dimensions(self.dimensions().to_vec());
        let target = target.with_layout(shape.minor_to_major());
        target.validate()?;
        Ok(self.remap(target, |index, src| src.copy_from_slice(index)))
    }

    /// Element-wise cast preserving dimensions and layout.
    pub fn convert(&self, ty: PrimitiveType) -> Result<Literal> {
        self.expect_array("convert")?;
        if !ty.is_array_type() {
            return Err(EvalError::InvalidArgument(format!(
                "cannot convert {} to {ty}",
                self.shape
            )));
        }
        if self.element_type() == ty {
            return Ok(self.clone());
        }
        if self.element_type().is_complex() && !ty.is_complex() {
            return Err(EvalError::Unimplemented(format!(
                "conversion from complex to real type {} => {ty}",
                self.shape
            )));
        }
        let data = self.data.convert(ty).ok_or_else(|| {
            EvalError::Internal(format!("no conversion from {} to {ty}", self.shape))
        })?;
        Ok(Literal {
            shape: self.shape.with_element_type(ty),
            strides: self.strides.clone(),
            data,
        })
    }

    /// Reinterpret the element bits as another type of the same width.
    pub fn bitcast_convert(&self, ty: PrimitiveType) -> Result<Literal> {
        self.expect_array("bitcast-convert")?;
        if ty.byte_width() != self.element_type().byte_width() {
            return Err(EvalError::InvalidArgument(format!(
                "bitcast-convert from {} to {ty} changes the element width",
                self.shape
            )));
        }
        Literal::from_bytes(&self.shape.with_element_type(ty), &self.to_bytes())
    }

    /// Little-endian bytes of the elements in physical order.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.to_le_bytes()
    }

    pub fn from_bytes(shape: &Shape, bytes: &[u8]) -> Result<Literal> {
        if !shape.is_array() || shape.byte_size() != bytes.len() {
            return Err(EvalError::InvalidArgument(format!(
                "{} bytes cannot back {shape}",
                bytes.len()
            )));
        }
        let data = ArrayData::from_le_bytes(shape.element_type(), bytes).ok_or_else(|| {
            EvalError::InvalidArgument(format!("{shape} has no byte representation"))
        })?;
        Ok(Literal::from_parts(shape.clone(), data))
    }
}
