use crate::error::Result;

/// Strides of a buffer with the given dimensions laid out in `minor_to_major`
/// order.
pub fn strides_for(dimensions: &[usize], minor_to_major: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dimensions.len()];
    let mut scale = 1;
    for &d in minor_to_major {
        strides[d] = scale;
        scale *= dimensions[d];
    }
    strides
}

pub fn linear_index(strides: &[usize], index: &[usize]) -> usize {
    strides.iter().zip(index).map(|(s, i)| s * i).sum()
}

/// Inverse of [`linear_index`] for a buffer in `minor_to_major` order.
pub fn delinearize(
    mut linear: usize,
    dimensions: &[usize],
    minor_to_major: &[usize],
    index: &mut [usize],
) {
    for &d in minor_to_major {
        let size = dimensions[d].max(1);
        index[d] = linear % size;
        linear /= size;
    }
}

/// Advance `index` to the next position in row-major order. Returns false once
/// every position has been visited (the index wraps back to all zeros).
pub fn bump_indices(dimensions: &[usize], index: &mut [usize]) -> bool {
    for d in (0..dimensions.len()).rev() {
        index[d] += 1;
        if index[d] < dimensions[d] {
            return true;
        }
        index[d] = 0;
    }
    false
}

/// A strided box of indices: dimension `d` runs over
/// `base[d], base[d] + incr[d], ..` while below `base[d] + count[d]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationSpace {
    pub base: Vec<usize>,
    pub count: Vec<usize>,
    pub incr: Vec<usize>,
}

impl IterationSpace {
    /// Every index of an array with the given dimensions.
    pub fn full(dimensions: &[usize]) -> Self {
        Self {
            base: vec![0; dimensions.len()],
            count: dimensions.to_vec(),
            incr: vec![1; dimensions.len()],
        }
    }

    pub fn new(base: Vec<usize>, count: Vec<usize>, incr: Vec<usize>) -> Self {
        Self { base, count, incr }
    }

    /// Visit every index in row-major order (last dimension fastest).
    pub fn try_for_each(&self, mut f: impl FnMut(&[usize]) -> Result<()>) -> Result<()> {
        let rank = self.base.len();
        if self.count.iter().any(|c| *c == 0) {
            return Ok(());
        }
        let mut index = self.base.clone();
        loop {
            f(&index)?;
            let mut d = rank;
            loop {
                if d == 0 {
                    return Ok(());
                }
                d -= 1;
                index[d] += self.incr[d];
                if index[d] < self.base[d] + self.count[d] {
                    break;
                }
                index[d] = self.base[d];
            }
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&[usize])) {
        let _ = self.try_for_each(|index| {
            f(index);
            Ok(())
        });
    }
}

/// Visit every index of an array with the given dimensions.
pub fn for_each_index(dimensions: &[usize], f: impl FnMut(&[usize])) {
    IterationSpace::full(dimensions).for_each(f)
}

pub fn try_for_each_index(
    dimensions: &[usize],
    f: impl FnMut(&[usize]) -> Result<()>,
) -> Result<()> {
    IterationSpace::full(dimensions).try_for_each(f)
}
