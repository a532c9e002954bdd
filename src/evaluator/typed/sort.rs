use std::cmp::Ordering;

use itertools::Itertools;

use crate::{
    error::Result,
    evaluator::Visit,
    invalid_argument,
    literal::Literal,
    shape::{linear_index, IterationSpace},
    types::NativeType,
};

/// Stable sort of every row along `dimension`, ordered by the keys in operand
/// 0. Any further operands are permuted the same way and the result is a
/// tuple of all of them.
pub(super) fn sort_along<T: NativeType>(
    visit: &Visit,
    dimension: usize,
    less: fn(&T, &T) -> bool,
) -> Result<Literal> {
    let keys = visit.operand(0)?;
    let values = &visit.operands[1..];
    if values.iter().any(|v| !v.shape().same_dimensions(keys.shape())) {
        invalid_argument!(
            "sort {}: every operand must have the dimensions of the keys {}",
            visit.instruction.name,
            keys.shape()
        );
    }
    if keys.rank() == 0 {
        return Ok(assemble(visit.operands.iter().map(|o| (*o).clone()).collect()));
    }
    if dimension >= keys.rank() {
        invalid_argument!(
            "sort dimension {dimension} out of range for {}",
            keys.shape()
        );
    }

    let key_data = keys.data::<T>()?;
    let row_length = keys.dimensions()[dimension];
    let mut rows = IterationSpace::full(keys.dimensions());
    rows.count[dimension] = 1;

    // For each row, its first index and the order its elements end up in.
    let mut permutations = Vec::new();
    rows.for_each(|start| {
        let mut index = start.to_vec();
        let row = (0..row_length)
            .map(|i| {
                index[dimension] = i;
                key_data[keys.linear_index(&index)]
            })
            .collect_vec();
        let mut order = (0..row_length).collect_vec();
        order.sort_by(|&a, &b| {
            if less(&row[a], &row[b]) {
                Ordering::Less
            } else if less(&row[b], &row[a]) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
        permutations.push((start.to_vec(), order));
    });

    let sorted = visit
        .operands
        .iter()
        .map(|operand| {
            let strides = operand.strides();
            let mut positions = vec![0; operand.element_count()];
            for (start, order) in &permutations {
                let mut index = start.clone();
                for (i, &from) in order.iter().enumerate() {
                    index[dimension] = from;
                    let source = linear_index(strides, &index);
                    index[dimension] = i;
                    positions[linear_index(strides, &index)] = source;
                }
            }
            operand.from_positions(operand.shape().clone(), &positions)
        })
        .collect_vec();
    Ok(assemble(sorted))
}

fn assemble(mut sorted: Vec<Literal>) -> Literal {
    if sorted.len() == 1 {
        return sorted.remove(0);
    }
    Literal::tuple(sorted)
}
