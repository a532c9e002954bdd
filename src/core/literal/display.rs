use std::fmt::{self, Write};

use super::{ArrayData, Literal};
use crate::shape::linear_index;

/// Past this many elements [`Literal::to_string_truncated`] only prints the
/// shape.
const MAX_PRINTED_ELEMENTS: usize = 1000;

impl Literal {
    fn write_elements(&self, out: &mut String, dim: usize, index: &mut Vec<usize>) -> fmt::Result {
        if dim == self.rank() {
            let position = linear_index(&self.strides, index);
            return match self.data.scalar(position) {
                Some(scalar) => write!(out, "{scalar}"),
                None => Err(fmt::Error),
            };
        }
        out.push('{');
        for i in 0..self.dimensions()[dim] {
            if i > 0 {
                out.push_str(", ");
            }
            index.push(i);
            self.write_elements(out, dim + 1, index)?;
            index.pop();
        }
        out.push('}');
        Ok(())
    }

    /// Like `to_string`, but large arrays are summarised by their shape.
    pub fn to_string_truncated(&self) -> String {
        if self.element_count() > MAX_PRINTED_ELEMENTS && self.shape.is_array() {
            return format!("{} {{...}}", self.shape.human_string_with_layout());
        }
        self.to_string()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            ArrayData::Tuple(elements) => {
                writeln!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    let sep = if i + 1 < elements.len() { "," } else { "" };
                    writeln!(f, "{element}{sep}")?;
                }
                write!(f, ")")
            }
            ArrayData::Empty => write!(f, "{}", self.shape),
            _ => {
                let mut body = String::new();
                self.write_elements(&mut body, 0, &mut Vec::with_capacity(self.rank()))?;
                write!(f, "{} {body}", self.shape.human_string_with_layout())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{literal::Literal, shape::Shape, types::PrimitiveType};

    #[test]
    fn test_display() {
        assert_eq!(Literal::scalar(3i32).to_string(), "s32[]{} 3");
        let m = Literal::matrix(&[[1.5f32, 2.0], [3.0, 4.0]]);
        assert_eq!(m.to_string(), "f32[2,2]{1,0} {{1.5, 2}, {3, 4}}");
        assert_eq!(
            Literal::tuple(vec![Literal::scalar(true), Literal::token()]).to_string(),
            "(\npred[]{} true,\ntoken\n)"
        );
    }

    #[test]
    fn test_truncated() {
        let big = Literal::new(Shape::array(PrimitiveType::U8, [2000]));
        assert_eq!(big.to_string_truncated(), "u8[2000]{0} {...}");
        assert_eq!(Literal::vec1(&[1u8]).to_string_truncated(), "u8[1]{0} {1}");
    }
}
