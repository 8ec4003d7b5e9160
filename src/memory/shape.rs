use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Element type plus row-major dimensions of a buffer.
///
/// Written in program text as `u32[2,2]`; a scalar is `u32[]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Shape {
    pub dtype: DataType,
    pub dims: Vec<usize>,
}

impl Shape {
    pub fn new(dtype: DataType, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            dtype,
            dims: dims.into(),
        }
    }

    pub fn scalar(dtype: DataType) -> Self {
        Self::new(dtype, Vec::new())
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.element_count() * self.dtype.size_in_bytes()
    }

    /// Same shape with dimension `dim` replaced by `size`.
    pub(crate) fn with_dim(&self, dim: usize, size: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims[dim] = size;
        Shape::new(self.dtype, dims)
    }

    /// Split the row-major layout around `dim` into
    /// `(outer element count, extent of dim, inner bytes per dim step)`.
    pub(crate) fn strides_around(&self, dim: usize) -> (usize, usize, usize) {
        let outer = self.dims[..dim].iter().product();
        let inner: usize = self.dims[dim + 1..].iter().product();
        (outer, self.dims[dim], inner * self.dtype.size_in_bytes())
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let open = s
            .find('[')
            .ok_or_else(|| format!("shape '{s}' is missing '['"))?;
        let body = s[open + 1..]
            .strip_suffix(']')
            .ok_or_else(|| format!("shape '{s}' is missing ']'"))?;
        let dtype = s[..open].trim().parse::<DataType>()?;
        let dims = body
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<usize>()
                    .map_err(|_| format!("shape '{s}' has a non-numeric dimension '{d}'"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Shape { dtype, dims })
    }
}

impl TryFrom<String> for Shape {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Shape> for String {
    fn from(shape: Shape) -> String {
        shape.to_string()
    }
}
