use super::Shape;
use crate::error::{LockstepError, Result};
use crate::reduce::{LeBytes, identity_slice, reduce_slice};
use crate::types::{DataType, ReduceOp};
use bytes::Bytes;

/// Rust scalar types that map onto a [`DataType`].
pub trait NativeType: Copy + Send + 'static {
    const DTYPE: DataType;
    fn write_to(self, out: &mut [u8]);
    fn read_from(bytes: &[u8]) -> Self;
}

macro_rules! impl_native {
    ($($ty:ty => $dt:expr),*) => {
        $(
            impl NativeType for $ty {
                const DTYPE: DataType = $dt;
                #[inline]
                fn write_to(self, out: &mut [u8]) {
                    LeBytes::write_le(self, out);
                }
                #[inline]
                fn read_from(bytes: &[u8]) -> Self {
                    <$ty as LeBytes>::read_le(bytes)
                }
            }
        )*
    };
}

impl_native!(
    i8 => DataType::S8,
    u8 => DataType::U8,
    i32 => DataType::S32,
    u32 => DataType::U32,
    i64 => DataType::S64,
    u64 => DataType::U64,
    f32 => DataType::F32,
    f64 => DataType::F64
);

impl NativeType for bool {
    const DTYPE: DataType = DataType::Pred;
    fn write_to(self, out: &mut [u8]) {
        out[0] = self as u8;
    }
    fn read_from(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// An immutable, shaped buffer of little-endian elements.
///
/// The payload is a [`Bytes`], so cloning a literal (e.g. to send it to
/// several peers) never copies element data.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    shape: Shape,
    data: Bytes,
}

impl Literal {
    /// Wrap raw bytes; fails if the length does not match the shape.
    pub fn new(shape: Shape, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() != shape.size_in_bytes() {
            return Err(LockstepError::shape_mismatch(
                format!("literal of shape {shape}"),
                format!("{} bytes", shape.size_in_bytes()),
                format!("{} bytes", data.len()),
            ));
        }
        Ok(Self { shape, data })
    }

    /// Zero-valued buffer of the given shape.
    pub fn zeros(shape: Shape) -> Self {
        let data = Bytes::from(vec![0u8; shape.size_in_bytes()]);
        Self { shape, data }
    }

    /// Buffer filled with the identity element of `op`.
    pub fn identity(shape: Shape, op: ReduceOp) -> Self {
        let data = Bytes::from(identity_slice(shape.element_count(), shape.dtype, op));
        Self { shape, data }
    }

    /// Build a literal from native values laid out row-major.
    pub fn from_vec<T: NativeType>(dims: impl Into<Vec<usize>>, values: Vec<T>) -> Result<Self> {
        let shape = Shape::new(T::DTYPE, dims);
        if values.len() != shape.element_count() {
            return Err(LockstepError::shape_mismatch(
                "literal construction",
                format!("{} elements for {shape}", shape.element_count()),
                format!("{} elements", values.len()),
            ));
        }
        let size = T::DTYPE.size_in_bytes();
        let mut buf = vec![0u8; values.len() * size];
        for (chunk, v) in buf.chunks_exact_mut(size).zip(values) {
            v.write_to(chunk);
        }
        Ok(Self {
            shape,
            data: Bytes::from(buf),
        })
    }

    /// Rank-1 literal from native values.
    pub fn vector<T: NativeType>(values: Vec<T>) -> Self {
        let shape = Shape::new(T::DTYPE, vec![values.len()]);
        let size = T::DTYPE.size_in_bytes();
        let mut buf = vec![0u8; values.len() * size];
        for (chunk, v) in buf.chunks_exact_mut(size).zip(values) {
            v.write_to(chunk);
        }
        Self {
            shape,
            data: Bytes::from(buf),
        }
    }

    /// Scalar literal.
    pub fn scalar<T: NativeType>(value: T) -> Self {
        let mut buf = vec![0u8; T::DTYPE.size_in_bytes()];
        value.write_to(&mut buf);
        Self {
            shape: Shape::scalar(T::DTYPE),
            data: Bytes::from(buf),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DataType {
        self.shape.dtype
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Decode the elements as `T`; fails if `T` is not this literal's type.
    pub fn to_vec<T: NativeType>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype() {
            return Err(LockstepError::shape_mismatch(
                "literal decode",
                T::DTYPE,
                self.dtype(),
            ));
        }
        Ok(self
            .data
            .chunks_exact(T::DTYPE.size_in_bytes())
            .map(T::read_from)
            .collect())
    }

    /// Element-wise `op(self, other)`.
    pub fn elementwise(&self, other: &Literal, op: ReduceOp) -> Result<Literal> {
        if self.shape != other.shape {
            return Err(LockstepError::shape_mismatch(
                format!("{op} operands"),
                &self.shape,
                &other.shape,
            ));
        }
        let mut out = self.data.to_vec();
        reduce_slice(&mut out, &other.data, self.dtype(), op)?;
        Ok(Literal {
            shape: self.shape.clone(),
            data: Bytes::from(out),
        })
    }

    /// Split into `parts` contiguous shards along `dim`.
    pub fn split(&self, dim: usize, parts: usize) -> Result<Vec<Literal>> {
        if dim >= self.shape.rank() || parts == 0 || self.shape.dims[dim] % parts != 0 {
            return Err(LockstepError::shape_mismatch(
                format!("split of {} along dimension {dim}", self.shape),
                format!("a dimension divisible into {parts} shards"),
                self.shape.dims.get(dim).copied().unwrap_or(0),
            ));
        }
        let (outer, extent, inner_bytes) = self.shape.strides_around(dim);
        let shard_extent = extent / parts;
        let shard_bytes = shard_extent * inner_bytes;
        let shard_shape = self.shape.with_dim(dim, shard_extent);

        let mut shards = Vec::with_capacity(parts);
        for k in 0..parts {
            let mut buf = Vec::with_capacity(outer * shard_bytes);
            for o in 0..outer {
                let start = o * extent * inner_bytes + k * shard_bytes;
                buf.extend_from_slice(&self.data[start..start + shard_bytes]);
            }
            shards.push(Literal {
                shape: shard_shape.clone(),
                data: Bytes::from(buf),
            });
        }
        Ok(shards)
    }

    /// Concatenate literals along `dim`, in slice order.
    pub fn concat(parts: &[Literal], dim: usize) -> Result<Literal> {
        let first = parts.first().ok_or_else(|| {
            LockstepError::shape_mismatch("concatenate", "at least one part", "none")
        })?;
        if dim >= first.shape.rank() {
            return Err(LockstepError::shape_mismatch(
                format!("concatenate along dimension {dim}"),
                "a dimension within rank",
                &first.shape,
            ));
        }
        for p in parts {
            let compatible = p.dtype() == first.dtype()
                && p.shape.rank() == first.shape.rank()
                && p.shape
                    .dims
                    .iter()
                    .zip(&first.shape.dims)
                    .enumerate()
                    .all(|(i, (a, b))| i == dim || a == b);
            if !compatible {
                return Err(LockstepError::shape_mismatch(
                    format!("concatenate along dimension {dim}"),
                    &first.shape,
                    &p.shape,
                ));
            }
        }

        let total: usize = parts.iter().map(|p| p.shape.dims[dim]).sum();
        let shape = first.shape.with_dim(dim, total);
        let (outer, _, inner_bytes) = first.shape.strides_around(dim);
        let mut buf = Vec::with_capacity(shape.size_in_bytes());
        for o in 0..outer {
            for p in parts {
                let chunk = p.shape.dims[dim] * inner_bytes;
                buf.extend_from_slice(&p.data[o * chunk..(o + 1) * chunk]);
            }
        }
        Ok(Literal {
            shape,
            data: Bytes::from(buf),
        })
    }

    /// Element-wise type conversion with `as`-cast semantics.
    pub fn convert(&self, dtype: DataType) -> Literal {
        let src = self.dtype();
        let count = self.shape.element_count();
        let mut out = vec![0u8; count * dtype.size_in_bytes()];
        for i in 0..count {
            let raw = &self.data[i * src.size_in_bytes()..(i + 1) * src.size_in_bytes()];
            let value = Scalar::read(src, raw);
            let slot = &mut out[i * dtype.size_in_bytes()..(i + 1) * dtype.size_in_bytes()];
            value.write(dtype, slot);
        }
        Literal {
            shape: Shape::new(dtype, self.shape.dims.clone()),
            data: Bytes::from(out),
        }
    }
}

/// Widened element used by `convert`.
#[derive(Clone, Copy)]
enum Scalar {
    Int(i128),
    Float(f64),
}

impl Scalar {
    fn read(dtype: DataType, raw: &[u8]) -> Scalar {
        match dtype {
            DataType::Pred => Scalar::Int((raw[0] != 0) as i128),
            DataType::S8 => Scalar::Int(i8::read_le(raw) as i128),
            DataType::U8 => Scalar::Int(raw[0] as i128),
            DataType::S32 => Scalar::Int(i32::read_le(raw) as i128),
            DataType::U32 => Scalar::Int(u32::read_le(raw) as i128),
            DataType::S64 => Scalar::Int(i64::read_le(raw) as i128),
            DataType::U64 => Scalar::Int(u64::read_le(raw) as i128),
            DataType::F32 => Scalar::Float(f32::read_le(raw) as f64),
            DataType::F64 => Scalar::Float(f64::read_le(raw)),
        }
    }

    fn write(self, dtype: DataType, out: &mut [u8]) {
        let (int, float) = match self {
            Scalar::Int(i) => (i, i as f64),
            Scalar::Float(f) => (f as i128, f),
        };
        match dtype {
            DataType::Pred => out[0] = (float != 0.0) as u8,
            DataType::S8 => (int as i8).write_le(out),
            DataType::U8 => (int as u8).write_le(out),
            DataType::S32 => (int as i32).write_le(out),
            DataType::U32 => (int as u32).write_le(out),
            DataType::S64 => (int as i64).write_le(out),
            DataType::U64 => (int as u64).write_le(out),
            DataType::F32 => (float as f32).write_le(out),
            DataType::F64 => float.write_le(out),
        }
    }
}
