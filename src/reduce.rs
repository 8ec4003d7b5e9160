//! Element-wise reduction primitives over little-endian byte buffers, shared
//! by the reduction collectives and the local `binary` instruction.

use crate::error::{LockstepError, Result};
use crate::types::{DataType, ReduceOp};

/// Types that support the four reduction operations.
pub(crate) trait Reducible: Copy + 'static {
    fn reduce(a: Self, b: Self, op: ReduceOp) -> Self;
}

macro_rules! impl_reducible {
    (int: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a.wrapping_add(b),
                        ReduceOp::Prod => a.wrapping_mul(b),
                        ReduceOp::Min => a.min(b),
                        ReduceOp::Max => a.max(b),
                    }
                }
            }
        )*
    };
    // Min and max follow `total_cmp`, so -0.0 < +0.0 and the result never
    // depends on operand order.
    (float: $($ty:ty),*) => {
        $(
            impl Reducible for $ty {
                #[inline]
                fn reduce(a: Self, b: Self, op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => a + b,
                        ReduceOp::Prod => a * b,
                        ReduceOp::Min => if b.total_cmp(&a).is_lt() { b } else { a },
                        ReduceOp::Max => if b.total_cmp(&a).is_gt() { b } else { a },
                    }
                }
            }
        )*
    };
}

impl_reducible!(int: i8, i32, i64, u8, u32, u64);
impl_reducible!(float: f32, f64);

/// Read/write a value from a little-endian byte slice (alignment-safe).
pub(crate) trait LeBytes: Sized + Copy {
    const SIZE: usize;
    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_le_bytes {
    ($($ty:ty),*) => {
        $(
            impl LeBytes for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Self::from_le_bytes(raw)
                }
                #[inline]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_bytes!(i8, i32, i64, u8, u32, u64, f32, f64);

/// Element-wise `dst[i] = op(dst[i], src[i])` on buffers of `dtype` elements.
///
/// `dst` and `src` must have the same length, a multiple of the element size.
pub(crate) fn reduce_slice(dst: &mut [u8], src: &[u8], dtype: DataType, op: ReduceOp) -> Result<()> {
    if dst.len() != src.len() {
        return Err(LockstepError::shape_mismatch(
            format!("{op} reduction"),
            format!("{} bytes", dst.len()),
            format!("{} bytes", src.len()),
        ));
    }
    match dtype {
        DataType::Pred => reduce_pred(dst, src, op),
        DataType::S8 => reduce_slice_typed::<i8>(dst, src, op),
        DataType::U8 => reduce_slice_typed::<u8>(dst, src, op),
        DataType::S32 => reduce_slice_typed::<i32>(dst, src, op),
        DataType::U32 => reduce_slice_typed::<u32>(dst, src, op),
        DataType::S64 => reduce_slice_typed::<i64>(dst, src, op),
        DataType::U64 => reduce_slice_typed::<u64>(dst, src, op),
        DataType::F32 => reduce_slice_typed::<f32>(dst, src, op),
        DataType::F64 => reduce_slice_typed::<f64>(dst, src, op),
    }
    Ok(())
}

fn reduce_slice_typed<T: Reducible + LeBytes>(dst: &mut [u8], src: &[u8], op: ReduceOp) {
    for (d, s) in dst.chunks_exact_mut(T::SIZE).zip(src.chunks_exact(T::SIZE)) {
        let r = T::reduce(T::read_le(d), T::read_le(s), op);
        r.write_le(d);
    }
}

/// Predicates reduce as booleans: sum/max are OR, prod/min are AND.
fn reduce_pred(dst: &mut [u8], src: &[u8], op: ReduceOp) {
    for (d, &s) in dst.iter_mut().zip(src) {
        let (a, b) = (*d != 0, s != 0);
        let r = match op {
            ReduceOp::Sum | ReduceOp::Max => a || b,
            ReduceOp::Prod | ReduceOp::Min => a && b,
        };
        *d = r as u8;
    }
}

/// Returns a byte buffer of `count` elements filled with the identity element
/// for the given op+dtype combination.
///
/// Identity values: Sum→0, Prod→1, Min→type::MAX, Max→type::MIN.
pub(crate) fn identity_slice(count: usize, dtype: DataType, op: ReduceOp) -> Vec<u8> {
    match dtype {
        DataType::Pred => {
            let v = matches!(op, ReduceOp::Prod | ReduceOp::Min) as u8;
            vec![v; count]
        }
        DataType::S8 => identity_slice_typed::<i8>(count, op),
        DataType::U8 => identity_slice_typed::<u8>(count, op),
        DataType::S32 => identity_slice_typed::<i32>(count, op),
        DataType::U32 => identity_slice_typed::<u32>(count, op),
        DataType::S64 => identity_slice_typed::<i64>(count, op),
        DataType::U64 => identity_slice_typed::<u64>(count, op),
        DataType::F32 => identity_slice_typed::<f32>(count, op),
        DataType::F64 => identity_slice_typed::<f64>(count, op),
    }
}

/// Identity element for a reduction operation.
trait Identity: LeBytes {
    fn identity(op: ReduceOp) -> Self;
}

macro_rules! impl_identity {
    (int: $($ty:ty),*) => {
        $(
            impl Identity for $ty {
                #[inline]
                fn identity(op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => 0,
                        ReduceOp::Prod => 1,
                        ReduceOp::Min => <$ty>::MAX,
                        ReduceOp::Max => <$ty>::MIN,
                    }
                }
            }
        )*
    };
    (float: $($ty:ty),*) => {
        $(
            impl Identity for $ty {
                #[inline]
                fn identity(op: ReduceOp) -> Self {
                    match op {
                        ReduceOp::Sum => 0.0,
                        ReduceOp::Prod => 1.0,
                        ReduceOp::Min => <$ty>::INFINITY,
                        ReduceOp::Max => <$ty>::NEG_INFINITY,
                    }
                }
            }
        )*
    };
}

impl_identity!(int: i8, i32, i64, u8, u32, u64);
impl_identity!(float: f32, f64);

fn identity_slice_typed<T: Identity>(count: usize, op: ReduceOp) -> Vec<u8> {
    let val = T::identity(op);
    let mut buf = vec![0u8; count * T::SIZE];
    for chunk in buf.chunks_exact_mut(T::SIZE) {
        val.write_le(chunk);
    }
    buf
}
