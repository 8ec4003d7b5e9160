mod literal;
mod shape;

pub use literal::{Literal, NativeType};
pub use shape::Shape;
