//! Column projection with type-widening arithmetic

mod projector;

pub use projector::{Projection, Projector, ValueExpr};
