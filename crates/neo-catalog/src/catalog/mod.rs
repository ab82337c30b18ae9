//! Row-to-entity mapping and internal id assignment.

pub mod fields;
pub mod identity;

pub use fields::{AsteroidFields, ClassFields, OrbitElements};
pub use identity::IdentityResolver;
