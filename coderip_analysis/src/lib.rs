//! Static helpers over behavior bodies and their markup descriptions.

pub mod markup;
pub mod syntax;
