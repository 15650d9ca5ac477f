//! Version specifiers and cascading version resolution
//!
//! - [`spec`]: `major.minor.build[-beta.N]` specifiers with `x` wildcards
//! - [`resolver`]: picks one package version for a query
//! - [`error`]: strict parse errors

pub mod error;
pub mod resolver;
pub mod spec;
