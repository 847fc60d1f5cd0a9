//! Mathematical utilities: interpolation, bracketing, magnitude arithmetic.

pub mod interp;
pub mod numeric;
pub mod photometry;

pub use interp::*;
pub use numeric::*;
pub use photometry::*;
