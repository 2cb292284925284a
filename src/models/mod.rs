//! PSP shape families.
//!
//! Every family implements [`ShapeModel`]; the fitter and the derived-quantity
//! helpers are generic over it.

pub mod alpha;
pub mod double_exp;
pub mod shape;

pub use alpha::*;
pub use double_exp::*;
pub use shape::*;
