//! Small data structures shared by the class file layer and the analyzer

mod escape;
mod offset_vec;

pub use escape::*;
pub use offset_vec::*;
