#[macro_use]
mod enum_vec;

mod by_ptr;
mod range_set;

pub use by_ptr::*;
pub use enum_vec::*;
pub use range_set::*;
