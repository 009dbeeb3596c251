#![allow(
    clippy::module_inception,
    clippy::new_without_default,
    clippy::too_many_arguments,
    clippy::type_complexity,
)]

#[macro_use]
extern crate log;

#[macro_use]
mod util;

mod backend;
mod command;
mod context;
mod descriptor;
mod device;
mod error;
mod format;
mod gpu;
mod program;
mod provider;
mod render_state;
mod resource;
mod sync;

pub use backend::*;
pub use command::*;
pub use context::*;
pub use descriptor::*;
pub use device::*;
pub use error::*;
pub use format::*;
pub use gpu::*;
pub use program::*;
pub use provider::*;
pub use render_state::*;
pub use resource::*;
pub use sync::*;
pub use util::*;

#[cfg(test)]
mod testing;
