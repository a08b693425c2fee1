mod prelude;

pub mod codecs;
pub mod error;
pub mod format;
pub mod ports;

mod pipeline;
pub use pipeline::*;

mod types;
pub use types::*;

pub use crate::codecs::*;
pub use crate::error::*;
pub use crate::format::*;
pub use crate::ports::*;
