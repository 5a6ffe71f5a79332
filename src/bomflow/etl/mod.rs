pub mod config;
pub mod dates;
pub mod error;
pub mod flatten;
pub mod io;
pub mod masterbom;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod status;
pub mod writer;

pub use error::{EtlError, Result};
