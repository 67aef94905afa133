pub mod cloud;
pub mod context;
pub mod error;
pub mod exec;
pub mod health;
pub mod io;
pub mod jenkins;
pub mod platform;
pub mod sequence;
pub mod step;

pub use error::{ConvergeError, Result};
