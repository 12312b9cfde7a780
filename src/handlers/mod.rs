pub mod config;
pub mod debug;

pub use config::*;
pub use debug::*;
