pub mod change;
pub mod config;
pub mod todo;

pub use change::*;
pub use config::*;
pub use todo::*;
