pub mod actions;
pub mod call;
pub mod config;
pub mod error;
pub mod projection;
pub mod reducer;
pub mod registry;
pub mod state;
pub mod types;

pub use actions::*;
pub use call::*;
pub use config::*;
pub use error::*;
pub use projection::*;
pub use reducer::*;
pub use registry::*;
pub use state::*;
pub use types::*;
