pub mod contracts;
pub mod gateway;
pub mod session;
pub mod simulated;
pub mod tracker;

pub use contracts::*;
pub use gateway::*;
pub use session::*;
pub use simulated::*;
pub use tracker::*;
