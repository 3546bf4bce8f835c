pub mod bracket;
mod context;
mod coordinator;
mod manager;

pub use context::TournamentContext;
pub use coordinator::{Coordinator, CoordinatorExit};
pub use manager::{TournamentHandle, TournamentManager};
