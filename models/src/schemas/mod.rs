pub mod events;
pub mod tournament;
