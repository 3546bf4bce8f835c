mod common;
mod persistence;
mod tournament;
