pub mod domains;
pub mod params;
pub mod schemas;
