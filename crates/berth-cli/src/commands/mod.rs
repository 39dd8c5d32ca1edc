pub mod config;
pub mod rank;
