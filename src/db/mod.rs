pub mod entities;
pub mod models;
pub mod sample_store;
