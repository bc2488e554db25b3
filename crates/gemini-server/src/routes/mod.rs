pub mod ask;
pub mod health;
pub mod models;
