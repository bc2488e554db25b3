pub mod ask;
pub mod serve;
