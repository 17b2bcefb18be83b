pub mod pipeline;
pub mod repository;
