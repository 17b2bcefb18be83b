pub mod control;
pub mod core;
pub mod delivery;
pub mod ingest;
pub mod media;
pub mod observability;
pub mod storage;
