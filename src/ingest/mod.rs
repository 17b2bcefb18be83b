pub mod asset;
pub mod multipart;
pub mod spool;
pub mod validator;
