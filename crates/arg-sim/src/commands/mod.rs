pub mod sample;
pub mod validate;
pub mod version;
