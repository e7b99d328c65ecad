pub mod conversion;
pub mod precision;
