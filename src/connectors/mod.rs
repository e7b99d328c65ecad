pub mod gateway;
pub mod messages;
pub mod simulated;
pub mod traits;
