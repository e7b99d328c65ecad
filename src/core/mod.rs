pub mod engine;
pub mod funds;
pub mod history;
pub mod order_form;
pub mod requests;
pub mod step_size;
pub mod store;
pub mod validator;
