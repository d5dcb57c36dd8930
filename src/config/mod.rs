pub mod catalog;
pub mod presets;
pub mod types;
pub mod validator;
