pub mod advance;
pub mod expense;
pub mod profile;
