pub mod page;
pub mod patient;
