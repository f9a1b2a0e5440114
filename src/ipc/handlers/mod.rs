pub mod classrooms;
pub mod core;
pub mod identity;
pub mod reports;
pub mod settings;
pub mod students;
