pub mod activities;
pub mod attendance;
pub mod core;
pub mod courses;
pub mod grades;
pub mod reports;
pub mod setup;
pub mod students;
pub mod transfer;
