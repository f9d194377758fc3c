pub mod assignments;
pub mod core;
pub mod exams;
pub mod homework;
pub mod plan;
pub mod progress;
pub mod session;
pub mod students;
