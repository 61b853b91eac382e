//! Local persistence: the SQLite system of record and training capture.

pub mod capture;
pub mod learning;

pub use capture::TrainingCapture;
pub use learning::LearningStore;
