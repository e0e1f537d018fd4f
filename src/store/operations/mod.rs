pub mod anomalies;
pub mod attempts;
pub mod config_versions;
pub mod lessons;
pub mod mastery;
pub mod questions;
pub mod ratings;
pub mod students;
