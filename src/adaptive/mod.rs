pub mod config;
pub mod engine;
pub mod models;
pub mod monitoring;
pub mod processor;
pub mod progress;
pub mod question_bank;
pub mod selector;
pub mod types;
pub mod weak_areas;
