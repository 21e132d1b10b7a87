pub mod annotation;
pub mod artifacts;
pub mod command;
pub mod file;
pub mod progress;
pub mod streams;
