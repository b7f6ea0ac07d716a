//! Builders to construct the scheduler from configuration and collaborators.

pub mod scheduler_builder;

pub use scheduler_builder::SchedulerBuilder;
