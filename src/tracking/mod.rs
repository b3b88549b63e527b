/// Tracking domain layer - pure business logic with no I/O
pub mod domain;
pub mod policies;
pub mod services;
