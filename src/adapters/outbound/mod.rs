/// Outbound adapters - Infrastructure implementations of outbound ports
pub mod console;
pub mod evaluator;
pub mod filesystem;
pub mod git;
pub mod network;
pub mod persistence;
