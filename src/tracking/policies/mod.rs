/// Domain policies encoding precedence rules
pub mod affectedness;

pub use affectedness::AffectednessPolicy;
