/// Ports module defining interfaces for hexagonal architecture
///
/// The pipeline is driven by CLI triggers calling use cases directly, so
/// only outbound (driven) ports are defined here.
pub mod outbound;
