// Domain layer: models, ports (traits), role policy and workflow services.
// No I/O here beyond what flows through the ports.

pub mod approval;
pub mod model;
pub mod policy;
pub mod ports;
pub mod requisition;
