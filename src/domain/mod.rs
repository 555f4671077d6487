// Domain layer: core models and ports (interfaces).

pub mod model;
pub mod node;
pub mod ports;
