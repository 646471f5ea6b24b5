//! Simulation parameters, defaults and validation

mod data;
mod validate;
pub mod loader;

pub use data::{pct, GeographyAllocation, SimulationParameters, WaterfallType, ZoneAllocation};
pub use loader::{load_parameters, load_parameters_from_reader};
pub use validate::{validate_parameters, ALLOCATION_TOLERANCE, MAX_INITIAL_INVESTMENT, MAX_TIME_HORIZON};
