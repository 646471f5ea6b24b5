//! JSON parameter file loader

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::SimulationParameters;
use crate::error::EngineResult;

/// Load a parameter set from a JSON file; missing keys fall back to defaults
pub fn load_parameters(path: &Path) -> EngineResult<SimulationParameters> {
    let file = File::open(path)?;
    load_parameters_from_reader(BufReader::new(file))
}

/// Load a parameter set from any reader producing JSON
pub fn load_parameters_from_reader<R: Read>(reader: R) -> EngineResult<SimulationParameters> {
    let params = serde_json::from_reader(reader)?;
    Ok(params)
}
