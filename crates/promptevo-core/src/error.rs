use thiserror::Error;

use crate::ConfigError;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Population is empty at generation {0}")]
    EmptyPopulation(usize),
}
