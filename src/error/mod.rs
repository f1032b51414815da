/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// error module
//
// every failure the model can report to its caller
//
////////////////////////////////////////////////////////////////////////////////////

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContagionError {
    #[error("individual {0} is already in the {1} compartment")]
    DuplicateIndividual(u64, &'static str),

    #[error("individual {0} is not in the {1} compartment")]
    MissingIndividual(u64, &'static str),

    #[error("unknown region '{0}'")]
    UnknownRegion(String),

    #[error("region '{0}' is not infected - edges can only join infected regions")]
    NotInfected(String),

    #[error("region '{0}' is already infected")]
    AlreadyInfected(String),

    #[error("region '{0}' cannot be joined to itself")]
    SelfEdge(String),

    #[error("invalid region: {0}")]
    InvalidRegion(String),

    #[error("{name} = {value} is outside {min}..={max} for region '{region}'")]
    OutOfRange {
        region: String,
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] yaml_rust::ScanError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ContagionError>;
