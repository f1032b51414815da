/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// stats module
//
// writes the results of a run
// - the transmission edges with the locations of both ends
// - a summary row per region
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::{ContagionError, Result};
use crate::network::EpidemicNetwork;
use csv::Writer;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeRecord {
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub state1: String,
    pub state2: String,
}

// one row per transmission edge
pub fn edge_records(network: &EpidemicNetwork) -> Result<Vec<EdgeRecord>> {
    let mut records = Vec::new();
    for (a, b) in network.list_edges() {
        let start = network.region(&a)?.location();
        let end = network.region(&b)?.location();
        records.push(EdgeRecord {
            start_lat: start.latitude,
            start_lon: start.longitude,
            end_lat: end.latitude,
            end_lon: end.longitude,
            state1: a,
            state2: b,
        });
    }
    Ok(records)
}

pub struct EdgeLog {
    file_path: PathBuf,
}

impl EdgeLog {
    pub fn new(dir: &Path) -> EdgeLog {
        EdgeLog {
            file_path: dir.join("edges.csv"),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn write(&self, network: &EpidemicNetwork) -> Result<usize> {
        let records = edge_records(network)?;
        write_records(&self.file_path, &records)?;
        Ok(records.len())
    }
}

pub struct RegionLog {
    file_path: PathBuf,
}

impl RegionLog {
    pub fn new(dir: &Path) -> RegionLog {
        RegionLog {
            file_path: dir.join("region_summary.csv"),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn write(&self, network: &EpidemicNetwork) -> Result<usize> {
        let summaries: Vec<_> = network.regions().map(|r| r.summary()).collect();
        write_records(&self.file_path, &summaries)?;
        Ok(summaries.len())
    }
}

// headers come from the record field names
fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush().map_err(ContagionError::from)
}
