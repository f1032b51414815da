/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// data_management module
//
// functions to read and write from file system
// - the yaml parameter file and its scenarios
// - the csv table of regions that seeds the registry
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::{ContagionError, Result};
use crate::network::NetworkConfig;
use crate::population::{Individual, Susceptible};
use crate::world::{Location, Region};
use log::{info, LevelFilter};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use yaml_rust::{Yaml, YamlLoader};

// rates used when the parameter file gives none
const DEFAULT_REMOVAL_RATE: f64 = 0.4;
const DEFAULT_CONTACT_RATE: f64 = 0.0005;

// -------------------------------- File paths -------------------------------------------------------------
pub struct ModelDataStore {
    model_root: PathBuf,
    parameter_file: PathBuf,
    scenario_dir: PathBuf,
}

impl ModelDataStore {
    // create file paths starting at model_root
    // fails if root or parameter file does not exist
    // the scenario folder is recreated from scratch
    pub fn new<P: AsRef<Path>>(model_root: P) -> Result<ModelDataStore> {
        let model_root = model_root.as_ref().to_path_buf();
        if !model_root.is_dir() {
            return Err(ContagionError::Config(format!(
                "model root {} is not a directory",
                model_root.display()
            )));
        }
        let parameter_file = model_root.join("parms.yaml");
        if !parameter_file.is_file() {
            return Err(ContagionError::Config(format!(
                "parameter file {} not found",
                parameter_file.display()
            )));
        }

        let scenario_dir = model_root.join("Scenarios");
        if scenario_dir.exists() {
            fs::remove_dir_all(&scenario_dir)?;
        }
        fs::create_dir(&scenario_dir)?;
        info!("model root {}", model_root.display());

        Ok(ModelDataStore {
            model_root,
            parameter_file,
            scenario_dir,
        })
    }

    pub fn get_model_parms(&self) -> Result<ModelParameters> {
        let parm_string = fs::read_to_string(&self.parameter_file)?;
        ModelParameters::from_yaml(&parm_string, &self.model_root)
    }

    fn get_scenario_directory(&self, scenario_number: usize) -> PathBuf {
        self.scenario_dir
            .join(format!("scenario_{:04}", scenario_number))
    }

    pub fn create_scenario_directory(&self, scenario_number: usize) -> Result<PathBuf> {
        let dir_full_path = self.get_scenario_directory(scenario_number);
        if !dir_full_path.exists() {
            fs::create_dir(&dir_full_path)?;
        }
        Ok(dir_full_path)
    }
}

// ----------------------------- Region loading -------------------------------------------------------------
#[derive(Debug, Deserialize)]
struct RegionRecord {
    #[serde(alias = "State")]
    name: String,
    #[serde(alias = "Latitude")]
    latitude: f64,
    #[serde(alias = "Longitude")]
    longitude: f64,
    #[serde(alias = "Population")]
    population: u64,
}

pub struct RegionRegistry {
    pub regions: HashMap<String, Region>,
    pub names: Vec<String>, // file order
}

// reads the region table - every person gets an id that is unique across all regions
pub fn load_regions<P: AsRef<Path>>(
    path: P,
    removal_rate: f64,
    contact_rate: f64,
) -> Result<RegionRegistry> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut regions = HashMap::new();
    let mut names = Vec::new();
    let mut next_id: u64 = 0;
    for record in reader.deserialize() {
        let record: RegionRecord = record?;
        if regions.contains_key(&record.name) {
            return Err(ContagionError::InvalidRegion(format!(
                "region '{}' appears more than once in {}",
                record.name,
                path.as_ref().display()
            )));
        }
        let people: Vec<Individual> = (next_id..next_id + record.population)
            .map(Individual::new)
            .collect();
        next_id += record.population;
        let region = Region::new(
            &record.name,
            Susceptible::new(people)?,
            removal_rate,
            contact_rate,
            Location::new(record.latitude, record.longitude),
        )?;
        names.push(record.name.clone());
        regions.insert(record.name, region);
    }
    info!(
        "{} regions loaded with {} people from {}",
        names.len(),
        next_id,
        path.as_ref().display()
    );
    Ok(RegionRegistry { regions, names })
}

// ----------------------------- Policy input -------------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyInput {
    pub region: String,
    pub isolation: f64,
    pub maskwearing: f64,
    pub vaccination: f64,
    pub lockdown: bool,
}

// ----------------------------- Scenario parameters -------------------------------------------------------
//
//  Scenario parameters manage a series of runs each differing by one value of the sensitivity variable
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SensitivityVariable {
    ContagionThreshold,
    LockdownTransmissionProbability,
    ContactRate,
    RemovalRate,
    Seed,
}
impl fmt::Display for SensitivityVariable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl FromStr for SensitivityVariable {
    type Err = ContagionError;

    fn from_str(s: &str) -> Result<SensitivityVariable> {
        match s {
            "contagion_threshold" => Ok(SensitivityVariable::ContagionThreshold),
            "lockdown_transmission_probability" => {
                Ok(SensitivityVariable::LockdownTransmissionProbability)
            }
            "contact_rate" => Ok(SensitivityVariable::ContactRate),
            "removal_rate" => Ok(SensitivityVariable::RemovalRate),
            "seed" => Ok(SensitivityVariable::Seed),
            _ => Err(ContagionError::Config(format!(
                "unknown scenario variable '{}'",
                s
            ))),
        }
    }
}

impl SensitivityVariable {
    fn check(&self, value: f64) -> Result<()> {
        let valid = match self {
            SensitivityVariable::ContagionThreshold | SensitivityVariable::Seed => {
                value >= 0.0 && value.fract() == 0.0
            }
            SensitivityVariable::LockdownTransmissionProbability
            | SensitivityVariable::ContactRate
            | SensitivityVariable::RemovalRate => (0.0..=1.0).contains(&value),
        };
        if valid {
            Ok(())
        } else {
            Err(ContagionError::Config(format!(
                "scenario value {} is not valid for {}",
                value, self
            )))
        }
    }
}

// everything one run needs
#[derive(Debug, Clone)]
pub struct ScenarioParms {
    pub number: usize, // 1 - based
    pub seed: Option<u64>,
    pub patient_zero: Option<String>,
    pub regions_file: PathBuf,
    pub removal_rate: f64,
    pub contact_rate: f64,
    pub network: NetworkConfig,
    pub policies: Vec<PolicyInput>,
}

#[derive(Debug)]
pub struct ModelParameters {
    pub model_name: String,
    pub model_description: String,
    pub log_level: Option<LevelFilter>,
    regions_file: PathBuf,
    seed: Option<u64>,
    patient_zero: Option<String>,
    removal_rate: f64,
    contact_rate: f64,
    network: NetworkConfig,
    policies: Vec<PolicyInput>,
    pub variable: Option<SensitivityVariable>,
    pub value_vector: Vec<f64>,
    current_increment: Option<usize>,
}

impl ModelParameters {
    // relative paths in the document are resolved against model_root
    pub fn from_yaml(source: &str, model_root: &Path) -> Result<ModelParameters> {
        let docs = YamlLoader::load_from_str(source)?;
        // there can be multiple docs in Yaml file.  Only the first one interests us.
        let doc = docs
            .first()
            .ok_or_else(|| ContagionError::Config(String::from("parameter file is empty")))?;

        let model_name = optional_str(doc, "model_name")?.unwrap_or("contagion");
        let model_description = optional_str(doc, "model_description")?.unwrap_or("");
        let log_level = match optional_str(doc, "log_level")? {
            Some(level) => Some(LevelFilter::from_str(level).map_err(|_| {
                ContagionError::Config(format!("unknown log level '{}'", level))
            })?),
            None => None,
        };
        let regions_file = model_root.join(optional_str(doc, "regions_file")?.unwrap_or("regions.csv"));
        let seed = optional_u64(doc, "seed")?;
        let patient_zero = optional_str(doc, "patient_zero")?.map(String::from);

        // parse rates ------------------------------------------------------------
        let rates = &doc["rates"];
        let removal_rate = optional_f64(rates, "removal_rate")?.unwrap_or(DEFAULT_REMOVAL_RATE);
        let contact_rate = optional_f64(rates, "contact_rate")?.unwrap_or(DEFAULT_CONTACT_RATE);

        // parse network parms ----------------------------------------------------
        let np = &doc["network"];
        let defaults = NetworkConfig::default();
        let network = NetworkConfig {
            contagion_threshold: optional_u64(np, "contagion_threshold")?
                .map_or(defaults.contagion_threshold, |t| t as usize),
            lockdown_transmission_probability: optional_f64(np, "lockdown_transmission_probability")?
                .unwrap_or(defaults.lockdown_transmission_probability),
            lockdown_penalty: optional_f64(np, "lockdown_penalty")?
                .unwrap_or(defaults.lockdown_penalty),
            distance_metric: match optional_str(np, "distance_metric")? {
                Some(metric) => metric.parse()?,
                None => defaults.distance_metric,
            },
        };
        let p = network.lockdown_transmission_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ContagionError::Config(format!(
                "lockdown_transmission_probability {} must be within 0..=1",
                p
            )));
        }

        let policies = parse_policies(&doc["policies"])?;

        // parse - Scenario parms ---------------------------------------------------
        let sp = &doc["scenario_parms"];
        let (variable, value_vector) = match optional_str(sp, "scenario_variable")? {
            Some(name) => {
                let variable: SensitivityVariable = name.parse()?;
                let values = sp["scenario_values"].as_vec().ok_or_else(|| {
                    ContagionError::Config(String::from("'scenario_values' must be a list"))
                })?;
                let mut value_vector = Vec::with_capacity(values.len());
                for v in values {
                    let value = as_number(v).ok_or_else(|| {
                        ContagionError::Config(String::from("'scenario_values' must be numbers"))
                    })?;
                    variable.check(value)?;
                    value_vector.push(value);
                }
                (Some(variable), value_vector)
            }
            None => (None, Vec::new()),
        };

        Ok(ModelParameters {
            model_name: String::from(model_name),
            model_description: String::from(model_description),
            log_level,
            regions_file,
            seed,
            patient_zero,
            removal_rate,
            contact_rate,
            network,
            policies,
            variable,
            value_vector,
            current_increment: None,
        })
    }

    pub fn scenario_count(&self) -> usize {
        self.value_vector.len().max(1)
    }
}

impl fmt::Display for ModelParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Model name {}\nModel description {}\nRegions {}\nRates a={} r={}",
            self.model_name,
            self.model_description,
            self.regions_file.display(),
            self.removal_rate,
            self.contact_rate
        )?;
        if let Some(variable) = self.variable {
            write!(
                f,
                "\nSensitivity analysis on {} with values {:?}",
                variable, self.value_vector
            )?;
        }
        Ok(())
    }
}

// the Iterator trait for scenario parameters issues
// a sequence of ScenarioParms each one differing only by
// the value of the variable being sensitivity tested
impl Iterator for ModelParameters {
    type Item = ScenarioParms;

    fn next(&mut self) -> Option<ScenarioParms> {
        let increment = self.current_increment.map_or(0, |i| i + 1);
        self.current_increment = Some(increment);
        if increment >= self.scenario_count() {
            return None;
        }

        let mut scenario = ScenarioParms {
            number: increment + 1,
            seed: self.seed,
            patient_zero: self.patient_zero.clone(),
            regions_file: self.regions_file.clone(),
            removal_rate: self.removal_rate,
            contact_rate: self.contact_rate,
            network: self.network,
            policies: self.policies.clone(),
        };

        if let Some(variable) = self.variable {
            let value = self.value_vector[increment];
            match variable {
                SensitivityVariable::ContagionThreshold => {
                    scenario.network.contagion_threshold = value as usize
                }
                SensitivityVariable::LockdownTransmissionProbability => {
                    scenario.network.lockdown_transmission_probability = value
                }
                SensitivityVariable::ContactRate => scenario.contact_rate = value,
                SensitivityVariable::RemovalRate => scenario.removal_rate = value,
                SensitivityVariable::Seed => scenario.seed = Some(value as u64),
            }
        }
        Some(scenario)
    }
}

// ----------------------------- yaml helpers -------------------------------------------------------------
fn is_absent(v: &Yaml) -> bool {
    v.is_badvalue() || v.is_null()
}

// yaml keeps integers and reals apart - both are fine as numbers
fn as_number(v: &Yaml) -> Option<f64> {
    match v {
        Yaml::Integer(i) => Some(*i as f64),
        Yaml::Real(_) => v.as_f64(),
        _ => None,
    }
}

fn optional_str<'a>(node: &'a Yaml, key: &str) -> Result<Option<&'a str>> {
    let v = &node[key];
    if is_absent(v) {
        return Ok(None);
    }
    v.as_str()
        .map(Some)
        .ok_or_else(|| ContagionError::Config(format!("'{}' must be a string", key)))
}

fn optional_f64(node: &Yaml, key: &str) -> Result<Option<f64>> {
    let v = &node[key];
    if is_absent(v) {
        return Ok(None);
    }
    as_number(v)
        .map(Some)
        .ok_or_else(|| ContagionError::Config(format!("'{}' must be a number", key)))
}

fn optional_u64(node: &Yaml, key: &str) -> Result<Option<u64>> {
    let v = &node[key];
    if is_absent(v) {
        return Ok(None);
    }
    match v.as_i64() {
        Some(i) if i >= 0 => Ok(Some(i as u64)),
        _ => Err(ContagionError::Config(format!(
            "'{}' must be a non-negative integer",
            key
        ))),
    }
}

fn optional_bool(node: &Yaml, key: &str) -> Result<Option<bool>> {
    let v = &node[key];
    if is_absent(v) {
        return Ok(None);
    }
    v.as_bool()
        .map(Some)
        .ok_or_else(|| ContagionError::Config(format!("'{}' must be true or false", key)))
}

// policies:
//   Ohio: { isolation: 3, maskwearing: 2, vaccination: 1, lockdown: true }
// knobs left out stay at 1, lockdown at false
fn parse_policies(node: &Yaml) -> Result<Vec<PolicyInput>> {
    if is_absent(node) {
        return Ok(Vec::new());
    }
    let hash = node
        .as_hash()
        .ok_or_else(|| ContagionError::Config(String::from("'policies' must be a mapping")))?;
    let mut policies = Vec::with_capacity(hash.len());
    for (key, value) in hash.iter() {
        let region = key
            .as_str()
            .ok_or_else(|| ContagionError::Config(String::from("policy keys must be region names")))?;
        policies.push(PolicyInput {
            region: String::from(region),
            isolation: optional_f64(value, "isolation")?.unwrap_or(1.0),
            maskwearing: optional_f64(value, "maskwearing")?.unwrap_or(1.0),
            vaccination: optional_f64(value, "vaccination")?.unwrap_or(1.0),
            lockdown: optional_bool(value, "lockdown")?.unwrap_or(false),
        });
    }
    Ok(policies)
}
