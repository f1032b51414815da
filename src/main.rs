use log::{error, info, LevelFilter};
use rand::seq::SliceRandom;
use std::env;
use std::process;

mod data_management;
mod error;
mod logging;
mod network;
mod population;
mod stats;
mod utilities;
mod world;

use error::{ContagionError, Result};

fn main() {
    // process command line arguments - the model root directory and an optional -v
    let args: Vec<String> = env::args().skip(1).collect();
    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    let model_root = match args.iter().find(|a| !a.starts_with('-')) {
        Some(root) => root.clone(),
        None => {
            eprintln!("usage: contagion <model_root> [-v]");
            process::exit(2);
        }
    };

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let handle = match logging::init(level) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&model_root, verbose, &handle) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(model_root: &str, verbose: bool, handle: &log4rs::Handle) -> Result<()> {
    // The model data store handles all models inputs and outputs
    let model_data_store = data_management::ModelDataStore::new(model_root)?;
    let model_parms = model_data_store.get_model_parms()?;
    if let (Some(level), false) = (model_parms.log_level, verbose) {
        logging::set_level(handle, level)?;
    }

    info!("--------------------Contagion Model-----------------------");
    for line in model_parms.to_string().lines() {
        info!("{}", line);
    }
    info!("Model runs {} scenario(s)", model_parms.scenario_count());

    // loop around scenarios
    for scenario in model_parms {
        info!(
            "Starting scenario {} ------------------------------------------------------------",
            scenario.number
        );
        let scenario_dir = model_data_store.create_scenario_directory(scenario.number)?;
        let network = run_scenario(&scenario)?;

        let edge_log = stats::EdgeLog::new(&scenario_dir);
        let edge_count = edge_log.write(&network)?;
        let region_log = stats::RegionLog::new(&scenario_dir);
        region_log.write(&network)?;
        info!(
            "scenario {}: {} of {} regions infected, {} transmission edges written to {}",
            scenario.number,
            network.infected_names().len(),
            network.region_names().len(),
            edge_count,
            edge_log.file_path().display()
        );
        info!("region summary written to {}", region_log.file_path().display());
    }
    Ok(())
}

// each scenario loads its own registry - runs share no state
fn run_scenario(scenario: &data_management::ScenarioParms) -> Result<network::EpidemicNetwork> {
    let registry = data_management::load_regions(
        &scenario.regions_file,
        scenario.removal_rate,
        scenario.contact_rate,
    )?;
    let rng = utilities::new_rng(scenario.seed);
    let mut network =
        network::EpidemicNetwork::new(registry.regions, registry.names, scenario.network, rng)?;

    // policies go in before the first infection
    for policy in scenario.policies.iter() {
        network.apply_policy(
            &policy.region,
            policy.isolation,
            policy.maskwearing,
            policy.vaccination,
        )?;
        if policy.lockdown {
            network.lockdown(&policy.region)?;
        }
    }

    // pick one unlucky region unless the parameters name one
    let patient_zero = match &scenario.patient_zero {
        Some(name) => name.clone(),
        None => {
            let names = network.region_names().to_vec();
            match names.choose(network.rng()) {
                Some(name) => name.clone(),
                None => {
                    return Err(ContagionError::Config(String::from(
                        "the region table is empty",
                    )))
                }
            }
        }
    };
    network.seed(&patient_zero)?;
    Ok(network)
}
