/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// world module
//
// the world is a set of regions (states, provinces, ...)
// each region runs its own SIR model on its populace
//
// In each day - susceptibles get infected, infectives recover,
// and a region with enough infectives may pass the disease on
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::{ContagionError, Result};
use crate::network::NetworkConfig;
use crate::population::{Individual, Infective, Removed, Susceptible};
use crate::utilities::ceil_count;
use rand::distributions::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::fmt;

// policy knobs run from 1 (no effort) to 10
pub const POLICY_MIN: f64 = 1.0;
pub const POLICY_MAX: f64 = 10.0;
const CONTACT_REDUCTION_PER_POINT: f64 = 0.000002;
const REMOVAL_GAIN_PER_POINT: f64 = 0.25;
// contact rate never reaches exactly zero
const CONTACT_RATE_FLOOR: f64 = 0.000000001;
const REMOVAL_RATE_FLOOR: f64 = 0.1;

// Location ---------------------------------------------------------------------------------------
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Location {
        Location {
            latitude,
            longitude,
        }
    }

    pub fn distance_to(&self, other: &Location) -> f64 {
        ((self.latitude - other.latitude).powi(2) + (self.longitude - other.longitude).powi(2))
            .sqrt()
    }
}

// Region ------------------------------------------------------------------------------------------
#[derive(Debug)]
pub struct Region {
    name: String,
    susceptible: Susceptible,
    infective: Infective,
    removed: Removed,
    removal_rate: f64, // a
    contact_rate: f64, // r
    isolation: f64,
    maskwearing: f64,
    vaccination: f64,
    lockdown: bool,
    location: Location,
    active: bool, // has begun its infection loop
    day: u32,
}

impl Region {
    pub fn new(
        name: &str,
        susceptible: Susceptible,
        removal_rate: f64,
        contact_rate: f64,
        location: Location,
    ) -> Result<Region> {
        if name.trim().is_empty() {
            return Err(ContagionError::InvalidRegion(String::from(
                "region name cannot be empty",
            )));
        }
        check_range(name, "removal_rate", removal_rate, 0.0, 1.0)?;
        check_range(name, "contact_rate", contact_rate, 0.0, 1.0)?;
        // with nobody ever recovering the infection loop would not end
        if removal_rate == 0.0 {
            return Err(ContagionError::InvalidRegion(format!(
                "region '{}' has a zero removal rate",
                name
            )));
        }
        if !location.latitude.is_finite() || !location.longitude.is_finite() {
            return Err(ContagionError::InvalidRegion(format!(
                "region '{}' has a non-finite location",
                name
            )));
        }

        Ok(Region {
            name: String::from(name),
            susceptible,
            infective: Infective::new(),
            removed: Removed::new(),
            removal_rate,
            contact_rate,
            isolation: POLICY_MIN,
            maskwearing: POLICY_MIN,
            vaccination: POLICY_MIN,
            lockdown: false,
            location,
            active: false,
            day: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn location(&self) -> Location {
        self.location
    }
    pub fn removal_rate(&self) -> f64 {
        self.removal_rate
    }
    pub fn contact_rate(&self) -> f64 {
        self.contact_rate
    }
    pub fn policy(&self) -> (f64, f64, f64) {
        (self.isolation, self.maskwearing, self.vaccination)
    }
    pub fn is_locked_down(&self) -> bool {
        self.lockdown
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn day(&self) -> u32 {
        self.day
    }
    #[cfg(test)]
    pub fn susceptible(&self) -> &Susceptible {
        &self.susceptible
    }
    #[cfg(test)]
    pub fn infective(&self) -> &Infective {
        &self.infective
    }
    #[cfg(test)]
    pub fn removed(&self) -> &Removed {
        &self.removed
    }
    pub fn susceptible_count(&self) -> usize {
        self.susceptible.len()
    }
    pub fn infective_count(&self) -> usize {
        self.infective.len()
    }
    #[cfg(test)]
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    // S + I + R - constant for the whole run
    pub fn population(&self) -> usize {
        self.susceptible.len() + self.infective.len() + self.removed.len()
    }

    pub fn distance_to(&self, other: &Region) -> f64 {
        self.location.distance_to(&other.location)
    }

    pub(crate) fn mark_active(&mut self) {
        self.active = true;
    }

    // move one random susceptible into infective
    // returns the id of patient zero or None when there is nobody left to infect
    pub fn seed_patient_zero<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Option<u64>> {
        let ids: Vec<u64> = self.susceptible.iter().map(|p| p.id).collect();
        let id = match ids.choose(rng) {
            Some(id) => *id,
            None => return Ok(None),
        };
        let person = self.susceptible.remove(id)?;
        self.infective.add(person)?;
        Ok(Some(id))
    }

    /// Runs the compartment transitions of one simulated day.
    ///
    /// New infections are `ceil(r * |I| * |S|)` (capped by the susceptible pool) and recoveries are
    /// `ceil(a * |recoverable I|)`. Ageing the infectives is left to [`Region::advance_day`] so the
    /// transmission gate sees the post-transition counts in between.
    pub fn simulate_day<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<DayReport> {
        self.day += 1;

        let newly = ceil_count(
            self.contact_rate * self.infective.len() as f64 * self.susceptible.len() as f64,
        );
        let infected_people: Vec<Individual> = self.susceptible.remove_random(newly, rng);
        let newly_infected = infected_people.len();
        self.infective.add_all(infected_people)?;

        let recoveries = ceil_count(self.removal_rate * self.infective.recoverable_count() as f64);
        let recovered_people = self.infective.remove_random_recoverable(recoveries, rng);
        let recovered = recovered_people.len();
        self.removed.add_all(recovered_people)?;

        Ok(DayReport {
            day: self.day,
            newly_infected,
            recovered,
            susceptible: self.susceptible.len(),
            infective: self.infective.len(),
            removed: self.removed.len(),
        })
    }

    // the contagion gate - above the threshold an open region always transmits,
    // a locked down one only with the lockdown probability (one draw per day)
    pub fn should_transmit<R: Rng + ?Sized>(&self, config: &NetworkConfig, rng: &mut R) -> bool {
        if self.infective.len() <= config.contagion_threshold {
            return false;
        }
        if !self.lockdown {
            return true;
        }
        let draw = Uniform::new(0.0, 1.0).sample(rng);
        draw < config.lockdown_transmission_probability
    }

    pub fn advance_day(&mut self) {
        self.infective.advance_day();
    }

    // isolation and mask wearing cut contact, vaccination speeds removal
    // rates saturate rather than fail
    pub fn apply_policy(&mut self, isolation: f64, maskwearing: f64, vaccination: f64) -> Result<()> {
        check_range(&self.name, "isolation", isolation, POLICY_MIN, POLICY_MAX)?;
        check_range(&self.name, "maskwearing", maskwearing, POLICY_MIN, POLICY_MAX)?;
        check_range(&self.name, "vaccination", vaccination, POLICY_MIN, POLICY_MAX)?;

        self.isolation = isolation;
        self.maskwearing = maskwearing;
        self.vaccination = vaccination;

        let contact_rate = self.contact_rate - (isolation + maskwearing) * CONTACT_REDUCTION_PER_POINT;
        self.contact_rate = contact_rate.max(CONTACT_RATE_FLOOR).min(1.0);

        let removal_rate = self.removal_rate + vaccination * REMOVAL_GAIN_PER_POINT;
        self.removal_rate = removal_rate.max(REMOVAL_RATE_FLOOR).min(1.0);
        Ok(())
    }

    pub fn set_lockdown(&mut self) {
        self.lockdown = true;
    }

    pub fn summary(&self) -> RegionSummary {
        RegionSummary {
            name: self.name.clone(),
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            susceptible: self.susceptible.len(),
            infective: self.infective.len(),
            removed: self.removed.len(),
            days: self.day,
            removal_rate: self.removal_rate,
            contact_rate: self.contact_rate,
            isolation: self.isolation,
            maskwearing: self.maskwearing,
            vaccination: self.vaccination,
            lockdown: self.lockdown,
            infected: self.active,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: S={}, I={}, R={}",
            self.name,
            self.susceptible.len(),
            self.infective.len(),
            self.removed.len()
        )
    }
}

fn check_range(region: &str, name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(ContagionError::OutOfRange {
            region: String::from(region),
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

// outcome of one simulated day, logged by the network
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub day: u32,
    pub newly_infected: usize,
    pub recovered: usize,
    pub susceptible: usize,
    pub infective: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionSummary {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub susceptible: usize,
    pub infective: usize,
    pub removed: usize,
    pub days: u32,
    pub removal_rate: f64,
    pub contact_rate: f64,
    pub isolation: f64,
    pub maskwearing: f64,
    pub vaccination: f64,
    pub lockdown: bool,
    pub infected: bool,
}
