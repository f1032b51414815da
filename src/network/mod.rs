/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// network module
//
// the epidemic network holds every known region and grows a graph of
// transmission edges as the disease jumps from one region to the next
//
// a region loops one day at a time until it has no infectives left; on days
// when it is contagious it picks the next region to infect, which then runs
// its own loop to completion before the source carries on
//
////////////////////////////////////////////////////////////////////////////////////

mod selection;

pub use selection::{select_target, Candidate};

use crate::error::{ContagionError, Result};
use crate::world::Region;
use log::{debug, info, trace};
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

// Configuration -----------------------------------------------------------------------------------
#[derive(Hash, Debug, Copy, Clone, Eq, PartialEq)]
pub enum DistanceMetric {
    // distance from a candidate to itself - always zero, so distance never separates candidates
    Candidate,
    // distance from the transmitting region to the candidate
    Source,
}
impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl FromStr for DistanceMetric {
    type Err = ContagionError;

    fn from_str(s: &str) -> Result<DistanceMetric> {
        match s {
            "candidate" => Ok(DistanceMetric::Candidate),
            "source" => Ok(DistanceMetric::Source),
            _ => Err(ContagionError::Config(format!(
                "unknown distance metric '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NetworkConfig {
    // a region needs strictly more infectives than this to transmit
    pub contagion_threshold: usize,
    pub lockdown_transmission_probability: f64,
    // added to the score of a candidate that is locked down
    pub lockdown_penalty: f64,
    pub distance_metric: DistanceMetric,
}

impl Default for NetworkConfig {
    fn default() -> NetworkConfig {
        NetworkConfig {
            contagion_threshold: 50,
            lockdown_transmission_probability: 0.1,
            lockdown_penalty: 50.0,
            distance_metric: DistanceMetric::Candidate,
        }
    }
}

// one region's infection loop in progress
// visited holds the names this branch may no longer pick as a target
#[derive(Debug)]
struct Frame {
    region: String,
    visited: BTreeSet<String>,
}

// EpidemicNetwork ---------------------------------------------------------------------------------
pub struct EpidemicNetwork {
    regions: HashMap<String, Region>,
    region_names: Vec<String>, // iteration order for candidate selection
    infected: BTreeSet<String>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
    config: NetworkConfig,
    rng: StdRng,
}

impl EpidemicNetwork {
    pub fn new(
        regions: HashMap<String, Region>,
        region_names: Vec<String>,
        config: NetworkConfig,
        rng: StdRng,
    ) -> Result<EpidemicNetwork> {
        let listed: BTreeSet<&String> = region_names.iter().collect();
        if listed.len() != region_names.len() {
            return Err(ContagionError::InvalidRegion(String::from(
                "region name list contains duplicates",
            )));
        }
        if listed.len() != regions.len() || !listed.iter().all(|n| regions.contains_key(*n)) {
            return Err(ContagionError::InvalidRegion(String::from(
                "region name list does not match the region registry",
            )));
        }
        for (key, region) in regions.iter() {
            if key != region.name() {
                return Err(ContagionError::InvalidRegion(format!(
                    "region '{}' registered under '{}'",
                    region.name(),
                    key
                )));
            }
        }

        Ok(EpidemicNetwork {
            regions,
            region_names,
            infected: BTreeSet::new(),
            adjacency: BTreeMap::new(),
            config,
            rng,
        })
    }

    pub fn region(&self, name: &str) -> Result<&Region> {
        self.regions
            .get(name)
            .ok_or_else(|| ContagionError::UnknownRegion(String::from(name)))
    }

    fn region_mut(&mut self, name: &str) -> Result<&mut Region> {
        self.regions
            .get_mut(name)
            .ok_or_else(|| ContagionError::UnknownRegion(String::from(name)))
    }

    // regions in load order
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        let regions = &self.regions;
        self.region_names.iter().filter_map(move |n| regions.get(n))
    }

    pub fn region_names(&self) -> &[String] {
        &self.region_names
    }

    pub fn infected_names(&self) -> &BTreeSet<String> {
        &self.infected
    }

    #[cfg(test)]
    pub fn neighbours(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.adjacency.get(name)
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    // policies ------------------------------------------------------------------------
    pub fn apply_policy(
        &mut self,
        name: &str,
        isolation: f64,
        maskwearing: f64,
        vaccination: f64,
    ) -> Result<()> {
        let region = self.region_mut(name)?;
        region.apply_policy(isolation, maskwearing, vaccination)?;
        let (isolation, maskwearing, vaccination) = region.policy();
        debug!(
            "policy for {}: isolation {} maskwearing {} vaccination {} -> a {:.4} r {:.9}",
            name,
            isolation,
            maskwearing,
            vaccination,
            region.removal_rate(),
            region.contact_rate()
        );
        Ok(())
    }

    pub fn lockdown(&mut self, name: &str) -> Result<()> {
        self.region_mut(name)?.set_lockdown();
        debug!("{} is in lockdown", name);
        Ok(())
    }

    // edges -------------------------------------------------------------------------------
    pub fn record_edge(&mut self, a: &str, b: &str) -> Result<()> {
        for name in [a, b].iter() {
            if !self.infected.contains(*name) {
                return Err(ContagionError::NotInfected(String::from(*name)));
            }
        }
        if a == b {
            return Err(ContagionError::SelfEdge(String::from(a)));
        }
        self.adjacency
            .entry(String::from(a))
            .or_default()
            .insert(String::from(b));
        self.adjacency
            .entry(String::from(b))
            .or_default()
            .insert(String::from(a));
        Ok(())
    }

    // each unordered pair once, smaller name first
    pub fn list_edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for (name, neighbours) in self.adjacency.iter() {
            for other in neighbours.iter().filter(|other| *other > name) {
                edges.push((name.clone(), other.clone()));
            }
        }
        edges
    }

    // seeding -----------------------------------------------------------------------------

    /// Starts the epidemic in `name`: admits it, draws its patient zero and runs the whole
    /// propagation from there. A region without susceptibles is left untouched.
    pub fn seed(&mut self, name: &str) -> Result<()> {
        if self.infected.contains(name) {
            return Err(ContagionError::AlreadyInfected(String::from(name)));
        }
        if !self.admit(name)? {
            trace!("{} has nobody to infect - seed skipped", name);
            return Ok(());
        }
        info!("patient zero appears in {}", name);
        self.run_infection_loop(name, BTreeSet::new())
    }

    // adds a region to the infected set and gives it a patient zero
    // false when the region has no susceptible to seed
    fn admit(&mut self, name: &str) -> Result<bool> {
        let region = self
            .regions
            .get_mut(name)
            .ok_or_else(|| ContagionError::UnknownRegion(String::from(name)))?;
        if region.susceptible_count() == 0 {
            return Ok(false);
        }
        if region.seed_patient_zero(&mut self.rng)?.is_some() {
            self.infected.insert(String::from(name));
        }
        Ok(true)
    }

    // marks the region active and builds its frame - None if it already ran
    fn activate(&mut self, name: &str, mut visited: BTreeSet<String>) -> Result<Option<Frame>> {
        let region = self.region_mut(name)?;
        if region.is_active() {
            return Ok(None);
        }
        region.mark_active();
        info!("{} begins its infection loop ({})", name, region);
        visited.insert(String::from(name));
        Ok(Some(Frame {
            region: String::from(name),
            visited,
        }))
    }

    /// Runs the infection loop of `name` and, depth first, of every region it infects.
    ///
    /// Does nothing if the region is already active. A transmitting region's target runs to
    /// completion before the source simulates its next day; the traversal is kept on an explicit
    /// stack rather than the call stack.
    pub fn run_infection_loop(&mut self, name: &str, visited: BTreeSet<String>) -> Result<()> {
        let mut stack: Vec<Frame> = match self.activate(name, visited)? {
            Some(frame) => vec![frame],
            None => return Ok(()),
        };

        while let Some(frame) = stack.last() {
            if self.region(&frame.region)?.infective_count() == 0 {
                let region = self.region(&frame.region)?;
                info!(
                    "all removed in {} after {} days (population {})",
                    region,
                    region.day(),
                    region.population()
                );
                stack.pop();
                continue;
            }
            if let Some(child) = self.simulate_day(frame)? {
                stack.push(child);
            }
        }
        Ok(())
    }

    // one day of the source region's loop
    // returns the frame of a newly infected region that must run next
    fn simulate_day(&mut self, frame: &Frame) -> Result<Option<Frame>> {
        let region = self
            .regions
            .get_mut(&frame.region)
            .ok_or_else(|| ContagionError::UnknownRegion(frame.region.clone()))?;
        let report = region.simulate_day(&mut self.rng)?;
        debug!(
            "{} day {}: +{} infected, +{} removed, S={} I={} R={}",
            frame.region,
            report.day,
            report.newly_infected,
            report.recovered,
            report.susceptible,
            report.infective,
            report.removed
        );

        let child = if region.should_transmit(&self.config, &mut self.rng) {
            self.infect_next_region(&frame.region, &frame.visited)?
        } else {
            None
        };

        self.region_mut(&frame.region)?.advance_day();
        Ok(child)
    }

    // candidates are unvisited regions with someone left to infect, in load order
    fn candidates(&self, source: &str, visited: &BTreeSet<String>) -> Result<Vec<Candidate>> {
        let source = self.region(source)?;
        let mut candidates = Vec::new();
        for name in self.region_names.iter() {
            if visited.contains(name) {
                continue;
            }
            let region = self.region(name)?;
            if region.susceptible_count() == 0 {
                continue;
            }
            let distance = match self.config.distance_metric {
                DistanceMetric::Candidate => region.distance_to(region),
                DistanceMetric::Source => source.distance_to(region),
            };
            let penalty = if region.is_locked_down() {
                self.config.lockdown_penalty
            } else {
                0.0
            };
            let ratio = region.infective_count() as f64 / region.susceptible_count() as f64;
            candidates.push(Candidate {
                name: name.clone(),
                score: distance + penalty + ratio,
                distance,
            });
        }
        Ok(candidates)
    }

    // picks and infects the next region
    // the source's visited set is left alone; the child runs with a copy of it
    fn infect_next_region(
        &mut self,
        source: &str,
        visited: &BTreeSet<String>,
    ) -> Result<Option<Frame>> {
        let candidates = self.candidates(source, visited)?;
        let chosen = match select_target(&candidates, &mut self.rng) {
            Some(index) => &candidates[index],
            None => {
                trace!("{} is contagious but has no region left to infect", source);
                return Ok(None);
            }
        };
        let target = chosen.name.clone();

        // an infected region is never infected again
        if !self.infected.contains(&target) && !self.admit(&target)? {
            return Ok(None);
        }
        self.record_edge(source, &target)?;
        info!(
            "{} infects {} (score {:.4})",
            source, target, chosen.score
        );
        self.activate(&target, visited.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::{Individual, Susceptible};
    use crate::utilities::new_rng;
    use crate::world::Location;

    fn build(table: &[(&str, u64, f64, f64)], config: NetworkConfig, seed: u64) -> EpidemicNetwork {
        let mut next_id = 0;
        let mut regions = HashMap::new();
        let mut names = Vec::new();
        for (name, people, lat, lon) in table.iter() {
            let sus =
                Susceptible::new((next_id..next_id + people).map(Individual::new).collect())
                    .unwrap();
            next_id += people;
            let region = Region::new(name, sus, 0.4, 0.0005, Location::new(*lat, *lon)).unwrap();
            regions.insert(String::from(*name), region);
            names.push(String::from(*name));
        }
        EpidemicNetwork::new(regions, names, config, new_rng(Some(seed))).unwrap()
    }

    fn low_threshold() -> NetworkConfig {
        NetworkConfig {
            contagion_threshold: 2,
            ..NetworkConfig::default()
        }
    }

    fn populations(net: &EpidemicNetwork) -> Vec<usize> {
        net.regions().map(|r| r.population()).collect()
    }

    #[test]
    fn new_rejects_mismatched_names() {
        let net = build(&[("A", 1, 0.0, 0.0)], NetworkConfig::default(), 1);
        let regions = net.regions;
        let err = EpidemicNetwork::new(
            regions,
            vec![String::from("B")],
            NetworkConfig::default(),
            new_rng(Some(1)),
        );
        assert!(err.is_err());
    }

    #[test]
    fn record_edge_needs_infected_endpoints() {
        let mut net = build(
            &[("A", 5, 0.0, 0.0), ("B", 5, 1.0, 1.0)],
            NetworkConfig::default(),
            1,
        );
        assert!(matches!(
            net.record_edge("A", "B"),
            Err(ContagionError::NotInfected(_))
        ));
        net.infected.insert(String::from("A"));
        net.infected.insert(String::from("B"));
        net.record_edge("A", "B").unwrap();
        net.record_edge("B", "A").unwrap();
        assert!(matches!(
            net.record_edge("A", "A"),
            Err(ContagionError::SelfEdge(_))
        ));
        assert_eq!(
            net.list_edges(),
            vec![(String::from("A"), String::from("B"))]
        );
        assert!(net.neighbours("B").unwrap().contains("A"));
    }

    #[test]
    fn policy_and_lockdown_need_known_regions() {
        let mut net = build(&[("A", 5, 0.0, 0.0)], NetworkConfig::default(), 1);
        assert!(matches!(
            net.apply_policy("Z", 1.0, 1.0, 1.0),
            Err(ContagionError::UnknownRegion(_))
        ));
        assert!(net.lockdown("Z").is_err());
        net.lockdown("A").unwrap();
        assert!(net.region("A").unwrap().is_locked_down());
    }

    #[test]
    fn seed_unknown_or_twice_fails() {
        let mut net = build(&[("A", 20, 0.0, 0.0)], NetworkConfig::default(), 1);
        assert!(net.seed("Z").is_err());
        net.seed("A").unwrap();
        assert!(matches!(
            net.seed("A"),
            Err(ContagionError::AlreadyInfected(_))
        ));
    }

    #[test]
    fn seed_without_susceptibles_is_no_op() {
        let mut net = build(&[("A", 0, 0.0, 0.0)], NetworkConfig::default(), 1);
        net.seed("A").unwrap();
        assert!(net.infected_names().is_empty());
        assert!(!net.region("A").unwrap().is_active());
    }

    #[test]
    fn single_region_runs_until_everyone_is_removed() {
        let mut net = build(&[("A", 300, 0.0, 0.0)], NetworkConfig::default(), 9);
        net.seed("A").unwrap();
        let a = net.region("A").unwrap();
        assert!(a.is_active());
        assert_eq!(a.infective_count(), 0);
        assert_eq!(a.population(), 300);
        assert!(a.day() > 14);
        assert!(net.list_edges().is_empty());
    }

    #[test]
    fn loop_runs_once_per_region() {
        let mut net = build(&[("A", 100, 0.0, 0.0)], NetworkConfig::default(), 4);
        net.seed("A").unwrap();
        let days = net.region("A").unwrap().day();
        let a = net.region_mut("A").unwrap();
        a.seed_patient_zero(&mut new_rng(Some(1))).unwrap();
        net.run_infection_loop("A", BTreeSet::new()).unwrap();
        assert_eq!(net.region("A").unwrap().day(), days);
    }

    #[test]
    fn epidemic_spreads_across_regions() {
        let table = [
            ("A", 400, 0.0, 0.0),
            ("B", 400, 3.0, 4.0),
            ("C", 400, 6.0, 8.0),
            ("D", 400, 1.0, 1.0),
        ];
        let mut net = build(&table, low_threshold(), 21);
        let before = populations(&net);
        net.seed("A").unwrap();

        assert_eq!(populations(&net), before);
        assert!(net.infected_names().len() > 1);
        for region in net.regions() {
            assert_eq!(region.infective_count(), 0);
            assert_eq!(region.is_active(), net.infected_names().contains(region.name()));
        }

        let edges = net.list_edges();
        assert!(!edges.is_empty());
        let unique: BTreeSet<&(String, String)> = edges.iter().collect();
        assert_eq!(unique.len(), edges.len());
        for (a, b) in edges.iter() {
            assert!(a < b);
            assert!(net.infected_names().contains(a));
            assert!(net.infected_names().contains(b));
        }
    }

    #[test]
    fn fixed_seed_reproduces_the_run() {
        let table = [
            ("A", 200, 0.0, 0.0),
            ("B", 200, 3.0, 4.0),
            ("C", 200, 6.0, 8.0),
        ];
        let run = || {
            let mut net = build(&table, low_threshold(), 77);
            net.seed("B").unwrap();
            let days: Vec<u32> = net.regions().map(|r| r.day()).collect();
            (net.list_edges(), days)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn candidates_skip_visited_and_exhausted_regions() {
        let mut net = build(
            &[
                ("A", 10, 0.0, 0.0),
                ("B", 10, 3.0, 4.0),
                ("C", 0, 1.0, 1.0),
                ("D", 10, 2.0, 2.0),
            ],
            NetworkConfig::default(),
            1,
        );
        net.lockdown("D").unwrap();
        let visited: BTreeSet<String> = [String::from("A")].iter().cloned().collect();
        let candidates = net.candidates("A", &visited).unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B", "D"]);
        // degenerate distance - only the lockdown penalty separates them
        assert_eq!(candidates[0].distance, 0.0);
        assert_eq!(candidates[0].score, 0.0);
        assert_eq!(candidates[1].score, 50.0);
    }

    #[test]
    fn source_distance_enters_the_score() {
        let config = NetworkConfig {
            distance_metric: DistanceMetric::Source,
            ..NetworkConfig::default()
        };
        let net = build(&[("A", 10, 0.0, 0.0), ("B", 10, 3.0, 4.0)], config, 1);
        let visited: BTreeSet<String> = [String::from("A")].iter().cloned().collect();
        let candidates = net.candidates("A", &visited).unwrap();
        assert_eq!(candidates[0].distance, 5.0);
        assert_eq!(candidates[0].score, 5.0);
    }

    #[test]
    fn transmission_never_targets_visited_region() {
        let mut net = build(
            &[("A", 10, 0.0, 0.0), ("B", 10, 3.0, 4.0)],
            NetworkConfig::default(),
            3,
        );
        net.admit("A").unwrap();
        let visited: BTreeSet<String> =
            [String::from("A"), String::from("B")].iter().cloned().collect();
        assert!(net.infect_next_region("A", &visited).unwrap().is_none());
        assert!(net.list_edges().is_empty());

        let visited: BTreeSet<String> = [String::from("A")].iter().cloned().collect();
        let frame = net.infect_next_region("A", &visited).unwrap().unwrap();
        assert_eq!(frame.region, "B");
        assert!(frame.visited.contains("A") && frame.visited.contains("B"));
        assert_eq!(net.region("B").unwrap().infective_count(), 1);
        assert_eq!(
            net.list_edges(),
            vec![(String::from("A"), String::from("B"))]
        );
    }

    #[test]
    fn infected_region_is_not_reseeded() {
        let mut net = build(
            &[("A", 10, 0.0, 0.0), ("B", 10, 3.0, 4.0), ("C", 10, 1.0, 1.0)],
            NetworkConfig::default(),
            3,
        );
        net.admit("A").unwrap();
        net.admit("C").unwrap();
        net.activate("C", BTreeSet::new()).unwrap();
        let visited: BTreeSet<String> =
            [String::from("A"), String::from("B")].iter().cloned().collect();
        // C is the only candidate, is already infected and active
        assert!(net.infect_next_region("A", &visited).unwrap().is_none());
        assert_eq!(net.region("C").unwrap().infective_count(), 1);
        assert!(net.neighbours("A").unwrap().contains("C"));
    }

    #[test]
    fn finished_region_with_susceptibles_stays_a_candidate() {
        let sus = |ids: std::ops::Range<u64>| {
            Susceptible::new(ids.map(Individual::new).collect()).unwrap()
        };
        let mut regions = HashMap::new();
        regions.insert(
            String::from("A"),
            Region::new("A", sus(0..200), 0.4, 0.0005, Location::new(0.0, 0.0)).unwrap(),
        );
        // B has no contacts - its patient zero recovers without infecting anyone
        regions.insert(
            String::from("B"),
            Region::new("B", sus(200..250), 0.4, 0.0, Location::new(3.0, 4.0)).unwrap(),
        );
        let names = vec![String::from("A"), String::from("B")];
        let mut net =
            EpidemicNetwork::new(regions, names, low_threshold(), new_rng(Some(5))).unwrap();
        net.admit("A").unwrap();

        let visited: BTreeSet<String> = [String::from("A")].iter().cloned().collect();
        let frame = net.infect_next_region("A", &visited).unwrap().unwrap();
        assert_eq!(frame.region, "B");
        assert_eq!(visited.len(), 1);
        while net.region("B").unwrap().infective_count() > 0 {
            assert!(net.simulate_day(&frame).unwrap().is_none());
        }
        let b = net.region("B").unwrap();
        assert_eq!(
            (b.susceptible_count(), b.infective_count(), b.removed_count()),
            (49, 0, 1)
        );

        let candidates = net.candidates("A", &visited).unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B"]);
        // B already ran - choosing it again only records the edge
        assert!(net.infect_next_region("A", &visited).unwrap().is_none());
        assert_eq!(net.region("B").unwrap().susceptible_count(), 49);
        assert_eq!(net.region("B").unwrap().infective_count(), 0);
        assert_eq!(
            net.list_edges(),
            vec![(String::from("A"), String::from("B"))]
        );
    }
}
