/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// population module
//
// individuals and the three SIR compartments that hold them
// an individual lives in exactly one compartment - moving it means moving the value
//
////////////////////////////////////////////////////////////////////////////////////

use crate::error::{ContagionError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

// an infective individual may only recover after this many days of infection
pub const RECOVERABLE_AFTER_DAYS: u32 = 14;

// Individual ---------------------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Individual {
    pub id: u64,
    // None while susceptible or removed
    pub infection_age: Option<u32>,
}

impl Individual {
    pub fn new(id: u64) -> Individual {
        Individual {
            id,
            infection_age: None,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self.infection_age {
            Some(age) => age > RECOVERABLE_AFTER_DAYS,
            None => false,
        }
    }
}

// Compartment -------------------------------------------------------------------------------------
// the BTreeMap keeps iteration in id order so seeded draws are reproducible
#[derive(Debug)]
struct Compartment {
    label: &'static str,
    people: BTreeMap<u64, Individual>,
}

impl Compartment {
    fn new(label: &'static str) -> Compartment {
        Compartment {
            label,
            people: BTreeMap::new(),
        }
    }

    fn insert(&mut self, person: Individual) -> Result<()> {
        if self.people.contains_key(&person.id) {
            return Err(ContagionError::DuplicateIndividual(person.id, self.label));
        }
        self.people.insert(person.id, person);
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Result<Individual> {
        self.people
            .remove(&id)
            .ok_or(ContagionError::MissingIndividual(id, self.label))
    }

    // shuffle the eligible ids and take a prefix
    // equivalent to n independent uniform draws without replacement
    fn remove_random_where<R, F>(&mut self, n: usize, rng: &mut R, eligible: F) -> Vec<Individual>
    where
        R: Rng + ?Sized,
        F: Fn(&Individual) -> bool,
    {
        let mut ids: Vec<u64> = self
            .people
            .values()
            .filter(|p| eligible(p))
            .map(|p| p.id)
            .collect();
        ids.shuffle(rng);
        ids.truncate(n);
        ids.iter()
            .filter_map(|id| self.people.remove(id))
            .collect()
    }

    fn len(&self) -> usize {
        self.people.len()
    }

    #[cfg(test)]
    fn contains(&self, id: u64) -> bool {
        self.people.contains_key(&id)
    }
}

// Susceptible -------------------------------------------------------------------------------------
#[derive(Debug)]
pub struct Susceptible(Compartment);

impl Susceptible {
    pub fn new(people: Vec<Individual>) -> Result<Susceptible> {
        let mut compartment = Compartment::new("susceptible");
        for person in people {
            compartment.insert(person)?;
        }
        Ok(Susceptible(compartment))
    }

    pub fn remove(&mut self, id: u64) -> Result<Individual> {
        self.0.remove(id)
    }

    // n larger than the population takes everyone
    pub fn remove_random<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> Vec<Individual> {
        if n >= self.0.len() {
            let everyone = std::mem::take(&mut self.0.people);
            return everyone.into_iter().map(|(_, p)| p).collect();
        }
        self.0.remove_random_where(n, rng, |_| true)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    #[cfg(test)]
    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.0.people.values()
    }
}

// Infective ---------------------------------------------------------------------------------------
#[derive(Debug)]
pub struct Infective(Compartment);

impl Default for Infective {
    fn default() -> Infective {
        Infective(Compartment::new("infective"))
    }
}

impl Infective {
    pub fn new() -> Infective {
        Infective::default()
    }

    // the infection clock starts at zero on entry
    pub fn add(&mut self, mut person: Individual) -> Result<()> {
        person.infection_age = Some(0);
        self.0.insert(person)
    }

    pub fn add_all(&mut self, people: Vec<Individual>) -> Result<()> {
        for person in people {
            self.add(person)?;
        }
        Ok(())
    }

    /// Removes up to `n` recoverable members chosen uniformly at random.
    ///
    /// Only members whose infection age exceeds [`RECOVERABLE_AFTER_DAYS`] are eligible; when fewer
    /// than `n` qualify the result holds just those. Returned individuals have their age cleared.
    pub fn remove_random_recoverable<R: Rng + ?Sized>(
        &mut self,
        n: usize,
        rng: &mut R,
    ) -> Vec<Individual> {
        if n == 0 {
            return Vec::new();
        }
        let mut removed = self
            .0
            .remove_random_where(n, rng, Individual::is_recoverable);
        for person in removed.iter_mut() {
            person.infection_age = None;
        }
        removed
    }

    pub fn advance_day(&mut self) {
        for person in self.0.people.values_mut() {
            person.infection_age = Some(person.infection_age.map_or(1, |age| age + 1));
        }
    }

    pub fn recoverable_count(&self) -> usize {
        self.0
            .people
            .values()
            .filter(|p| p.is_recoverable())
            .count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.0.people.values()
    }
}

// Removed -----------------------------------------------------------------------------------------
// terminal - nothing leaves this compartment
#[derive(Debug)]
pub struct Removed(Compartment);

impl Default for Removed {
    fn default() -> Removed {
        Removed(Compartment::new("removed"))
    }
}

impl Removed {
    pub fn new() -> Removed {
        Removed::default()
    }

    pub fn add(&mut self, mut person: Individual) -> Result<()> {
        person.infection_age = None;
        self.0.insert(person)
    }

    pub fn add_all(&mut self, people: Vec<Individual>) -> Result<()> {
        for person in people {
            self.add(person)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Individual> {
        self.0.people.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn people(ids: std::ops::Range<u64>) -> Vec<Individual> {
        ids.map(Individual::new).collect()
    }

    fn aged(id: u64, age: u32) -> Individual {
        Individual {
            id,
            infection_age: Some(age),
        }
    }

    #[test]
    fn susceptible_rejects_duplicate_ids() {
        let err = Susceptible::new(vec![Individual::new(1), Individual::new(1)]).unwrap_err();
        assert!(matches!(err, ContagionError::DuplicateIndividual(1, _)));
    }

    #[test]
    fn susceptible_remove_missing_fails() {
        let mut sus = Susceptible::new(people(0..3)).unwrap();
        assert!(sus.remove(1).is_ok());
        assert!(matches!(
            sus.remove(1),
            Err(ContagionError::MissingIndividual(1, _))
        ));
    }

    #[test]
    fn susceptible_remove_random_takes_distinct_members() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sus = Susceptible::new(people(0..10)).unwrap();
        let taken = sus.remove_random(4, &mut rng);
        assert_eq!(taken.len(), 4);
        assert_eq!(sus.len(), 6);
        let ids: BTreeSet<u64> = taken.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| !sus.contains(*id)));
    }

    #[test]
    fn susceptible_remove_random_caps_at_population() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sus = Susceptible::new(people(0..4)).unwrap();
        assert_eq!(sus.remove_random(2, &mut rng).len(), 2);
        assert_eq!(sus.remove_random(10, &mut rng).len(), 2);
        assert!(sus.is_empty());
        assert!(sus.remove_random(1, &mut rng).is_empty());
    }

    #[test]
    fn infective_add_sets_age_zero_and_rejects_duplicates() {
        let mut inf = Infective::new();
        inf.add(Individual::new(5)).unwrap();
        assert_eq!(inf.iter().next().unwrap().infection_age, Some(0));
        assert!(matches!(
            inf.add(Individual::new(5)),
            Err(ContagionError::DuplicateIndividual(5, _))
        ));
        assert_eq!(inf.len(), 1);
    }

    #[test]
    fn infective_advance_day_ages_everyone() {
        let mut inf = Infective::new();
        inf.add_all(people(0..3)).unwrap();
        inf.advance_day();
        inf.advance_day();
        assert!(inf.iter().all(|p| p.infection_age == Some(2)));
    }

    #[test]
    fn recovery_needs_more_than_fourteen_days() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut inf = Infective::new();
        inf.add_all(people(0..2)).unwrap();
        for _ in 0..RECOVERABLE_AFTER_DAYS {
            assert!(inf.remove_random_recoverable(2, &mut rng).is_empty());
            inf.advance_day();
        }
        // age 14 is still not recoverable
        assert!(inf.remove_random_recoverable(2, &mut rng).is_empty());
        inf.advance_day();
        assert_eq!(inf.recoverable_count(), 2);
        let removed = inf.remove_random_recoverable(1, &mut rng);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].infection_age, None);
        assert_eq!(inf.len(), 1);
    }

    #[test]
    fn recoverable_draw_is_partial_when_few_qualify() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut inf = Infective(Compartment::new("infective"));
        inf.0.insert(aged(1, 20)).unwrap();
        inf.0.insert(aged(2, 3)).unwrap();
        inf.0.insert(aged(3, 15)).unwrap();
        let removed = inf.remove_random_recoverable(5, &mut rng);
        let ids: BTreeSet<u64> = removed.iter().map(|p| p.id).collect();
        assert_eq!(ids, [1, 3].iter().cloned().collect());
        assert_eq!(inf.len(), 1);
        assert_eq!(inf.iter().next().unwrap().id, 2);
    }

    #[test]
    fn removed_clears_age() {
        let mut rem = Removed::new();
        rem.add(aged(9, 30)).unwrap();
        assert_eq!(rem.iter().next().unwrap().infection_age, None);
        assert!(rem.add(Individual::new(9)).is_err());
    }

    #[test]
    fn same_seed_same_draw() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut sus = Susceptible::new(people(0..50)).unwrap();
            let mut ids: Vec<u64> = sus.remove_random(10, &mut rng).iter().map(|p| p.id).collect();
            ids.sort();
            ids
        };
        assert_eq!(draw(99), draw(99));
    }
}
