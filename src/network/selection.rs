// target selection
//
// lowest score wins; a tie on score goes to the nearest candidate,
// and a tie on distance is settled by a uniform draw

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub score: f64,
    pub distance: f64,
}

// returns the index of the chosen candidate, None when there is none to choose
pub fn select_target<R: Rng + ?Sized>(candidates: &[Candidate], rng: &mut R) -> Option<usize> {
    let min_score = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::INFINITY, f64::min);
    let best: Vec<usize> = (0..candidates.len())
        .filter(|i| candidates[*i].score == min_score)
        .collect();
    if best.len() <= 1 {
        return best.first().cloned();
    }

    let min_distance = best
        .iter()
        .map(|i| candidates[*i].distance)
        .fold(f64::INFINITY, f64::min);
    let finalists: Vec<usize> = best
        .into_iter()
        .filter(|i| candidates[*i].distance == min_distance)
        .collect();
    if finalists.len() == 1 {
        return finalists.first().cloned();
    }
    finalists.choose(rng).cloned()
}
