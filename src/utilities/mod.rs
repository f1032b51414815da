/////////////////////////////////////////////////////////////////////////////////////
//
// Contagion model
//
// utilities module
//
// various functions that can be of use across the app
//
////////////////////////////////////////////////////////////////////////////////////

use rand::rngs::StdRng;
use rand::SeedableRng;

// a single generator drives a whole run so that a fixed seed reproduces it exactly
pub fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

// ceil(x) as a head count - negative and NaN values count as nobody
pub fn ceil_count(x: f64) -> usize {
    if x.is_nan() || x <= 0.0 {
        0
    } else {
        x.ceil() as usize
    }
}
