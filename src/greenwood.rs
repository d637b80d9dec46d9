//! The Greenwood cochlear position/frequency function
//!
//! Greenwood, J. Acoust. Soc. Am. 87(6):2592-2605, 1990.
//!
//! `f = A * (10^(a*x) - k)`, with `x` the distance from the cochlear apex in
//! metres.

use crate::map::Mapper;
use serde::{Deserialize, Serialize};

/// Species-specific constants of the Greenwood function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Scale `A`, in Hz.
    pub scale: f64,
    /// Slope `a`, per metre.
    pub slope: f64,
    /// Integration constant `k`.
    pub k: f64,
}

/// Human cochlea.
pub const HUMAN: Species = Species {
    scale: 165.4,
    slope: 0.06e3,
    k: 1.0,
};

/// Characteristic frequency (Hz) at `place` metres from the apex.
pub fn place_to_frequency(place: f64, species: &Species) -> f64 {
    species.scale * (10f64.powf(species.slope * place) - species.k)
}

/// Place (metres from the apex) whose characteristic frequency is `frequency`.
///
/// Frequencies at or below `-A*k` have no place and yield NaN.
pub fn frequency_to_place(frequency: f64, species: &Species) -> f64 {
    (frequency / species.scale + species.k).log10() / species.slope
}

/// Convert many places through `mapper`, keeping input order.
pub fn places_to_frequencies(places: &[f64], species: &Species, mapper: &Mapper) -> Vec<f64> {
    mapper.run(places.iter().copied(), |x| place_to_frequency(x, species))
}

/// Convert many frequencies through `mapper`, keeping input order.
pub fn frequencies_to_places(frequencies: &[f64], species: &Species, mapper: &Mapper) -> Vec<f64> {
    mapper.run(frequencies.iter().copied(), |f| frequency_to_place(f, species))
}
