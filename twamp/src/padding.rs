//! Padding-size selection, per §3's "Padding policy".
//!
//! A probe's padding byte count is drawn uniformly at random from a finite
//! multiset (`padmix`); the default mixes mostly small with a handful of
//! near-MTU sizes, approximating an IMIX traffic distribution at a 7:4:1 ratio.

use rand::seq::SliceRandom;

#[derive(Debug, Clone)]
pub struct PadMix(Vec<usize>);

impl PadMix {
    /// A single explicit padding size, given as `--padding N`.
    pub fn fixed(n: usize) -> Self {
        Self(vec![n])
    }

    /// IMIX-approximating default for IPv6 targets.
    pub fn default_v6() -> Self {
        Self(vec![0, 0, 0, 0, 0, 0, 0, 514, 514, 514, 514, 1438])
    }

    /// IMIX-approximating default for IPv4 targets.
    pub fn default_v4() -> Self {
        Self(vec![8, 8, 8, 8, 8, 8, 8, 534, 534, 534, 534, 1458])
    }

    /// Draws one padding size uniformly at random from the mix.
    pub fn sample(&self) -> usize {
        *self
            .0
            .choose(&mut rand::thread_rng())
            .expect("padmix is never empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_always_returns_the_same_value() {
        let mix = PadMix::fixed(42);
        for _ in 0..10 {
            assert_eq!(mix.sample(), 42);
        }
    }

    #[test]
    fn default_v4_samples_stay_within_the_mix() {
        let mix = PadMix::default_v4();
        for _ in 0..100 {
            let sample = mix.sample();
            assert!(sample == 8 || sample == 534);
        }
    }

    #[test]
    fn default_v6_samples_stay_within_the_mix() {
        let mix = PadMix::default_v6();
        for _ in 0..100 {
            let sample = mix.sample();
            assert!(sample == 0 || sample == 514 || sample == 1438);
        }
    }
}
