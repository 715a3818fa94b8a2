// Oracle Noise Model - seedable Gaussian jitter and NaN dropouts
// Stands in for an imperfect price oracle feeding the control loop

use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub struct OracleNoise {
    rng: ChaCha8Rng,
    sigma: f64,
    dropout_prob: f64,
    pub dropouts: u64,
}

impl OracleNoise {
    pub fn new(rng: ChaCha8Rng, sigma: f64, dropout_prob: f64) -> Self {
        Self {
            rng,
            sigma,
            dropout_prob,
            dropouts: 0,
        }
    }

    /// Reading delivered for a clean differential `clean`.
    pub fn read(&mut self, clean: f64) -> f64 {
        if self.dropout_prob > 0.0 && self.rng.gen::<f64>() < self.dropout_prob {
            self.dropouts += 1;
            return f64::NAN;
        }
        if self.sigma > 0.0 {
            clean + self.sigma * standard_normal(&mut self.rng)
        } else {
            clean
        }
    }
}

/// Box-Muller transform
fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn noise_is_centred_with_requested_spread() {
        let mut noise = OracleNoise::new(ChaCha8Rng::seed_from_u64(7), 0.5, 0.0);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| noise.read(1.0)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        assert!((mean - 1.0).abs() < 0.02, "mean {mean}");
        assert!((var.sqrt() - 0.5).abs() < 0.02, "std {}", var.sqrt());
    }

    #[test]
    fn dropouts_arrive_as_nan_at_requested_rate() {
        let mut noise = OracleNoise::new(ChaCha8Rng::seed_from_u64(1), 0.0, 0.1);
        let nans = (0..10_000).filter(|_| noise.read(0.0).is_nan()).count();
        assert_eq!(nans as u64, noise.dropouts);
        assert!((800..1200).contains(&nans), "dropouts {nans}");
    }

    #[test]
    fn same_seed_same_readings() {
        let mut a = OracleNoise::new(ChaCha8Rng::seed_from_u64(42), 0.1, 0.05);
        let mut b = OracleNoise::new(ChaCha8Rng::seed_from_u64(42), 0.1, 0.05);
        for _ in 0..100 {
            let (x, y) = (a.read(0.0), b.read(0.0));
            assert!(x == y || (x.is_nan() && y.is_nan()));
        }
    }
}
