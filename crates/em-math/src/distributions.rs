//! Distribution sampling helpers.

use em_core::{errors::Error, Real, Result};
use rand::Rng;
use rand_distr::{Distribution, Exp};

/// Draw from `Exp(rate)` by rejection until the draw lies in
/// `(lower, upper)`.
///
/// The caller must ensure the interval has positive probability under the
/// exponential, otherwise the rejection loop will not terminate.
pub fn trunc_exp<R: Rng + ?Sized>(
    lower: Real,
    upper: Real,
    rate: Real,
    rng: &mut R,
) -> Result<Real> {
    let dist = Exp::new(rate)
        .map_err(|_| Error::InvalidArgument(format!("exponential rate must be positive, got {rate}")))?;
    let mut result = dist.sample(rng);
    while result < lower || result > upper {
        result = dist.sample(rng);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random_numbers::Reng;
    use approx::assert_relative_eq;

    #[test]
    fn draws_stay_in_support() {
        let mut rng = Reng::new(20240117);
        for _ in 0..1000 {
            let x = trunc_exp(0.5, 2.0, 1.3, &mut rng).unwrap();
            assert!((0.5..=2.0).contains(&x), "draw {x} outside (0.5, 2.0)");
        }
    }

    #[test]
    fn empirical_mean_matches_truncated_exponential() {
        // mean of Exp(rate) truncated to (0, b):
        //   1/rate - b * exp(-rate*b) / (1 - exp(-rate*b))
        let rate: Real = 0.7;
        let b: Real = 3.0;
        let expected = 1.0 / rate - b * (-rate * b).exp() / (1.0 - (-rate * b).exp());
        let mut rng = Reng::new(987654321);
        let n = 200_000;
        let mut sum = 0.0;
        for _ in 0..n {
            sum += trunc_exp(0.0, b, rate, &mut rng).unwrap();
        }
        assert_relative_eq!(sum / n as Real, expected, max_relative = 1e-2);
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let mut rng = Reng::new(1);
        assert!(trunc_exp(0.0, 1.0, 0.0, &mut rng).is_err());
        assert!(trunc_exp(0.0, 1.0, -1.0, &mut rng).is_err());
    }
}
