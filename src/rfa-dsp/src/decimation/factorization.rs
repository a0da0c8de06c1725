// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Splitting a decimation ratio into cascade stages.

use std::collections::BTreeMap;

use crate::error::{DspError, DspResult};

/// Factors above this count get merged back together.
const MAX_STAGES: usize = 5;
/// Factors below this count get split further when possible.
const MIN_STAGES: usize = 4;

/// A factorization `n = a1^p1 * a2^p2 * ...` aiming for a small factor sum
/// with four or five factors, which keeps every cascade stage short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factorization {
    powers: BTreeMap<usize, usize>,
    factors: Vec<usize>,
}

impl Factorization {
    /// Factorize `n >= 1`. `1` factorizes to itself.
    pub fn optimal(n: usize) -> DspResult<Self> {
        if n == 0 {
            return Err(DspError::invalid("cannot factorize 0"));
        }
        if n == 1 {
            return Ok(Self::from_powers(BTreeMap::from([(1, 1)])));
        }

        let mut powers = least_sum_factorization(n);
        let stages = count(&powers);
        if stages == 1 {
            return Ok(Self::from_powers(powers));
        }
        if increase_factor_count(&mut powers, stages) && stages != count(&powers) {
            return Ok(Self::from_powers(powers));
        }
        decrease_factor_count(&mut powers, stages);
        Ok(Self::from_powers(powers))
    }

    fn from_powers(powers: BTreeMap<usize, usize>) -> Self {
        let factors = powers
            .iter()
            .rev()
            .flat_map(|(&f, &p)| std::iter::repeat(f).take(p))
            .collect();
        Self { powers, factors }
    }

    /// Every factor, largest first.
    pub fn factors(&self) -> &[usize] {
        &self.factors
    }

    /// Factor to power map.
    pub fn powers(&self) -> &BTreeMap<usize, usize> {
        &self.powers
    }

    /// Number of distinct factors.
    pub fn distinct(&self) -> usize {
        self.powers.len()
    }

    pub fn product(&self) -> usize {
        self.factors.iter().product()
    }

    pub fn sum(&self) -> usize {
        self.factors.iter().sum()
    }
}

fn count(powers: &BTreeMap<usize, usize>) -> usize {
    powers.values().sum()
}

fn bump(powers: &mut BTreeMap<usize, usize>, factor: usize) {
    *powers.entry(factor).or_insert(0) += 1;
}

/// Smallest divisor of `n` that is not below `sqrt(n)`; `n` itself when
/// `n` is prime.
pub fn next_factor(n: usize) -> usize {
    let mut factor = (n as f64).sqrt().ceil() as usize;
    while factor <= n {
        if factor > 0 && n % factor == 0 {
            return factor;
        }
        factor += 1;
    }
    n
}

/// Repeatedly peel off the divisor closest to the square root.
pub fn least_sum_factorization(mut n: usize) -> BTreeMap<usize, usize> {
    let mut powers = BTreeMap::new();
    while n > 1 {
        let factor = next_factor(n);
        while n != 1 && n % factor == 0 {
            bump(&mut powers, factor);
            n /= factor;
        }
    }
    powers
}

/// Split the greatest composite factor while there are fewer than four
/// factors. Returns `true` once a split happened or every factor is prime.
fn increase_factor_count(powers: &mut BTreeMap<usize, usize>, mut stages: usize) -> bool {
    let mut increased = false;
    let Some(mut greatest) = powers.keys().next_back().copied() else {
        return false;
    };

    while stages < MIN_STAGES {
        let f = greatest;
        let a = next_factor(f);
        let b = f / a;
        if a == 1 || b == 1 {
            match powers.range(..f).next_back() {
                Some((&lower, _)) => {
                    greatest = lower;
                    continue;
                }
                None => return true,
            }
        }

        match powers.get(&f).copied() {
            Some(power) if power > 1 => {
                powers.insert(f, power - 1);
            }
            _ => {
                powers.remove(&f);
            }
        }
        bump(powers, a);
        bump(powers, b);

        stages = count(powers);
        greatest = match powers.keys().next_back() {
            Some(&g) => g,
            None => break,
        };
        increased = true;
    }
    increased
}

/// Merge the smallest and greatest factors while there are more than five.
fn decrease_factor_count(powers: &mut BTreeMap<usize, usize>, mut stages: usize) {
    while stages > MAX_STAGES {
        let Some((min, min_power)) = powers.pop_first() else {
            return;
        };
        let (max, max_power) = powers.pop_last().unwrap_or((min, min_power));

        powers.insert(min * max, 1);
        if min != max {
            if min_power > 1 {
                powers.insert(min, min_power - 1);
            }
            if max_power > 1 {
                powers.insert(max, max_power - 1);
            }
        } else {
            powers.insert(min, min_power - 2);
        }
        stages = count(powers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_factor_is_closest_to_square_root() {
        assert_eq!(next_factor(12), 4);
        assert_eq!(next_factor(16), 4);
        assert_eq!(next_factor(41), 41);
        assert_eq!(next_factor(2), 2);
    }

    #[test]
    fn least_sum_factors() {
        let numbers = [2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 15, 16, 18, 20, 32, 41, 48, 64];
        let sums = [2, 3, 4, 5, 5, 7, 6, 6, 7, 7, 8, 8, 8, 9, 10, 41, 11, 12];
        for (&n, &sum) in numbers.iter().zip(&sums) {
            let f = Factorization::optimal(n).unwrap();
            assert_eq!(f.product(), n, "factors of {} multiply back", n);
            assert_eq!(f.sum(), sum, "factor sum of {}: {:?}", n, f.factors());
        }
    }

    #[test]
    fn factors_are_largest_first() {
        let f = Factorization::optimal(48).unwrap();
        assert_eq!(f.factors(), &[4, 3, 2, 2]);
        assert_eq!(f.distinct(), 3);
        let f = Factorization::optimal(64).unwrap();
        assert_eq!(f.factors(), &[4, 4, 2, 2]);
    }

    #[test]
    fn large_powers_are_merged_down() {
        for n in [256, 1024, 4096, 720] {
            let f = Factorization::optimal(n).unwrap();
            assert_eq!(f.product(), n);
            assert!(f.factors().len() <= MAX_STAGES, "{}: {:?}", n, f.factors());
        }
    }

    #[test]
    fn one_and_zero() {
        assert_eq!(Factorization::optimal(1).unwrap().factors(), &[1]);
        assert!(Factorization::optimal(0).is_err());
    }

    #[test]
    fn many_numbers_multiply_back() {
        for n in 1..2000 {
            let f = Factorization::optimal(n).unwrap();
            assert_eq!(f.product(), n, "{:?}", f.factors());
        }
    }
}
