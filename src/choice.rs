//! Randomized choice and time helpers
//!
//! Weighted picks use inverse-CDF sampling over a running cumulative sum:
//! draw `n` uniformly in `[0, total)` and return the first index whose
//! cumulative weight reaches `n`. Ties go to the lower index.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pick an index from a weight distribution.
///
/// Returns `None` when the weights are empty or do not sum to a positive,
/// finite number. Zero-weight entries are never returned.
pub fn pick_from_dist<R: Rng + ?Sized>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    let mut cumulatives = Vec::with_capacity(weights.len());
    let mut total = 0.0;
    for &w in weights {
        total += w;
        cumulatives.push(total);
    }
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }

    let n = rng.random::<f64>() * total;
    cumulatives
        .iter()
        .zip(weights)
        .position(|(&c, &w)| w > 0.0 && c >= n)
        // Float drift can leave n a hair above the last cumulative
        .or_else(|| weights.iter().rposition(|&w| w > 0.0))
}

/// Pick an index other than `exclude`, resampling until one comes up.
///
/// If every unit of weight sits on `exclude`, resampling could never
/// finish; in that case the pick is uniform among the other indices.
/// Returns `None` for distributions with fewer than two entries.
pub fn pick_another<R: Rng + ?Sized>(rng: &mut R, weights: &[f64], exclude: usize) -> Option<usize> {
    if weights.len() < 2 {
        return None;
    }
    let others: f64 = weights
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != exclude)
        .map(|(_, &w)| w)
        .sum();
    if !(others > 0.0) {
        let mut pick = rng.random_range(0..weights.len() - 1);
        if pick >= exclude {
            pick += 1;
        }
        return Some(pick);
    }

    loop {
        let pick = pick_from_dist(rng, weights)?;
        if pick != exclude {
            return Some(pick);
        }
    }
}

/// Distribution over `n` entries where the first has probability `prob`
/// and the rest share the remainder equally
pub fn make_dist(n: usize, prob: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let other = (1.0 - prob) / (n - 1) as f64;
            (0..n).map(|i| if i == 0 { prob } else { other }).collect()
        }
    }
}

/// Normal density with mean `m` and spread `r` at `x`
pub fn norm(m: f64, r: f64, x: f64) -> f64 {
    use std::f64::consts::{E, PI};
    let a = 1.0 / (r * (2.0 * PI).sqrt());
    let b = -((x - m) * (x - m)) / (2.0 * r * r);
    a * E.powf(b)
}

/// Integer time in `[min, max]` skewed toward the low end of the window
pub fn skewed_random_time<R: Rng + ?Sized>(rng: &mut R, min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    let span = (max - min + 1) as usize;
    let weights: Vec<f64> = (0..span)
        .map(|i| norm(0.2, 0.3, i as f64 / span as f64))
        .collect();
    let offset = pick_from_dist(rng, &weights).unwrap_or(0);
    min + offset as u64
}

/// Uniform time in `[min, max)`
pub fn uniform_time<R: Rng + ?Sized>(rng: &mut R, min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    rng.random_range(min..max)
}

/// Longest duration a configuration may name (one year)
pub const MAX_MILLIS: u64 = 365 * 24 * 3_600_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert value \"{0}\" to milliseconds")]
pub struct TimeParseError(pub String);

/// Round to whole milliseconds, rejecting negative, non-finite and
/// out-of-range values
fn whole_millis(ms: f64, raw: impl fmt::Display) -> Result<u64, TimeParseError> {
    if ms.is_finite() && (0.0..=MAX_MILLIS as f64).contains(&ms) {
        Ok(ms.round() as u64)
    } else {
        Err(TimeParseError(raw.to_string()))
    }
}

/// A duration as written in configuration: raw milliseconds or a string
/// with a unit suffix (`ms`, `s`, `m`, `h` and their long forms)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSpec {
    Millis(f64),
    Text(String),
}

impl TimeSpec {
    pub fn to_millis(&self) -> Result<u64, TimeParseError> {
        match self {
            TimeSpec::Millis(ms) => whole_millis(*ms, ms),
            TimeSpec::Text(s) => to_milliseconds(s),
        }
    }
}

impl From<u64> for TimeSpec {
    fn from(ms: u64) -> Self {
        TimeSpec::Millis(ms as f64)
    }
}

impl From<&str> for TimeSpec {
    fn from(s: &str) -> Self {
        TimeSpec::Text(s.to_string())
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::Millis(ms) => write!(f, "{ms}ms"),
            TimeSpec::Text(s) => f.write_str(s),
        }
    }
}

/// Parse `"250"`, `"250ms"`, `"1.5s"`, `"2min"`, `"1hr"` into milliseconds
pub fn to_milliseconds(s: &str) -> Result<u64, TimeParseError> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return Err(TimeParseError(s.to_string()));
    }

    let factor = match unit {
        "" | "ms" => 1.0,
        "s" | "sec" | "secs" => 1_000.0,
        "m" | "min" | "mins" => 60_000.0,
        "h" | "hr" | "hrs" => 3_600_000.0,
        _ => return Err(TimeParseError(s.to_string())),
    };
    let value: f64 = number.parse().map_err(|_| TimeParseError(s.to_string()))?;
    whole_millis(value * factor, s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_all_weight_on_one_index() {
        let mut rng = Pcg32::seed_from_u64(7);
        let weights = [0.0, 0.0, 3.0, 0.0];
        for _ in 0..500 {
            assert_eq!(pick_from_dist(&mut rng, &weights), Some(2));
        }
    }

    #[test]
    fn test_invalid_distribution() {
        let mut rng = Pcg32::seed_from_u64(7);
        assert_eq!(pick_from_dist(&mut rng, &[]), None);
        assert_eq!(pick_from_dist(&mut rng, &[0.0, 0.0]), None);
    }

    #[test]
    fn test_weighted_frequencies() {
        let mut rng = Pcg32::seed_from_u64(42);
        let weights = [0.5, 0.25, 0.25];
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[pick_from_dist(&mut rng, &weights).unwrap()] += 1;
        }
        assert!((4_500..5_500).contains(&counts[0]), "{counts:?}");
        assert!((2_000..3_000).contains(&counts[1]), "{counts:?}");
    }

    #[test]
    fn test_pick_another_never_returns_excluded() {
        let mut rng = Pcg32::seed_from_u64(3);
        // Entire distribution on the excluded index
        let weights = [0.0, 1.0, 0.0];
        for _ in 0..200 {
            let pick = pick_another(&mut rng, &weights, 1).unwrap();
            assert_ne!(pick, 1);
        }
        assert_eq!(pick_another(&mut rng, &[1.0], 0), None);
    }

    #[test]
    fn test_make_dist() {
        let dist = make_dist(3, 0.5);
        assert_eq!(dist, vec![0.5, 0.25, 0.25]);
        assert_eq!(make_dist(1, 0.3), vec![1.0]);
    }

    #[test]
    fn test_skewed_time_in_window() {
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..100 {
            let t = skewed_random_time(&mut rng, 500, 3000);
            assert!((500..=3000).contains(&t));
        }
        assert_eq!(skewed_random_time(&mut rng, 800, 800), 800);
    }

    #[test]
    fn test_to_milliseconds_units() {
        assert_eq!(to_milliseconds("250"), Ok(250));
        assert_eq!(to_milliseconds("250ms"), Ok(250));
        assert_eq!(to_milliseconds("1.5s"), Ok(1500));
        assert_eq!(to_milliseconds("2sec"), Ok(2000));
        assert_eq!(to_milliseconds("3mins"), Ok(180_000));
        assert_eq!(to_milliseconds("1hr"), Ok(3_600_000));
        assert!(to_milliseconds("soon").is_err());
        assert!(to_milliseconds("5 days").is_err());
        assert!(to_milliseconds("1.2.3s").is_err());
        assert!(to_milliseconds("5 ms").is_err());
        assert!(to_milliseconds("2 s").is_err());
    }

    #[test]
    fn test_time_spec_deserialize() {
        let specs: Vec<TimeSpec> = serde_json::from_str(r#"[1500, "2s"]"#).unwrap();
        assert_eq!(specs[0].to_millis(), Ok(1500));
        assert_eq!(specs[1].to_millis(), Ok(2000));
        assert!(TimeSpec::Millis(-1.0).to_millis().is_err());
        assert!(TimeSpec::Millis(1e30).to_millis().is_err());
        assert!(TimeSpec::Text("9999999h".into()).to_millis().is_err());
        assert_eq!(TimeSpec::Text("8760h".into()).to_millis(), Ok(MAX_MILLIS));
    }
}
