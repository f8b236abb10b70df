use serde::ser::{Serialize, SerializeStruct, Serializer};

/// A numeric sample space a heuristic can rate.
///
/// The normalization step is carried out in double precision regardless of
/// the concrete sample type.
pub trait Sample: Copy + PartialOrd + Serialize {
    /// The zero of the sample space, treated as an extreme when scoring.
    const ZERO: Self;
    /// Sentinel for the initial lowest value, larger than any real sample.
    const RANGE_MAX: Self;

    fn as_f64(self) -> f64;
}

impl Sample for u64 {
    const ZERO: Self = 0;
    const RANGE_MAX: Self = u64::MAX;

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for i64 {
    const ZERO: Self = 0;
    const RANGE_MAX: Self = i64::MAX;

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    const ZERO: Self = 0.0;
    const RANGE_MAX: Self = f64::MAX;

    fn as_f64(self) -> f64 {
        self
    }
}

/// A network heuristic holding the highest and lowest values observed for
/// one dimension of a decision.
///
/// Lifecycle: created with full-range sentinels, populated by sweeping all
/// observed values with [`Heuristic::update`], then used read-only through
/// [`Heuristic::score`].
#[derive(Debug, Clone)]
pub struct Heuristic<T> {
    lowest: T,
    highest: T,
    lower_is_better: bool,
    weight: f64,
}

impl<T: Sample> Heuristic<T> {
    pub fn new(weight: f64, lower_is_better: bool) -> Self {
        Heuristic {
            lowest: T::RANGE_MAX,
            highest: T::ZERO,
            lower_is_better,
            weight,
        }
    }

    /// Like [`Heuristic::new`] but with a known, fixed range.
    pub fn with_range(lowest: T, highest: T, weight: f64, lower_is_better: bool) -> Self {
        Heuristic {
            lowest,
            highest,
            lower_is_better,
            weight,
        }
    }

    /// Admits a value into the running range. No-op for zero-weight
    /// heuristics, which never contribute to a score.
    pub fn update(&mut self, value: T) {
        if self.weight == 0.0 {
            return;
        }
        if value > self.highest {
            self.highest = value;
        }
        if value < self.lowest {
            self.lowest = value;
        }
    }

    /// Normalizes the value against the observed range and multiplies it by
    /// the heuristic weight. The result is always within `[0, weight]`.
    ///
    /// Zero values are rated as the best or worst extreme regardless of the
    /// observed range: absent data is either ideally cheap or ideally empty.
    pub fn score(&self, value: T) -> f64 {
        if self.weight == 0.0 {
            return 0.0;
        }

        if value == T::ZERO {
            if self.lower_is_better {
                return self.weight;
            }
            return 0.0;
        }

        if self.highest == self.lowest {
            return self.weight;
        }

        let norm =
            (value.as_f64() - self.lowest.as_f64()) / (self.highest.as_f64() - self.lowest.as_f64());

        if self.lower_is_better {
            return (1.0 - norm) * self.weight;
        }

        norm * self.weight
    }
}

// Only the observed range and the weight are exposed; the direction bit and
// anything added later stay opaque to debug consumers.
impl<T: Sample> Serialize for Heuristic<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Heuristic", 3)?;
        state.serialize_field("lowest", &self.lowest)?;
        state.serialize_field("highest", &self.highest)?;
        state.serialize_field("weight", &self.weight)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Case {
        desc: &'static str,
        weight: f64,
        lower_is_better: bool,
        values: &'static [i64],
        value: i64,
        expected_score: f64,
    }

    #[test]
    fn test_score() {
        let tests = [
            Case {
                desc: "highest score",
                weight: 1.0,
                lower_is_better: false,
                values: &[0, 1],
                value: 1,
                expected_score: 1.0,
            },
            Case {
                desc: "lowest score",
                weight: 1.0,
                lower_is_better: false,
                values: &[0, 1],
                value: 0,
                expected_score: 0.0,
            },
            Case {
                desc: "inverted highest score",
                weight: 1.0,
                lower_is_better: true,
                values: &[0, 1],
                value: 0,
                expected_score: 1.0,
            },
            Case {
                desc: "weight",
                weight: 0.5,
                lower_is_better: false,
                values: &[0, 1],
                value: 1,
                expected_score: 0.5,
            },
            Case {
                desc: "weight 2",
                weight: 0.8,
                lower_is_better: false,
                values: &[50_000, 125_000, 12_000, 33_500, 79_000],
                value: 28_745,
                expected_score: 0.11854867256637168,
            },
            Case {
                desc: "inverted weight",
                weight: 0.8,
                lower_is_better: true,
                values: &[50_000, 125_000, 12_000, 33_500, 79_000],
                value: 28_745,
                expected_score: 0.6814513274336284,
            },
            Case {
                desc: "zero weight",
                weight: 0.0,
                lower_is_better: false,
                values: &[2, 6, 9],
                value: 8,
                expected_score: 0.0,
            },
            Case {
                desc: "zero value",
                weight: 1.0,
                lower_is_better: false,
                values: &[0, 2, 6, 9],
                value: 0,
                expected_score: 0.0,
            },
            Case {
                desc: "zero value inverted",
                weight: 1.0,
                lower_is_better: true,
                values: &[0, 2, 6, 9],
                value: 0,
                expected_score: 1.0,
            },
            Case {
                desc: "zero value weighted",
                weight: 0.6,
                lower_is_better: true,
                values: &[0, 2, 6, 9],
                value: 0,
                expected_score: 0.6,
            },
        ];

        for tt in tests {
            let mut heuristic = Heuristic::<i64>::new(tt.weight, tt.lower_is_better);
            for value in tt.values {
                heuristic.update(*value);
            }

            let score = heuristic.score(tt.value);
            assert!(
                (score - tt.expected_score).abs() < 1e-12,
                "{}: got {score}, want {}",
                tt.desc,
                tt.expected_score
            );
        }
    }

    #[test]
    fn test_score_within_weight_bounds() {
        let mut heuristic = Heuristic::<u64>::new(0.7, false);
        let samples = [3_u64, 900, 14, 72_000, 5];
        for sample in samples {
            heuristic.update(sample);
        }

        for sample in samples {
            let score = heuristic.score(sample);
            assert!(score >= 0.0, "score {score} below zero");
            assert!(score <= 0.7, "score {score} above the weight");
        }
    }

    #[test]
    fn test_equal_range_credits_full_weight() {
        let mut heuristic = Heuristic::<u64>::new(0.4, false);
        heuristic.update(10);
        heuristic.update(10);

        assert_eq!(heuristic.score(10), 0.4);
    }

    #[test]
    fn test_zero_weight_skips_updates() {
        let mut heuristic = Heuristic::<u64>::new(0.0, false);
        heuristic.update(500);

        let encoded = serde_json::to_string(&heuristic).unwrap();
        assert_eq!(
            encoded,
            format!("{{\"lowest\":{},\"highest\":0,\"weight\":0.0}}", u64::MAX)
        );
    }

    #[test]
    fn test_fixed_range() {
        let heuristic = Heuristic::<u64>::with_range(0, 1, 0.8, false);
        assert_eq!(heuristic.score(1), 0.8);
        assert_eq!(heuristic.score(0), 0.0);
    }

    #[test]
    fn test_float_samples() {
        let mut heuristic = Heuristic::<f64>::new(1.0, false);
        heuristic.update(0.25);
        heuristic.update(0.75);

        assert_eq!(heuristic.score(0.5), 0.5);
    }

    #[test]
    fn test_serialize_surface() {
        let mut heuristic = Heuristic::<u64>::new(0.25, true);
        heuristic.update(10);
        heuristic.update(90);

        let encoded = serde_json::to_string(&heuristic).unwrap();
        assert_eq!(encoded, "{\"lowest\":10,\"highest\":90,\"weight\":0.25}");
    }
}
