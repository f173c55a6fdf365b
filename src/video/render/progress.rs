/// Maps engine "time processed" signals to a render fraction.
///
/// Fractions never go backwards within one render, even when the engine
/// reports an earlier timestamp after a later one.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total_seconds: f64,
    last: f64,
}

impl ProgressReporter {
    pub fn new(total_seconds: f64) -> Self {
        Self {
            total_seconds,
            last: 0.0,
        }
    }

    pub fn update(&mut self, processed_seconds: f64) -> f64 {
        let fraction = if self.total_seconds <= 0.0 {
            1.0
        } else if processed_seconds.is_nan() {
            self.last
        } else {
            (processed_seconds / self.total_seconds).clamp(0.0, 1.0)
        };
        self.last = self.last.max(fraction);
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_are_monotonic_and_capped() {
        let mut reporter = ProgressReporter::new(18.0);
        let observed: Vec<f64> = [4.5, 9.0, 6.0, 18.0, 25.0]
            .into_iter()
            .map(|t| reporter.update(t))
            .collect();
        assert_eq!(observed, vec![0.25, 0.5, 0.5, 1.0, 1.0]);
        assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn zero_length_timeline_is_complete() {
        let mut reporter = ProgressReporter::new(0.0);
        assert_eq!(reporter.update(0.0), 1.0);
    }

    #[test]
    fn unparseable_signal_keeps_last_fraction() {
        let mut reporter = ProgressReporter::new(10.0);
        reporter.update(3.0);
        assert_eq!(reporter.update(f64::NAN), 0.3);
    }
}
