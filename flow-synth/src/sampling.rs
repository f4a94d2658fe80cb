use crate::error::SynthError;
use fastrand::Rng;
use std::cmp;

/// Emulates N:1 device flow sampling over one-second windows of raw flows
///
/// A full window is split into contiguous segments of `ratio` flows, and one flow is picked at
/// random out of each segment.
#[derive(Copy, Clone, Debug)]
pub struct SamplingEngine {
    ratio: usize,
    samples_per_window: usize,
}

impl SamplingEngine {
    pub fn new(flows_per_second: usize, ratio: usize) -> Result<Self, SynthError> {
        if ratio == 0 {
            return Err(SynthError::InvalidSamplingRatio);
        }

        let flows_after_sampling = cmp::max(1, flows_per_second / ratio);
        let segment_width = cmp::max(1, flows_per_second / flows_after_sampling);
        Ok(Self {
            ratio,
            samples_per_window: flows_per_second / segment_width,
        })
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// The number of flows sampled out of a full window
    pub fn samples_per_window(&self) -> usize {
        self.samples_per_window
    }

    /// Picks the indices of the sampled flows in a window holding `window_len` flows
    ///
    /// Every non-empty window yields exactly `samples_per_window` indices. In a short window, the
    /// segments are clamped to its last flow, which may then be picked more than once.
    pub fn sample_indices(&self, window_len: usize, rng: &mut Rng) -> Vec<usize> {
        let Some(last) = window_len.checked_sub(1) else {
            return Vec::new();
        };

        (0..self.samples_per_window)
            .map(|segment| {
                let start = cmp::min(segment * self.ratio, last);
                let end_inclusive = cmp::min(start.saturating_add(self.ratio - 1), last);
                rng.usize(start..=end_inclusive)
            })
            .collect()
    }

    /// Returns the sampled flows out of the window, in order
    pub fn sample<'a, T>(&self, window: &'a [T], rng: &mut Rng) -> impl Iterator<Item = &'a T> {
        self.sample_indices(window.len(), rng)
            .into_iter()
            .map(move |i| &window[i])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_samples_per_window() {
        let cases = [
            // (flows per second, ratio, samples per window)
            (200_000, 1000, 200),
            (1000, 1, 1000),
            (1000, 10, 100),
            (1000, 3, 333),
            (1000, 7, 142),
            (1000, 1000, 1),
            (1000, 5000, 1),
        ];

        for (fps, ratio, expected) in cases {
            let engine = SamplingEngine::new(fps, ratio).unwrap();
            let expected_by_formula = fps / (fps / cmp::max(1, fps / ratio));
            assert_eq!(engine.samples_per_window(), expected, "{fps} / {ratio}");
            assert_eq!(expected, expected_by_formula, "{fps} / {ratio}");
        }
    }

    #[test]
    fn test_full_window_samples_one_per_segment() {
        let engine = SamplingEngine::new(10_000, 100).unwrap();
        let mut rng = Rng::with_seed(42);

        for _ in 0..100 {
            let indices = engine.sample_indices(10_000, &mut rng);
            assert_eq!(indices.len(), 100);
            for (segment, index) in indices.into_iter().enumerate() {
                assert!((segment * 100..(segment + 1) * 100).contains(&index));
            }
        }
    }

    #[test]
    fn test_sampled_indices_cover_the_whole_segment() {
        let engine = SamplingEngine::new(10, 10).unwrap();
        let mut rng = Rng::with_seed(1);
        let mut seen = [false; 10];
        for _ in 0..1000 {
            let indices = engine.sample_indices(10, &mut rng);
            assert_eq!(indices.len(), 1);
            seen[indices[0]] = true;
        }

        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_short_window() {
        let engine = SamplingEngine::new(1000, 100).unwrap();
        let mut rng = Rng::with_seed(42);

        // A window of 250 flows still yields ten samples, clamped to its last flow
        for _ in 0..100 {
            let indices = engine.sample_indices(250, &mut rng);
            assert_eq!(indices.len(), engine.samples_per_window());
            assert!(indices[0] < 100);
            assert!((100..200).contains(&indices[1]));
            assert!((200..250).contains(&indices[2]));
            assert!(indices[3..].iter().all(|&i| i == 249));
        }

        let indices = engine.sample_indices(1, &mut rng);
        assert_eq!(indices, vec![0; 10]);

        assert!(engine.sample_indices(0, &mut rng).is_empty());
    }

    #[test]
    fn test_ratio_larger_than_window() {
        let engine = SamplingEngine::new(1000, 5000).unwrap();
        let mut rng = Rng::with_seed(42);
        for _ in 0..100 {
            let indices = engine.sample_indices(1000, &mut rng);
            assert_eq!(indices.len(), 1);
            assert!(indices[0] < 1000);
        }
    }

    #[test]
    fn test_long_window_is_sampled_up_to_the_configured_amount() {
        // Windows may hold a few more flows than the nominal rate, due to server flows
        let engine = SamplingEngine::new(1000, 100).unwrap();
        let indices = engine.sample_indices(1020, &mut Rng::with_seed(42));
        assert_eq!(indices.len(), 10);
    }

    #[test]
    fn test_sample_returns_window_items() {
        let engine = SamplingEngine::new(6, 2).unwrap();
        let window = ["a", "b", "c", "d", "e", "f"];
        let sampled: Vec<_> = engine.sample(&window, &mut Rng::with_seed(3)).collect();
        assert_eq!(sampled.len(), 3);
        assert!(["a", "b"].contains(sampled[0]));
        assert!(["c", "d"].contains(sampled[1]));
        assert!(["e", "f"].contains(sampled[2]));
    }

    #[test]
    fn test_zero_ratio() {
        let err = SamplingEngine::new(1000, 0).unwrap_err();
        assert!(matches!(err, SynthError::InvalidSamplingRatio));
    }
}
