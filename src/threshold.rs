//! Thresholds and the MCut adaptive cutoff.
//!
//! See <https://search.r-project.org/CRAN/refmans/utiml/html/mcut_threshold.html>.

/// Default fixed threshold for general tags.
pub const DEFAULT_GENERAL_THRESHOLD: f32 = 0.35;
/// Default fixed threshold for character tags.
pub const DEFAULT_CHARACTER_THRESHOLD: f32 = 0.85;
/// Lowest threshold an MCut-derived character cutoff may resolve to.
pub const CHARACTER_MCUT_FLOOR: f32 = 0.15;

/// Per-run threshold settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub general: f32,
    pub character: f32,
    pub general_mcut: bool,
    pub character_mcut: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            general: DEFAULT_GENERAL_THRESHOLD,
            character: DEFAULT_CHARACTER_THRESHOLD,
            general_mcut: false,
            character_mcut: false,
        }
    }
}

impl Thresholds {
    /// Effective general cutoff for one image, given its general-tag scores.
    pub fn general_for(&self, general_scores: &[f32]) -> f32 {
        if self.general_mcut {
            mcut_threshold(general_scores)
        } else {
            self.general
        }
    }

    /// Effective character cutoff for one image, given its character-tag scores.
    pub fn character_for(&self, character_scores: &[f32]) -> f32 {
        if self.character_mcut {
            mcut_threshold(character_scores).max(CHARACTER_MCUT_FLOOR)
        } else {
            self.character
        }
    }
}

/// Midpoint of the widest gap between consecutive scores sorted descending.
///
/// Returns `0.0` for an empty slice and the only element for a single one.
/// When several gaps are equally wide the highest-ranked one wins.
pub fn mcut_threshold(probs: &[f32]) -> f32 {
    match probs {
        [] => return 0.0,
        [p] => return *p,
        _ => {}
    }

    let mut sorted = probs.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut t = 0;
    let mut max_dif = sorted[0] - sorted[1];
    for (i, w) in sorted.windows(2).enumerate().skip(1) {
        let dif = w[0] - w[1];
        if dif > max_dif {
            max_dif = dif;
            t = i;
        }
    }

    (sorted[t] + sorted[t + 1]) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcut_empty_and_single() {
        assert_eq!(mcut_threshold(&[]), 0.0);
        assert_eq!(mcut_threshold(&[0.42]), 0.42);
    }

    #[test]
    fn test_mcut_widest_gap() {
        let t = mcut_threshold(&[0.9, 0.89, 0.3, 0.1]);
        assert!((t - 0.595).abs() < 1e-6);
    }

    #[test]
    fn test_mcut_is_order_independent() {
        let a = mcut_threshold(&[0.1, 0.3, 0.9, 0.89]);
        let b = mcut_threshold(&[0.9, 0.89, 0.3, 0.1]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_mcut_tie_keeps_first_gap() {
        // gaps: 0.25, 0.25, 0.25 -> first pair (1.0, 0.75)
        let t = mcut_threshold(&[0.25, 1.0, 0.5, 0.75]);
        assert!((t - 0.875).abs() < 1e-6);
    }

    #[test]
    fn test_mcut_equal_values() {
        assert_eq!(mcut_threshold(&[0.5, 0.5, 0.5]), 0.5);
    }

    #[test]
    fn test_mcut_within_range() {
        let cases: [&[f32]; 4] = [
            &[0.01, 0.02],
            &[0.99, 0.5, 0.49, 0.48, 0.0],
            &[0.3, 0.3, 0.7, 0.1, 0.6],
            &[1.0, 0.0],
        ];
        for probs in cases {
            let t = mcut_threshold(probs);
            let min = probs.iter().copied().fold(f32::INFINITY, f32::min);
            let max = probs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            assert!(t >= min && t <= max, "{t} not in [{min}, {max}]");
        }
    }

    #[test]
    fn test_mcut_does_not_mutate_input() {
        let probs = [0.1, 0.9, 0.5];
        mcut_threshold(&probs);
        assert_eq!(probs, [0.1, 0.9, 0.5]);
    }

    #[test]
    fn test_character_floor_only_with_mcut() {
        let thresholds = Thresholds {
            character_mcut: true,
            ..Default::default()
        };
        // widest gap is 0.1 -> 0.02, midpoint 0.06, clamped
        assert_eq!(thresholds.character_for(&[0.1, 0.02, 0.01]), CHARACTER_MCUT_FLOOR);

        let fixed = Thresholds {
            character: 0.05,
            ..Default::default()
        };
        assert_eq!(fixed.character_for(&[0.1, 0.02, 0.01]), 0.05);
    }

    #[test]
    fn test_general_mcut_has_no_floor() {
        let thresholds = Thresholds {
            general_mcut: true,
            ..Default::default()
        };
        let t = thresholds.general_for(&[0.1, 0.02, 0.01]);
        assert!((t - 0.06).abs() < 1e-6);
    }

    #[test]
    fn test_defaults() {
        let t = Thresholds::default();
        assert_eq!(t.general, 0.35);
        assert_eq!(t.character, 0.85);
        assert!(!t.general_mcut && !t.character_mcut);
    }
}
