use crate::similarity::{cosine_similarity, ReferenceSet};

/// Accept/reject thresholds for a verification decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    /// Minimum cosine similarity of the best match (default: 0.93).
    pub confidence_threshold: f32,
    /// Minimum gap between the best and second-best similarity
    /// (default: 0.08). Rejects probes that resemble several enrolled
    /// speakers at once.
    pub margin_threshold: f32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.93,
            margin_threshold: 0.08,
        }
    }
}

/// Outcome of verifying one probe against a claimed identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// True iff the claimed identity was confirmed.
    pub accepted: bool,
    /// Identity of the best-scoring reference, if any exist.
    pub best_id: Option<String>,
    /// Best similarity as a percentage, rounded to two decimals.
    pub confidence_pct: f32,
    /// Gap between the best and second-best similarity. 0.0 when fewer
    /// than two references exist.
    pub margin: f32,
}

impl Decision {
    fn rejected() -> Self {
        Self {
            accepted: false,
            best_id: None,
            confidence_pct: 0.0,
            margin: 0.0,
        }
    }
}

/// Verifies a probe embedding against a claimed identity.
///
/// Ranks every reference by cosine similarity to the probe (linear scan,
/// first occurrence wins exact ties) and accepts iff all of:
///
/// 1. the best match IS the claimed identity,
/// 2. the best similarity reaches `confidence_threshold`,
/// 3. the best-to-second margin reaches `margin_threshold`.
///
/// An empty reference set yields a rejected decision rather than a panic.
pub fn decide(
    probe: &[f32],
    claimed_id: &str,
    refs: &ReferenceSet,
    policy: &DecisionPolicy,
) -> Decision {
    let mut best: Option<(&str, f32)> = None;
    let mut second_sim = f32::NEG_INFINITY;

    for (id, reference) in refs.iter() {
        let sim = cosine_similarity(probe, reference);
        match best {
            None => best = Some((id, sim)),
            Some((_, best_sim)) if sim > best_sim => {
                second_sim = best_sim;
                best = Some((id, sim));
            }
            Some(_) => {
                if sim > second_sim {
                    second_sim = sim;
                }
            }
        }
    }

    let Some((best_id, best_sim)) = best else {
        return Decision::rejected();
    };

    // With a single reference the runner-up similarity is defined as 0.0,
    // so the margin term never blocks a lone candidate on its own.
    let second_sim = if refs.len() < 2 { 0.0 } else { second_sim };
    let margin = best_sim - second_sim;

    let accepted = best_id == claimed_id
        && best_sim >= policy.confidence_threshold
        && margin >= policy.margin_threshold;

    Decision {
        accepted,
        best_id: Some(best_id.to_string()),
        confidence_pct: round2(best_sim * 100.0),
        margin,
    }
}

fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(entries: &[(&str, &[f32])]) -> ReferenceSet {
        let mut set = ReferenceSet::new();
        for (id, v) in entries {
            set.insert(*id, v.to_vec());
        }
        set
    }

    #[test]
    fn confirms_a_clear_match() {
        let set = refs(&[("s1", &[1.0, 0.0]), ("s2", &[0.0, 1.0])]);
        // sim(s2) = 0.95, sim(s1) ~ 0.312, margin ~ 0.638.
        let probe = [0.312_249_9, 0.95];
        let d = decide(&probe, "s2", &set, &DecisionPolicy::default());

        assert!(d.accepted);
        assert_eq!(d.best_id.as_deref(), Some("s2"));
        assert_eq!(d.confidence_pct, 95.0);
        assert!(d.margin > 0.5);
    }

    #[test]
    fn rejects_when_best_match_is_someone_else() {
        let set = refs(&[("s1", &[1.0, 0.0]), ("s2", &[0.0, 1.0])]);
        let probe = [0.0, 1.0];
        let d = decide(&probe, "s1", &set, &DecisionPolicy::default());

        assert!(!d.accepted);
        assert_eq!(d.best_id.as_deref(), Some("s2"));
    }

    #[test]
    fn empty_reference_set_is_rejected() {
        let d = decide(&[1.0, 0.0], "s1", &ReferenceSet::new(), &DecisionPolicy::default());
        assert!(!d.accepted);
        assert_eq!(d.best_id, None);
        assert_eq!(d.confidence_pct, 0.0);
        assert_eq!(d.margin, 0.0);
    }

    #[test]
    fn raising_confidence_threshold_never_flips_to_accept() {
        let set = refs(&[("s1", &[1.0, 0.0]), ("s2", &[0.0, 1.0])]);
        let probe = [0.312_249_9, 0.95];

        let mut accepted_so_far = true;
        for threshold in [0.5, 0.9, 0.94, 0.96, 0.99] {
            let policy = DecisionPolicy {
                confidence_threshold: threshold,
                ..DecisionPolicy::default()
            };
            let d = decide(&probe, "s2", &set, &policy);
            assert!(
                accepted_so_far || !d.accepted,
                "accept reappeared at threshold {threshold}"
            );
            accepted_so_far = d.accepted;
        }
        assert!(!accepted_so_far, "0.99 threshold must reject a 0.95 match");
    }

    #[test]
    fn identical_references_leave_zero_margin() {
        let set = refs(&[("s1", &[1.0, 0.0]), ("s2", &[1.0, 0.0])]);
        // Probe matches both perfectly; margin must be 0 so the decision
        // can never be an accept.
        let d = decide(&[1.0, 0.0], "s1", &set, &DecisionPolicy::default());

        assert!(d.margin.abs() < 1e-6);
        assert!(!d.accepted);
    }

    #[test]
    fn first_reference_wins_exact_ties() {
        let set = refs(&[("s2", &[1.0, 0.0]), ("s1", &[1.0, 0.0])]);
        let d = decide(&[1.0, 0.0], "s1", &set, &DecisionPolicy::default());
        assert_eq!(d.best_id.as_deref(), Some("s2"));
        assert!(!d.accepted);
    }

    #[test]
    fn single_reference_is_not_blocked_by_margin() {
        let set = refs(&[("s1", &[1.0, 0.0])]);
        let d = decide(&[1.0, 0.0], "s1", &set, &DecisionPolicy::default());
        assert!(d.accepted);
        assert_eq!(d.confidence_pct, 100.0);
    }

    #[test]
    fn below_confidence_threshold_rejects_even_with_margin() {
        let set = refs(&[("s1", &[1.0, 0.0]), ("s2", &[0.0, 1.0])]);
        // sim(s1) ~ 0.8, margin large, still below 0.93.
        let probe = [0.8, 0.6];
        let d = decide(&probe, "s1", &set, &DecisionPolicy::default());
        assert!(!d.accepted);
        assert_eq!(d.best_id.as_deref(), Some("s1"));
    }
}
