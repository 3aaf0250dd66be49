//! Alpha governor: admission policy over variant trajectories.
//!
//! Given a target α (live share of accepted traces) and a window N, a
//! variant trace is denied when admitting it would push the variant share
//! above `(1−α)/α · live` within the window. Live traces always admit.

use crate::config::AlphaSettings;

use super::TraceOrigin;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmitDecision {
    Admit,
    Deny {
        target: f64,
        /// live / (live + variant) over the window, before this trace
        run: f64,
        live: u64,
        variant: u64,
    },
}

/// The governor.
#[derive(Debug, Clone)]
pub struct AlphaGovernor {
    settings: AlphaSettings,
}

impl AlphaGovernor {
    pub fn new(settings: AlphaSettings) -> Self {
        Self { settings }
    }

    /// Window of recent traces the policy inspects.
    pub fn window(&self) -> usize {
        self.settings.window
    }

    /// Evaluate a trace against the recent accepted origins (newest first
    /// or oldest first; only counts matter).
    pub fn evaluate(&self, origin: TraceOrigin, recent: &[TraceOrigin]) -> AdmitDecision {
        if !self.settings.enabled || origin == TraceOrigin::Live {
            return AdmitDecision::Admit;
        }
        let live = recent.iter().filter(|o| **o == TraceOrigin::Live).count() as u64;
        let variant = recent
            .iter()
            .filter(|o| **o == TraceOrigin::Variant)
            .count() as u64;

        let target = self.settings.target;
        // Admitting pushes the variant count past the budget implied by α.
        let budget = (1.0 - target) / target * live as f64;
        if (variant + 1) as f64 > budget {
            let total = live + variant;
            let run = if total == 0 {
                0.0
            } else {
                live as f64 / total as f64
            };
            return AdmitDecision::Deny {
                target,
                run,
                live,
                variant,
            };
        }
        AdmitDecision::Admit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(target: f64, window: usize) -> AlphaGovernor {
        AlphaGovernor::new(AlphaSettings {
            target,
            window,
            enabled: true,
        })
    }

    fn recent(live: usize, variant: usize) -> Vec<TraceOrigin> {
        let mut v = vec![TraceOrigin::Live; live];
        v.extend(vec![TraceOrigin::Variant; variant]);
        v
    }

    #[test]
    fn live_traces_always_admit() {
        let g = governor(0.8, 50);
        assert_eq!(
            g.evaluate(TraceOrigin::Live, &recent(0, 100)),
            AdmitDecision::Admit
        );
    }

    #[test]
    fn variant_denied_at_documented_ratios() {
        // α = 0.8, live = 10, variant = 9: budget is 2.5, so the tenth
        // variant is denied with run ≈ 0.526.
        let g = governor(0.8, 50);
        match g.evaluate(TraceOrigin::Variant, &recent(10, 9)) {
            AdmitDecision::Deny {
                target,
                run,
                live,
                variant,
            } => {
                assert!((target - 0.8).abs() < f64::EPSILON);
                assert!((run - 10.0 / 19.0).abs() < 1e-9);
                assert_eq!(live, 10);
                assert_eq!(variant, 9);
            }
            AdmitDecision::Admit => panic!("expected denial"),
        }
    }

    #[test]
    fn variant_admitted_under_budget() {
        // α = 0.5: budget equals live count.
        let g = governor(0.5, 50);
        assert_eq!(
            g.evaluate(TraceOrigin::Variant, &recent(10, 5)),
            AdmitDecision::Admit
        );
    }

    #[test]
    fn window_alpha_bound_holds() {
        // Over any run of admissions the live share stays within 1/N of α.
        let g = governor(0.8, 40);
        let mut accepted: Vec<TraceOrigin> = Vec::new();
        for i in 0..200usize {
            let origin = if i % 2 == 0 {
                TraceOrigin::Live
            } else {
                TraceOrigin::Variant
            };
            let window: Vec<TraceOrigin> =
                accepted.iter().rev().take(g.window()).copied().collect();
            if g.evaluate(origin, &window) == AdmitDecision::Admit {
                accepted.push(origin);
            }
        }
        let tail: Vec<TraceOrigin> = accepted.iter().rev().take(g.window()).copied().collect();
        let live = tail.iter().filter(|o| **o == TraceOrigin::Live).count() as f64;
        let total = tail.len() as f64;
        assert!(live / total >= 0.8 - 1.0 / g.window() as f64);
    }

    #[test]
    fn disabled_governor_admits_everything() {
        let g = AlphaGovernor::new(AlphaSettings {
            target: 0.9,
            window: 10,
            enabled: false,
        });
        assert_eq!(
            g.evaluate(TraceOrigin::Variant, &recent(0, 100)),
            AdmitDecision::Admit
        );
    }
}
