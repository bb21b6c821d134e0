use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::state::ViewState;
use crate::viewport::{CoarseView, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Local,
    Remote,
    Legacy,
}

/// Every stored position that could describe where the reader left off.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub local: Option<ViewState>,
    pub remote: Option<ViewState>,
    pub legacy: Option<ViewState>,
}

impl Candidates {
    /// Greatest `updated_at` wins; ties go to the earlier source (local first).
    pub fn select(&self) -> Option<(CandidateSource, &ViewState)> {
        let ordered = [
            (CandidateSource::Local, self.local.as_ref()),
            (CandidateSource::Remote, self.remote.as_ref()),
            (CandidateSource::Legacy, self.legacy.as_ref()),
        ];
        let mut best: Option<(CandidateSource, &ViewState)> = None;
        for (source, state) in ordered {
            let Some(state) = state else { continue };
            match best {
                Some((_, current)) if state.updated_at <= current.updated_at => {}
                _ => best = Some((source, state)),
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Idle,
    CandidateSelected,
    CoarseApplied,
    AwaitingRender,
    Verifying,
    Done,
    Abandoned,
}

impl RestorePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RestorePhase::Done | RestorePhase::Abandoned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// An explicit position in the open request took precedence.
    Overridden,
    NoCandidate,
    Restored {
        source: CandidateSource,
        attempts: u32,
    },
    /// Verification budget ran out; the current position was accepted.
    Approximate {
        source: CandidateSource,
        attempts: u32,
    },
}

enum OffsetTarget {
    None,
    Offset(f64),
    Unreachable,
}

/// Drives one document-open cycle from stored candidates to a verified scroll position.
pub struct RestorationCoordinator {
    config: SyncConfig,
    phase: RestorePhase,
    history: Vec<RestorePhase>,
    target: Option<(CandidateSource, ViewState)>,
    attempts: u32,
    retry_at: Option<u64>,
    release_at: Option<u64>,
    suppressing: bool,
    auto_restore: bool,
    outcome: Option<RestoreOutcome>,
}

impl RestorationCoordinator {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            phase: RestorePhase::Idle,
            history: vec![RestorePhase::Idle],
            target: None,
            attempts: 0,
            retry_at: None,
            release_at: None,
            suppressing: false,
            auto_restore: true,
            outcome: None,
        }
    }

    pub fn phase(&self) -> RestorePhase {
        self.phase
    }

    /// Phases visited during the current cycle, starting at `Idle`.
    pub fn history(&self) -> &[RestorePhase] {
        &self.history
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn outcome(&self) -> Option<RestoreOutcome> {
        self.outcome
    }

    pub fn target(&self) -> Option<&ViewState> {
        self.target.as_ref().map(|(_, state)| state)
    }

    pub fn auto_restore(&self) -> bool {
        self.auto_restore
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppressing
    }

    /// Next time [`Self::poll`] has something to do.
    pub fn next_due(&self) -> Option<u64> {
        match (self.retry_at, self.release_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Starts a cycle for a newly active document.
    pub fn begin(&mut self, viewport: &mut dyn Viewport, candidates: Candidates) -> RestorePhase {
        self.reset(viewport);

        if viewport.has_position_override() {
            self.auto_restore = false;
            self.outcome = Some(RestoreOutcome::Overridden);
            self.transition(RestorePhase::Done);
            return self.phase;
        }

        let Some((source, state)) = candidates.select() else {
            self.outcome = Some(RestoreOutcome::NoCandidate);
            self.transition(RestorePhase::Abandoned);
            return self.phase;
        };
        debug!(?source, updated_at = state.updated_at, "selected view state candidate");
        self.target = Some((source, state.clone()));
        self.transition(RestorePhase::CandidateSelected);

        viewport.set_scroll_suppressed(true);
        self.suppressing = true;
        viewport.apply_coarse(CoarseView {
            page_number: state.page_number,
            scale: state.scale,
            zoom_mode: state.zoom_mode,
            rotation: state.rotation,
            view_mode: state.view_mode,
        });
        self.transition(RestorePhase::CoarseApplied);
        self.transition(RestorePhase::AwaitingRender);
        self.phase
    }

    /// The renderer reports that target pages exist in the layout.
    pub fn on_pages_rendered(&mut self, viewport: &mut dyn Viewport, now_ms: u64) {
        if self.phase != RestorePhase::AwaitingRender {
            return;
        }
        self.transition(RestorePhase::Verifying);
        self.verify_attempt(viewport, now_ms);
    }

    /// Runs a due retry or releases suppression once the settle delay passed.
    pub fn poll(&mut self, viewport: &mut dyn Viewport, now_ms: u64) {
        if let Some(retry_at) = self.retry_at {
            if now_ms >= retry_at && self.phase == RestorePhase::Verifying {
                self.retry_at = None;
                self.verify_attempt(viewport, now_ms);
            }
        }
        if let Some(release_at) = self.release_at {
            if now_ms >= release_at {
                self.release(viewport);
            }
        }
    }

    /// Abandons any cycle in progress and releases the renderer.
    pub fn reset(&mut self, viewport: &mut dyn Viewport) {
        if self.suppressing {
            self.release(viewport);
        }
        self.phase = RestorePhase::Idle;
        self.history = vec![RestorePhase::Idle];
        self.target = None;
        self.attempts = 0;
        self.retry_at = None;
        self.release_at = None;
        self.auto_restore = true;
        self.outcome = None;
    }

    fn verify_attempt(&mut self, viewport: &mut dyn Viewport, now_ms: u64) {
        let Some((source, target)) = self.target.clone() else {
            return;
        };
        self.attempts += 1;

        let offset = self.offset_target(viewport, &target);
        if let OffsetTarget::Offset(expected) = offset {
            viewport.scroll_to(expected);
        }
        let passed = self.check(viewport, &target, &offset);
        debug!(attempt = self.attempts, passed, "verified restored position");

        if passed {
            self.finish(
                RestoreOutcome::Restored {
                    source,
                    attempts: self.attempts,
                },
                now_ms,
            );
        } else if self.attempts < self.config.max_verify_attempts {
            self.retry_at = Some(now_ms.saturating_add(self.config.retry_delay_ms));
        } else {
            self.finish(
                RestoreOutcome::Approximate {
                    source,
                    attempts: self.attempts,
                },
                now_ms,
            );
        }
    }

    /// Absolute offset when it fits the current layout, else the percentage against it.
    fn offset_target(&self, viewport: &dyn Viewport, target: &ViewState) -> OffsetTarget {
        if target.is_page_only() {
            return OffsetTarget::None;
        }
        let Some(geometry) = viewport.scroll_geometry() else {
            return OffsetTarget::Unreachable;
        };
        let extent = geometry.extent();
        match (target.scroll_top, target.scroll_percent) {
            (Some(top), Some(percent)) if top > extent + self.config.verify_tolerance => {
                OffsetTarget::Offset(geometry.offset_for_percent(percent))
            }
            (Some(top), _) => OffsetTarget::Offset(top),
            (None, Some(percent)) => OffsetTarget::Offset(geometry.offset_for_percent(percent)),
            (None, None) => OffsetTarget::None,
        }
    }

    fn check(&self, viewport: &dyn Viewport, target: &ViewState, offset: &OffsetTarget) -> bool {
        let Some(page) = viewport.visible_page() else {
            return false;
        };
        if page.abs_diff(target.page_number) > self.config.page_tolerance {
            return false;
        }
        match offset {
            OffsetTarget::None => true,
            OffsetTarget::Unreachable => false,
            OffsetTarget::Offset(expected) => viewport
                .scroll_geometry()
                .map(|g| (g.scroll_top - expected).abs() <= self.config.verify_tolerance)
                .unwrap_or(false),
        }
    }

    fn finish(&mut self, outcome: RestoreOutcome, now_ms: u64) {
        info!(?outcome, "view state restoration finished");
        self.outcome = Some(outcome);
        self.retry_at = None;
        self.release_at = Some(now_ms.saturating_add(self.config.settle_delay_ms));
        self.transition(RestorePhase::Done);
    }

    fn release(&mut self, viewport: &mut dyn Viewport) {
        viewport.set_scroll_suppressed(false);
        self.suppressing = false;
        self.release_at = None;
    }

    fn transition(&mut self, next: RestorePhase) {
        debug!(from = ?self.phase, to = ?next, "restoration phase");
        self.phase = next;
        self.history.push(next);
    }
}
