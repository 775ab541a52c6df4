//! Pure seam decision rule: whether the tick loop stays on the active
//! producer, commits to the prepared one, or force-commits a pad.
//!
//! Kept free of threads/IO/FFmpeg so the `origin(i) == active(i)` invariant
//! can be proven by direct unit test rather than by integration test.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeamDecision {
    /// Current producer is not depleted yet — keep emitting from it.
    Defer,
    /// Current producer depleted and the prepared next producer is ready —
    /// commit to it on the next frame boundary.
    NormalCommit,
    /// Current producer depleted and the next one is NOT ready — commit to
    /// a pad immediately rather than stall the tick loop.
    OverrideCommit,
}

#[derive(Debug, Clone, Copy)]
pub struct SeamInputs {
    pub current_depleted: bool,
    pub next_ready: bool,
    /// Audio lookahead depth is sufficient to swap without an audible gap.
    /// Only consulted when deciding whether a pad-to-pad or content-to-pad
    /// seam may proceed early; video depletion alone never blocks a seam.
    pub audio_depth_ok: bool,
}

/// Decide the seam action for this tick. The caller is responsible for
/// actually swapping the active producer; this function only decides.
///
/// Invariant this enforces: whichever producer `decide_seam` selects becomes
/// both the encode *origin* and the tick loop's *active* producer in the same
/// tick — there is no decision path that commits one without the other.
pub fn decide_seam(inputs: SeamInputs) -> SeamDecision {
    if !inputs.current_depleted {
        return SeamDecision::Defer;
    }
    if inputs.next_ready {
        return SeamDecision::NormalCommit;
    }
    SeamDecision::OverrideCommit
}

/// A vacuum exception: the encoder already stamped a frame under `origin`
/// before the tick loop discovered both lookahead buffers were empty. This
/// is the single permitted post-encode re-stamp — it corrects the session
/// frame's recorded origin to the pad producer without re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VacuumException {
    pub corrected_origin_is_pad: bool,
}

pub fn vacuum_exception() -> VacuumException {
    VacuumException { corrected_origin_is_pad: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_on_active_while_not_depleted() {
        let d = decide_seam(SeamInputs { current_depleted: false, next_ready: true, audio_depth_ok: true });
        assert_eq!(d, SeamDecision::Defer);
    }

    #[test]
    fn commits_to_prepared_successor() {
        let d = decide_seam(SeamInputs { current_depleted: true, next_ready: true, audio_depth_ok: true });
        assert_eq!(d, SeamDecision::NormalCommit);
    }

    #[test]
    fn overrides_to_pad_when_successor_not_ready() {
        let d = decide_seam(SeamInputs { current_depleted: true, next_ready: false, audio_depth_ok: false });
        assert_eq!(d, SeamDecision::OverrideCommit);
    }

    #[test]
    fn override_does_not_require_audio_depth() {
        // Depletion forces a decision regardless of audio depth; audio
        // depth only gates the preparer's own early-arm heuristics, not
        // this function.
        let d = decide_seam(SeamInputs { current_depleted: true, next_ready: false, audio_depth_ok: true });
        assert_eq!(d, SeamDecision::OverrideCommit);
    }
}
