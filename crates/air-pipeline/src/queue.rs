//! Block queue scheduling: turns a submitted `Block`'s flat segment list
//! into queue entries, applying the wall-clock join offset when the block's
//! `start_utc_ms` is already in the past at submission time.

use std::collections::VecDeque;

use air_core::model::Segment;

/// One segment as carried in the session's playout queue, plus however far
/// into it playback should start (nonzero only for the segment a mid-block
/// join landed on).
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSegment {
    pub segment: Segment,
    pub initial_ct_ms: u64,
}

/// Drop whatever `elapsed_ms` of a block's segments already elapsed before
/// the session got to submit it, and advance into the first surviving
/// segment by the remainder. A block with no `start_utc_ms` (or one that
/// hasn't arrived yet) passes through with `elapsed_ms == 0` and every
/// segment gets `initial_ct_ms: 0`.
pub fn apply_join_offset(mut segments: VecDeque<Segment>, mut elapsed_ms: u64) -> VecDeque<QueuedSegment> {
    let mut out = VecDeque::with_capacity(segments.len());
    while let Some(seg) = segments.pop_front() {
        if elapsed_ms == 0 {
            out.push_back(QueuedSegment { segment: seg, initial_ct_ms: 0 });
            continue;
        }
        let dur = seg.duration_ms();
        if elapsed_ms >= dur {
            elapsed_ms -= dur;
            continue;
        }
        let join_ct_ms = elapsed_ms;
        elapsed_ms = 0;
        let joined = match seg {
            Segment::Content { asset_path, asset_start_offset_ms, duration_ms, aspect_policy, transition, gain_db } => {
                Segment::Content {
                    asset_path,
                    asset_start_offset_ms: asset_start_offset_ms + join_ct_ms,
                    duration_ms,
                    aspect_policy,
                    transition,
                    gain_db,
                }
            }
            pad @ Segment::Pad { .. } => pad,
        };
        out.push_back(QueuedSegment { segment: joined, initial_ct_ms: join_ct_ms });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use air_core::model::{AspectPolicy, TransitionSpec};

    fn content(duration_ms: u64) -> Segment {
        Segment::Content {
            asset_path: "clip.mp4".to_string(),
            asset_start_offset_ms: 0,
            duration_ms,
            aspect_policy: AspectPolicy::Stretch,
            transition: TransitionSpec::NONE,
            gain_db: 0.0,
        }
    }

    #[test]
    fn zero_elapsed_leaves_segments_untouched() {
        let segs: VecDeque<Segment> = VecDeque::from([content(5000), Segment::Pad { duration_ms: 500 }]);
        let out = apply_join_offset(segs, 0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|q| q.initial_ct_ms == 0));
    }

    #[test]
    fn mid_block_join_drops_elapsed_segments_and_advances_into_survivor() {
        // Block is 4000ms late into a 10000ms content segment following a
        // 2000ms pad: the pad is fully elapsed and dropped, the content
        // segment survives with a 2000ms head start.
        let segs: VecDeque<Segment> = VecDeque::from([Segment::Pad { duration_ms: 2000 }, content(10_000)]);
        let out = apply_join_offset(segs, 4000);
        assert_eq!(out.len(), 1);
        let joined = &out[0];
        assert_eq!(joined.initial_ct_ms, 2000);
        match &joined.segment {
            Segment::Content { asset_start_offset_ms, .. } => assert_eq!(*asset_start_offset_ms, 2000),
            _ => panic!("expected content segment to survive the join"),
        }
    }

    #[test]
    fn join_past_every_segment_empties_the_queue() {
        let segs: VecDeque<Segment> = VecDeque::from([Segment::Pad { duration_ms: 500 }, content(500)]);
        let out = apply_join_offset(segs, 5000);
        assert!(out.is_empty());
    }
}
