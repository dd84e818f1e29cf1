//! Segment planning for step videos.
//!
//! The generation backend is only reliable up to a bounded clip length, so a
//! step's target duration is distributed across its storyboard shots and each
//! shot is subdivided into fixed-length generation segments. Frame counts are
//! rounded up to the `8k + 1` shape the backend's tensor layout requires.

use plategen_models::Shot;

/// Shot prompt used when the planner supplied no shots for a video step.
pub const GENERIC_SHOT_PROMPT: &str = "Instructional cooking action in a clean kitchen.";

/// One planned generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSegment {
    /// Index of the shot this segment belongs to
    pub shot_index: usize,
    /// Index of this segment within its shot
    pub segment_index: usize,
    /// Duration to request from the backend
    pub seconds: u32,
    /// Prompt inherited from the shot
    pub prompt: String,
}

/// Frame count for a clip of `seconds` at `fps`, rounded up to `8k + 1`
/// with a floor of 9 frames.
pub fn frames_for_seconds(seconds: u32, fps: u32) -> u32 {
    let seconds = seconds.max(1);
    let frames = (seconds * fps).max(9);
    let k = (frames - 1).div_ceil(8);
    k * 8 + 1
}

/// Round `x` down to a multiple of `m`, with `m` as the floor.
pub fn round_down_multiple(x: u32, m: u32) -> u32 {
    (x - (x % m)).max(m)
}

/// Decompose a step's shot list into ordered generation segments.
///
/// Duration is distributed across shots in order and clamped to
/// `target_secs`. An empty shot list synthesizes one generic shot covering
/// the target. Each shot is split into segments of at most
/// `max_segment_secs`.
pub fn plan_segments(shots: &[Shot], target_secs: u32, max_segment_secs: u32) -> Vec<PlannedSegment> {
    let max_seg = max_segment_secs.max(1);
    let target = target_secs.max(1);

    let fallback;
    let shots = if shots.is_empty() {
        fallback = [Shot {
            duration_secs: max_seg.min(target),
            prompt: GENERIC_SHOT_PROMPT.to_string(),
        }];
        &fallback[..]
    } else {
        shots
    };

    let mut planned = Vec::new();
    let mut seconds_done = 0u32;

    'shots: for (shot_index, shot) in shots.iter().enumerate() {
        let shot_secs = shot.duration_secs.max(1);
        let remaining = target.saturating_sub(seconds_done);
        if remaining == 0 {
            break;
        }
        let shot_total = remaining.min(shot_secs);

        let segment_count = shot_total.div_ceil(max_seg);
        for segment_index in 0..segment_count {
            let seconds = max_seg.min(shot_total - segment_index * max_seg);
            if seconds == 0 {
                continue;
            }
            planned.push(PlannedSegment {
                shot_index,
                segment_index: segment_index as usize,
                seconds,
                prompt: shot.prompt.clone(),
            });
            seconds_done += seconds;
            if seconds_done >= target {
                break 'shots;
            }
        }
    }

    planned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(secs: u32, prompt: &str) -> Shot {
        Shot {
            duration_secs: secs,
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn frames_round_up_to_8k_plus_1() {
        // 5 seconds at 24 fps: 120 frames rounds up to 121
        assert_eq!(frames_for_seconds(5, 24), 121);
        // exact fit stays
        assert_eq!(frames_for_seconds(1, 8), 9);
        // floor of 9 frames
        assert_eq!(frames_for_seconds(1, 1), 9);
        // zero seconds clamps to one second
        assert_eq!(frames_for_seconds(0, 24), 25);
    }

    #[test]
    fn round_down_keeps_multiples() {
        assert_eq!(round_down_multiple(1216, 16), 1216);
        assert_eq!(round_down_multiple(1218, 16), 1216);
        assert_eq!(round_down_multiple(7, 16), 16);
    }

    #[test]
    fn two_four_second_shots_at_target_eight() {
        let shots = vec![shot(4, "A"), shot(4, "B")];
        let plan = plan_segments(&shots, 8, 6);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].seconds, 4);
        assert_eq!(plan[0].prompt, "A");
        assert_eq!(plan[1].seconds, 4);
        assert_eq!(plan[1].prompt, "B");
    }

    #[test]
    fn long_shot_is_subdivided() {
        let plan = plan_segments(&[shot(14, "pour")], 14, 6);
        let secs: Vec<u32> = plan.iter().map(|s| s.seconds).collect();
        assert_eq!(secs, vec![6, 6, 2]);
        assert!(plan.iter().all(|s| s.shot_index == 0));
    }

    #[test]
    fn target_clamps_total_duration() {
        let plan = plan_segments(&[shot(10, "A"), shot(10, "B")], 8, 6);
        let total: u32 = plan.iter().map(|s| s.seconds).sum();
        assert_eq!(total, 8);
        // second shot never reached
        assert!(plan.iter().all(|s| s.shot_index == 0));
    }

    #[test]
    fn empty_shots_synthesize_generic_shot() {
        let plan = plan_segments(&[], 4, 6);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].seconds, 4);
        assert_eq!(plan[0].prompt, GENERIC_SHOT_PROMPT);
    }

    #[test]
    fn shots_shorter_than_target_stop_early() {
        let plan = plan_segments(&[shot(6, "A")], 8, 6);
        let total: u32 = plan.iter().map(|s| s.seconds).sum();
        assert_eq!(total, 6);
    }
}
