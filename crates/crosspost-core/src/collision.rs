//! Advisory detection of posts scheduled too close together on a channel.
//!
//! The check is read-only and never blocks scheduling; callers attach its
//! result to their response as a warning.

use chrono::{DateTime, Duration, Utc};

/// Scheduling footprint of one post: when it goes out and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSchedule {
    pub post_id: i64,
    pub schedule_time: Option<DateTime<Utc>>,
    pub channel_ids: Vec<i64>,
}

/// Returns `true` if another post shares a channel with `candidate` and is
/// scheduled within `window` of it (inclusive on both ends).
///
/// Posts without a delivery instant never collide, and `candidate` is
/// skipped if it also appears in `others`.
#[must_use]
pub fn has_collision(candidate: &PostSchedule, others: &[PostSchedule], window: Duration) -> bool {
    let Some(at) = candidate.schedule_time else {
        return false;
    };

    candidate.channel_ids.iter().any(|channel| {
        others
            .iter()
            .filter(|other| other.post_id != candidate.post_id)
            .filter(|other| other.channel_ids.contains(channel))
            .filter_map(|other| other.schedule_time)
            .any(|scheduled| scheduled - window <= at && at <= scheduled + window)
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, second).unwrap()
    }

    fn post(post_id: i64, when: Option<DateTime<Utc>>, channels: &[i64]) -> PostSchedule {
        PostSchedule {
            post_id,
            schedule_time: when,
            channel_ids: channels.to_vec(),
        }
    }

    fn window() -> Duration {
        Duration::minutes(5)
    }

    #[test]
    fn detects_overlap_on_shared_channel() {
        let candidate = post(1, Some(at(10, 0)), &[7]);
        let others = [post(2, Some(at(13, 0)), &[7, 8])];
        assert!(has_collision(&candidate, &others, window()));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let candidate = post(1, Some(at(15, 0)), &[7]);
        let others = [post(2, Some(at(10, 0)), &[7])];
        assert!(has_collision(&candidate, &others, window()));

        let candidate = post(1, Some(at(15, 1)), &[7]);
        assert!(!has_collision(&candidate, &others, window()));
    }

    #[test]
    fn check_is_symmetric() {
        for (a, b) in [(at(0, 0), at(4, 59)), (at(0, 0), at(5, 0)), (at(0, 0), at(5, 1))] {
            let first = post(1, Some(a), &[3]);
            let second = post(2, Some(b), &[3]);
            assert_eq!(
                has_collision(&first, std::slice::from_ref(&second), window()),
                has_collision(&second, std::slice::from_ref(&first), window()),
                "asymmetric result for {a} vs {b}"
            );
            let expected = (b - a).abs() <= window();
            assert_eq!(
                has_collision(&first, std::slice::from_ref(&second), window()),
                expected
            );
        }
    }

    #[test]
    fn disjoint_channels_never_collide() {
        let candidate = post(1, Some(at(10, 0)), &[1]);
        let others = [post(2, Some(at(10, 0)), &[2])];
        assert!(!has_collision(&candidate, &others, window()));
    }

    #[test]
    fn unscheduled_posts_are_ignored() {
        let candidate = post(1, None, &[1]);
        let others = [post(2, Some(at(10, 0)), &[1])];
        assert!(!has_collision(&candidate, &others, window()));

        let candidate = post(1, Some(at(10, 0)), &[1]);
        let others = [post(2, None, &[1])];
        assert!(!has_collision(&candidate, &others, window()));
    }

    #[test]
    fn candidate_does_not_collide_with_itself() {
        let candidate = post(1, Some(at(10, 0)), &[1]);
        assert!(!has_collision(
            &candidate,
            std::slice::from_ref(&candidate),
            window()
        ));
    }
}
