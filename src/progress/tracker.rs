//! Status / page / percentage / timestamp synchronization for one
//! (user, book) reading-progress row.
//!
//! An update is applied in a fixed order: explicit status, then explicit
//! timestamps, then `currentPage`, then `progressPercentage`, then rating and
//! review. Later steps may overwrite what earlier steps derived, so
//! `{status: reading, currentPage: pageCount}` ends up `completed`.

use time::OffsetDateTime;

use super::{ProgressUpdate, ReadingProgress, ReadingStatus};

pub struct ReadingProgressTracker {
    /// Known, positive page count of the book; `None` means no denominator.
    page_count: Option<i64>,
    now: OffsetDateTime,
}

impl ReadingProgressTracker {
    pub fn new(page_count: Option<i64>, now: OffsetDateTime) -> Self {
        Self {
            page_count: page_count.filter(|count| *count > 0),
            now,
        }
    }

    pub fn apply(&self, progress: &mut ReadingProgress, update: ProgressUpdate) {
        if let Some(status) = update.status {
            self.apply_status(progress, status);
        }
        // manual timestamps always win over what the status change derived
        if let Some(started_at) = update.started_at {
            progress.started_at = Some(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            progress.completed_at = Some(completed_at);
        }
        if let Some(page) = update.current_page {
            self.apply_page(progress, page);
        }
        if let Some(percentage) = update.progress_percentage {
            self.apply_percentage(progress, percentage);
        }
        if let Some(rating) = update.rating {
            progress.rating = Some(rating);
        }
        if let Some(review) = update.review {
            progress.review = Some(review);
        }
        progress.updated_at = self.now;
    }

    fn apply_status(&self, progress: &mut ReadingProgress, status: ReadingStatus) {
        let old_status = progress.status;
        progress.status = status;
        match status {
            ReadingStatus::Reading if old_status == ReadingStatus::NotStarted => {
                self.mark_started(progress);
            }
            ReadingStatus::Completed => {
                self.mark_completed(progress);
                if let Some(page_count) = self.page_count {
                    progress.current_page = page_count;
                    progress.progress_percentage = 100.0;
                }
            }
            ReadingStatus::NotStarted => {
                progress.current_page = 0;
                progress.progress_percentage = 0.0;
                progress.started_at = None;
                progress.completed_at = None;
            }
            _ => {}
        }
    }

    fn apply_page(&self, progress: &mut ReadingProgress, page: i64) {
        match self.page_count {
            Some(page_count) => {
                let page = page.clamp(0, page_count);
                progress.current_page = page;
                progress.progress_percentage = round2(page as f64 / page_count as f64 * 100.0);
                self.follow_percentage(progress);
            }
            None => {
                progress.current_page = page.max(0);
                progress.progress_percentage = 0.0;
            }
        }
    }

    fn apply_percentage(&self, progress: &mut ReadingProgress, percentage: f64) {
        progress.progress_percentage = if percentage.is_nan() {
            0.0
        } else {
            percentage.clamp(0.0, 100.0)
        };
        self.follow_percentage(progress);
    }

    /// Drive the status toward what the percentage says.
    fn follow_percentage(&self, progress: &mut ReadingProgress) {
        if progress.progress_percentage >= 100.0 {
            progress.status = ReadingStatus::Completed;
            self.mark_completed(progress);
        } else if progress.progress_percentage > 0.0 && progress.status == ReadingStatus::NotStarted
        {
            progress.status = ReadingStatus::Reading;
            self.mark_started(progress);
        }
    }

    fn mark_started(&self, progress: &mut ReadingProgress) {
        progress.started_at.get_or_insert(self.now);
    }

    fn mark_completed(&self, progress: &mut ReadingProgress) {
        progress.completed_at.get_or_insert(self.now);
    }
}

/// Two decimal places, ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2025-03-01 10:00 UTC);
    const T1: OffsetDateTime = datetime!(2025-03-02 10:00 UTC);

    fn fresh() -> ReadingProgress {
        ReadingProgress::new_default(1, 7, None, T0)
    }

    fn apply(progress: &mut ReadingProgress, page_count: Option<i64>, update: ProgressUpdate) {
        ReadingProgressTracker::new(page_count, T1).apply(progress, update);
    }

    #[test]
    fn page_update_starts_reading() {
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                current_page: Some(150),
                ..Default::default()
            },
        );
        assert_eq!(progress.progress_percentage, 50.0);
        assert_eq!(progress.status, ReadingStatus::Reading);
        assert_eq!(progress.started_at, Some(T1));
        assert_eq!(progress.completed_at, None);
    }

    #[test]
    fn completing_jumps_to_last_page() {
        let mut progress = fresh();
        progress.status = ReadingStatus::Reading;
        progress.current_page = 200;
        progress.progress_percentage = 66.67;
        progress.started_at = Some(T0);
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                status: Some(ReadingStatus::Completed),
                ..Default::default()
            },
        );
        assert_eq!(progress.current_page, 300);
        assert_eq!(progress.progress_percentage, 100.0);
        assert_eq!(progress.completed_at, Some(T1));
        assert_eq!(progress.started_at, Some(T0));
    }

    #[test]
    fn unknown_page_count_keeps_page_and_zero_percent() {
        for page_count in [None, Some(0), Some(-3)] {
            let mut progress = fresh();
            apply(
                &mut progress,
                page_count,
                ProgressUpdate {
                    current_page: Some(42),
                    ..Default::default()
                },
            );
            assert_eq!(progress.current_page, 42);
            assert_eq!(progress.progress_percentage, 0.0);
            assert_eq!(progress.status, ReadingStatus::NotStarted);
        }
    }

    #[test]
    fn not_started_resets_everything() {
        let mut progress = fresh();
        progress.status = ReadingStatus::Reading;
        progress.current_page = 120;
        progress.progress_percentage = 40.0;
        progress.started_at = Some(T0);
        progress.completed_at = Some(T0);
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                status: Some(ReadingStatus::NotStarted),
                ..Default::default()
            },
        );
        assert_eq!(progress.status, ReadingStatus::NotStarted);
        assert_eq!(progress.current_page, 0);
        assert_eq!(progress.progress_percentage, 0.0);
        assert_eq!(progress.started_at, None);
        assert_eq!(progress.completed_at, None);
    }

    #[test]
    fn page_is_clamped_to_page_count() {
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(250),
            ProgressUpdate {
                current_page: Some(999),
                ..Default::default()
            },
        );
        assert_eq!(progress.current_page, 250);
        assert_eq!(progress.progress_percentage, 100.0);
        assert_eq!(progress.status, ReadingStatus::Completed);
        assert_eq!(progress.completed_at, Some(T1));
    }

    #[test]
    fn percentage_is_rounded_to_two_places() {
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                current_page: Some(100),
                ..Default::default()
            },
        );
        assert_eq!(progress.progress_percentage, 33.33);
    }

    #[test]
    fn percentage_ties_round_to_even() {
        for (page_count, expected) in [(160, 0.62), (32, 3.12), (8, 12.5), (3, 33.33)] {
            let mut progress = fresh();
            apply(
                &mut progress,
                Some(page_count),
                ProgressUpdate {
                    current_page: Some(1),
                    ..Default::default()
                },
            );
            assert_eq!(progress.progress_percentage, expected, "1/{page_count}");
        }
    }

    #[test]
    fn page_percentage_matches_formula_for_every_page() {
        let page_count = 137;
        for page in 0..=page_count {
            let mut progress = fresh();
            apply(
                &mut progress,
                Some(page_count),
                ProgressUpdate {
                    current_page: Some(page),
                    ..Default::default()
                },
            );
            assert!(progress.current_page >= 0 && progress.current_page <= page_count);
            assert_eq!(
                progress.progress_percentage,
                round2(page as f64 / page_count as f64 * 100.0)
            );
            if progress.progress_percentage >= 100.0 {
                assert_eq!(progress.status, ReadingStatus::Completed);
                assert!(progress.completed_at.is_some());
            }
        }
    }

    #[test]
    fn percentage_override_wins_over_page() {
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                current_page: Some(30),
                progress_percentage: Some(100.0),
                ..Default::default()
            },
        );
        assert_eq!(progress.current_page, 30);
        assert_eq!(progress.progress_percentage, 100.0);
        assert_eq!(progress.status, ReadingStatus::Completed);
        assert_eq!(progress.completed_at, Some(T1));
    }

    #[test]
    fn percentage_is_clamped() {
        let mut progress = fresh();
        apply(
            &mut progress,
            None,
            ProgressUpdate {
                progress_percentage: Some(140.0),
                ..Default::default()
            },
        );
        assert_eq!(progress.progress_percentage, 100.0);
        assert_eq!(progress.status, ReadingStatus::Completed);

        let mut progress = fresh();
        apply(
            &mut progress,
            None,
            ProgressUpdate {
                progress_percentage: Some(-4.0),
                ..Default::default()
            },
        );
        assert_eq!(progress.progress_percentage, 0.0);
        assert_eq!(progress.status, ReadingStatus::NotStarted);
        assert_eq!(progress.started_at, None);
    }

    #[test]
    fn page_runs_after_status() {
        // status=reading then page==pageCount: the page step completes the book
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                status: Some(ReadingStatus::Reading),
                current_page: Some(300),
                ..Default::default()
            },
        );
        assert_eq!(progress.status, ReadingStatus::Completed);
        assert_eq!(progress.started_at, Some(T1));
        assert_eq!(progress.completed_at, Some(T1));
    }

    #[test]
    fn completing_twice_is_idempotent() {
        let mut progress = fresh();
        let update = || ProgressUpdate {
            status: Some(ReadingStatus::Completed),
            ..Default::default()
        };
        apply(&mut progress, Some(300), update());
        let first = progress.clone();
        apply(&mut progress, Some(300), update());
        assert_eq!(progress, first);
    }

    #[test]
    fn started_at_is_set_once() {
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                current_page: Some(10),
                ..Default::default()
            },
        );
        assert_eq!(progress.started_at, Some(T1));
        let later = datetime!(2025-04-01 08:00 UTC);
        ReadingProgressTracker::new(Some(300), later).apply(
            &mut progress,
            ProgressUpdate {
                current_page: Some(50),
                ..Default::default()
            },
        );
        assert_eq!(progress.started_at, Some(T1));
        assert_eq!(progress.updated_at, later);
    }

    #[test]
    fn explicit_timestamps_override_derived_ones() {
        let manual = datetime!(2024-12-24 18:30 UTC);
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                status: Some(ReadingStatus::Completed),
                started_at: Some(manual),
                completed_at: Some(manual),
                ..Default::default()
            },
        );
        assert_eq!(progress.started_at, Some(manual));
        assert_eq!(progress.completed_at, Some(manual));
    }

    #[test]
    fn completed_without_page_count_keeps_page() {
        let mut progress = fresh();
        progress.status = ReadingStatus::Reading;
        progress.current_page = 12;
        apply(
            &mut progress,
            None,
            ProgressUpdate {
                status: Some(ReadingStatus::Completed),
                ..Default::default()
            },
        );
        assert_eq!(progress.status, ReadingStatus::Completed);
        assert_eq!(progress.current_page, 12);
        assert_eq!(progress.progress_percentage, 0.0);
        assert_eq!(progress.completed_at, Some(T1));
    }

    #[test]
    fn abandoning_keeps_position_and_timestamps() {
        let mut progress = fresh();
        progress.status = ReadingStatus::Reading;
        progress.current_page = 80;
        progress.progress_percentage = 26.67;
        progress.started_at = Some(T0);
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                status: Some(ReadingStatus::Abandoned),
                ..Default::default()
            },
        );
        assert_eq!(progress.status, ReadingStatus::Abandoned);
        assert_eq!(progress.current_page, 80);
        assert_eq!(progress.started_at, Some(T0));
    }

    #[test]
    fn rating_and_review_are_plain_overwrites() {
        let mut progress = fresh();
        apply(
            &mut progress,
            Some(300),
            ProgressUpdate {
                rating: Some(4),
                review: Some("Slow start, great ending".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(progress.rating, Some(4));
        assert_eq!(progress.review.as_deref(), Some("Slow start, great ending"));
        assert_eq!(progress.status, ReadingStatus::NotStarted);
        assert_eq!(progress.current_page, 0);
    }
}
