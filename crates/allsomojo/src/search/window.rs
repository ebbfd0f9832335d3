use chrono::{DateTime, Days, NaiveDate, Utc};

/// A half-open date range `[start, end)` searched as one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SearchWindow {
    /// The `created:` qualifier for this window.
    ///
    /// GitHub ranges are inclusive on both ends, so the last day is
    /// `end - 1`.
    pub fn qualifier(&self) -> String {
        let last = self.end.pred_opt().unwrap_or(self.end).max(self.start);
        format!(
            "created:{}..{}",
            self.start.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        )
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Split `[start, end)` into consecutive windows of `step_days`.
///
/// The last window is shortened to end at `end`. Windows never overlap and
/// leave no gaps. An empty or inverted range yields nothing.
pub fn search_windows(start: NaiveDate, end: NaiveDate, step_days: u32) -> Vec<SearchWindow> {
    let step = Days::new(u64::from(step_days.max(1)));
    let mut windows = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let next = cursor.checked_add_days(step).map_or(end, |d| d.min(end));
        windows.push(SearchWindow {
            start: cursor,
            end: next,
        });
        cursor = next;
    }
    windows
}

/// Where an incremental search starts.
///
/// The newest `updated_at` in the catalog minus `backoff_days`, so entries
/// updated around the previous run are seen again; never earlier than
/// `epoch`. An empty catalog starts at `epoch`.
pub fn resume_date(
    watermark: Option<DateTime<Utc>>,
    backoff_days: u32,
    epoch: NaiveDate,
) -> NaiveDate {
    match watermark {
        Some(newest) => newest
            .date_naive()
            .checked_sub_days(Days::new(u64::from(backoff_days)))
            .unwrap_or(epoch)
            .max(epoch),
        None => epoch,
    }
}
