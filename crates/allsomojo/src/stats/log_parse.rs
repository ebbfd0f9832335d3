//! Parser for `git log --stat` output.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::StatsError;

static COMMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^commit [0-9a-f]{40,64}\b").expect("valid commit regex"));

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^ ?(\d+) files? changed(?:, (\d+) insertions?\(\+\))?(?:, (\d+) deletions?\(-\))?\s*$",
    )
    .expect("valid summary regex")
});

static FILE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ ?([^\s|].*?)\s+\|\s+(?:\d+|Bin\b)").expect("valid file-line regex")
});

/// Change totals over a window of history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// Distinct paths touched.
    pub files_changed: BTreeSet<String>,
}

impl CommitStats {
    pub fn n_files_changed(&self) -> usize {
        self.files_changed.len()
    }
}

fn capture_u64(caps: &regex::Captures<'_>, index: usize) -> u64 {
    caps.get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn accumulate(stats: &mut CommitStats, segment: &[&str]) {
    let Some(last) = segment.iter().rev().find(|line| !line.trim().is_empty()) else {
        return;
    };
    let Some(caps) = SUMMARY_RE.captures(last) else {
        // Merge commits and empty commits carry no summary line.
        return;
    };
    stats.lines_added += capture_u64(&caps, 2);
    stats.lines_deleted += capture_u64(&caps, 3);

    for line in segment {
        if let Some(file) = FILE_LINE_RE.captures(line).and_then(|c| c.get(1)) {
            stats.files_changed.insert(file.as_str().to_string());
        }
    }
}

/// Sum insertions, deletions and touched paths over every commit in `log`.
///
/// Unrecognized text is ignored, so malformed input degrades to partial
/// totals rather than an error.
pub fn parse_stat_log(log: &str) -> CommitStats {
    let mut stats = CommitStats::default();
    let mut segment: Vec<&str> = Vec::new();

    for line in log.lines() {
        if COMMIT_RE.is_match(line) {
            accumulate(&mut stats, &segment);
            segment.clear();
        } else {
            segment.push(line);
        }
    }
    accumulate(&mut stats, &segment);
    stats
}

/// Number of non-empty lines, one per commit in `--oneline` output.
pub fn count_commit_lines(log: &str) -> u64 {
    log.lines().filter(|line| !line.trim().is_empty()).count() as u64
}

const SAMPLE_LOG: &str = "\
commit 5d7f1c0a9b3e8d2f4a6c1b0e9d8c7b6a5f4e3d2c
Author: Dev <dev@example.com>
Date:   Mon May 1 12:00:00 2023 +0000

    add kernels

 src/matmul.mojo | 12 ++++++++----
 README.md       |  3 ++-
 2 files changed, 10 insertions(+), 5 deletions(-)

commit 0a1b2c3d4e5f60718293a4b5c6d7e8f901234567
Author: Dev <dev@example.com>
Date:   Sun Apr 30 12:00:00 2023 +0000

    tidy

 src/matmul.mojo | 2 +-
 1 file changed, 1 insertion(+), 1 deletion(-)
";

/// Check the parser against a known log before touching any mirror.
pub fn self_test() -> Result<(), StatsError> {
    let parsed = parse_stat_log(SAMPLE_LOG);
    let expected = (11, 6, 2);
    let actual = (
        parsed.lines_added,
        parsed.lines_deleted,
        parsed.n_files_changed(),
    );
    if actual != expected {
        return Err(StatsError::FormatDrift {
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_across_commits_and_dedups_paths() {
        let log = "\
commit 1111111111111111111111111111111111111111
Author: a <a@b>

    one

 a.mojo | 10 ++++++++++
 1 file changed, 10 insertions(+)

commit 2222222222222222222222222222222222222222
Author: a <a@b>

    two

 a.mojo | 2 +-
 b.py   | 3 ---
 2 files changed, 1 insertion(+), 5 deletions(-)
";
        let stats = parse_stat_log(log);
        assert_eq!(stats.lines_added, 11);
        assert_eq!(stats.lines_deleted, 5);
        assert_eq!(stats.n_files_changed(), 2);
        assert!(stats.files_changed.contains("a.mojo"));
        assert!(stats.files_changed.contains("b.py"));
    }

    #[test]
    fn missing_clauses_count_as_zero() {
        let log = "\
commit 3333333333333333333333333333333333333333

    delete only

 old.py | 4 ----
 1 file changed, 4 deletions(-)
";
        let stats = parse_stat_log(log);
        assert_eq!(stats.lines_added, 0);
        assert_eq!(stats.lines_deleted, 4);
    }

    #[test]
    fn empty_and_garbage_input_yield_zeros() {
        assert_eq!(parse_stat_log(""), CommitStats::default());
        assert_eq!(
            parse_stat_log("fatal: not a git repository\n"),
            CommitStats::default()
        );
    }

    #[test]
    fn binary_files_are_tracked() {
        let log = "\
commit 4444444444444444444444444444444444444444

    logo

 assets/logo.png | Bin 0 -> 1024 bytes
 1 file changed, 0 insertions(+), 0 deletions(-)
";
        let stats = parse_stat_log(log);
        assert!(stats.files_changed.contains("assets/logo.png"));
    }

    #[test]
    fn commit_lines_skip_blanks() {
        assert_eq!(count_commit_lines("abc123 one\ndef456 two\n\n"), 2);
        assert_eq!(count_commit_lines(""), 0);
    }

    #[test]
    fn sample_passes_self_test() {
        self_test().expect("parser matches sample");
    }
}
