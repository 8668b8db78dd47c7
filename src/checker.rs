//! Offline track-order audit of the append log.
//!
//! Upstream producers embed `Track: N` markers in event tokens, numbering
//! events 1, 2, 3, ... in the order they were sent. Once tokens land in the
//! log the markers should therefore be strictly ascending. This module reads
//! the log and reports:
//!
//! - order issues: an entry whose track is not greater than its predecessor's
//! - missing tracks: values of `1..=N` that never appear (N = entry count)
//! - duplicate tracks: values that appear more than once
//!
//! The three passes are independent; all of them run on every check.
//!
//! The missing-tracks pass assumes a dense numbering starting at 1. It is
//! advisory only: when the log also has duplicates or genuine gaps, N no
//! longer matches the producer's last track and the list is misleading.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

static TRACK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Track:\s*(\d+)").expect("track pattern is a valid regex"));

/// Errors that can occur while reading the log.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The log file does not exist.
    #[error("File not found - {}", .0.display())]
    NotFound(PathBuf),

    /// IO error reading the log.
    #[error("Error reading file: {0}")]
    Io(#[from] io::Error),
}

/// A track number parsed from a `Track: N` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Track(pub u64);

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry whose track is not greater than the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderIssue {
    /// 1-based index of the offending entry in the track sequence.
    pub position: usize,
    pub previous_track: Track,
    pub current_track: Track,
    /// Approximate line in the log, assuming one header line and one marker
    /// per line.
    pub line_number: usize,
}

/// Result of all passes over a non-empty track sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackReport {
    /// Tracks in document order.
    pub tracks: Vec<Track>,
    pub order_issues: Vec<OrderIssue>,
    /// Sorted values of `1..=tracks.len()` absent from `tracks`.
    pub missing: Vec<u64>,
    /// Repeated values, each once, in order of first repetition.
    pub duplicates: Vec<Track>,
}

impl TrackReport {
    /// Runs every pass over `tracks`.
    pub fn new(tracks: Vec<Track>) -> Self {
        let order_issues = find_order_issues(&tracks);
        let missing = find_missing_tracks(&tracks);
        let duplicates = find_duplicate_tracks(&tracks);
        TrackReport {
            tracks,
            order_issues,
            missing,
            duplicates,
        }
    }

    /// Returns true if tracks are strictly ascending with no duplicates.
    ///
    /// Missing tracks are ignored.
    pub fn is_consistent(&self) -> bool {
        self.order_issues.is_empty() && self.duplicates.is_empty()
    }
}

/// Outcome of checking one log file.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The log file does not exist.
    NotFound(PathBuf),
    /// The log could not be read.
    ReadFailed(io::Error),
    /// The log contains no `Track: N` markers.
    NoTracks,
    /// At least one marker was found.
    Report(TrackReport),
}

impl CheckOutcome {
    /// Returns true if the log showed order issues or duplicates.
    pub fn has_inconsistencies(&self) -> bool {
        matches!(self, CheckOutcome::Report(report) if !report.is_consistent())
    }
}

/// Reads the log and runs every pass.
///
/// Never fails: read errors are folded into the outcome.
pub fn check_log(path: &Path) -> CheckOutcome {
    let content = match read_log_snapshot(path) {
        Ok(content) => content,
        Err(CheckError::NotFound(path)) => return CheckOutcome::NotFound(path),
        Err(CheckError::Io(e)) => return CheckOutcome::ReadFailed(e),
    };
    check_content(&content)
}

/// Runs every pass over log text already in memory.
pub fn check_content(content: &str) -> CheckOutcome {
    let tracks = extract_tracks(content);
    if tracks.is_empty() {
        return CheckOutcome::NoTracks;
    }
    CheckOutcome::Report(TrackReport::new(tracks))
}

/// Reads the log as it was when opened.
///
/// Appends that land while reading are ignored: the read is bounded by the
/// length observed at open. Invalid UTF-8 is replaced, not rejected.
pub fn read_log_snapshot(path: &Path) -> Result<String, CheckError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CheckError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata()?.len();
    let mut bytes = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
    file.take(len).read_to_end(&mut bytes)?;

    Ok(match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Extracts every `Track: N` value in document order.
///
/// Values too large for `u64` are skipped.
pub fn extract_tracks(content: &str) -> Vec<Track> {
    TRACK_PATTERN
        .captures_iter(content)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok().map(Track))
        .collect()
}

/// Finds adjacent pairs that are not strictly ascending.
pub fn find_order_issues(tracks: &[Track]) -> Vec<OrderIssue> {
    tracks
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] <= pair[0])
        .map(|(i, pair)| {
            // `pair[1]` sits at index i + 1 of the sequence.
            let index = i + 1;
            OrderIssue {
                position: index + 1,
                previous_track: pair[0],
                current_track: pair[1],
                line_number: index + 2,
            }
        })
        .collect()
}

/// Lists values of `1..=tracks.len()` that do not occur in `tracks`.
pub fn find_missing_tracks(tracks: &[Track]) -> Vec<u64> {
    let present: HashSet<u64> = tracks.iter().map(|t| t.0).collect();
    (1..=tracks.len() as u64)
        .filter(|n| !present.contains(n))
        .collect()
}

/// Lists each value occurring more than once, in order of first repetition.
pub fn find_duplicate_tracks(tracks: &[Track]) -> Vec<Track> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for &track in tracks {
        if !seen.insert(track) && !duplicates.contains(&track) {
            duplicates.push(track);
        }
    }
    duplicates
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for TrackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found {} track entries.", self.tracks.len())?;
        writeln!(f, "Track numbers: [{}]", join(&self.tracks))?;

        if self.order_issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "All tracks are in ascending order!")?;
        } else {
            writeln!(f)?;
            writeln!(
                f,
                "INCONSISTENCIES FOUND: {} places where tracks are not in ascending order:",
                self.order_issues.len()
            )?;
            writeln!(f, "{}", "-".repeat(70))?;
            for issue in &self.order_issues {
                writeln!(
                    f,
                    "Position {}: Track {} comes after Track {}",
                    issue.position, issue.current_track, issue.previous_track
                )?;
                writeln!(
                    f,
                    "  Expected: Track {} < Track {}",
                    issue.previous_track, issue.current_track
                )?;
                writeln!(f, "  Approximate line: {}", issue.line_number)?;
                writeln!(f)?;
            }
        }

        if !self.missing.is_empty() {
            writeln!(
                f,
                "WARNING: Missing tracks (if expecting 1 to {}): [{}]",
                self.tracks.len(),
                join(&self.missing)
            )?;
        }
        if !self.duplicates.is_empty() {
            writeln!(
                f,
                "WARNING: Duplicate tracks found: [{}]",
                join(&self.duplicates)
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::NotFound(path) => {
                writeln!(f, "{}", CheckError::NotFound(path.clone()))
            }
            CheckOutcome::ReadFailed(e) => writeln!(f, "Error reading file: {e}"),
            CheckOutcome::NoTracks => writeln!(f, "No track numbers found in the file."),
            CheckOutcome::Report(report) => write!(f, "{report}"),
        }
    }
}
