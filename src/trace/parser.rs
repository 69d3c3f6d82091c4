//! Two-grammar tokenizer for captured scheduler output.
//!
//! Captured text interleaves trace lines with shell prompts and boot
//! banners. A line is a trace line only if it starts with one or more
//! digits immediately followed by `|`; everything else is discarded.
//!
//! Trace lines come in two shapes:
//!
//! ```text
//! terse:  <tick>|<unused>|[<pid>]<name>(<quantum>)...
//! full:   <tick>|<active|expired>|<level>(<level_quantum>),[<pid>]<name>:<state>(<quantum>)...
//! ```
//!
//! The full grammar is strict: a qualifying line that does not match, or
//! whose process list has bytes not covered by an entry, is a hard
//! [`SchedlogError::Format`]. The terse grammar is permissive: entries are
//! picked out of the process field and anything unusable is skipped.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{SchedlogError, SchedlogResult};
use crate::tick::Tick;

use super::model::{LevelObservation, ProcessObservation, QueueSet, TickLog, TickSnapshot, Trace};
use super::pid::Pid;

// ── Grammar ───────────────────────────────────────────────────────────

/// Which trace-line grammar to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `tick|unused|procs`, permissive, used for metric extraction.
    Terse,
    /// `tick|set|level(lq)procs`, strict, used for invariant checking.
    Full,
}

/// A successfully tokenized trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    Terse(TickSnapshot),
    Full(LevelObservation),
}

/// What happened to one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not a trace line (prompt, banner, blank).
    NotTrace,
    /// A trace line the terse grammar could not use.
    Skipped { reason: &'static str },
    Parsed(TraceLine),
}

// ── Regexes ───────────────────────────────────────────────────────────

fn trace_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\|").expect("trace prefix regex"))
}

fn full_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<tick>\d+)\|(?P<set>[^|]*)\|(?P<level>-?\d+)\((?P<lq>-?\d+)\)(?P<procs>.*)$",
        )
        .expect("full line regex")
    })
}

fn full_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r",\[(?P<pid>\d+)\](?P<name>[^:\[\](),]+):(?P<state>\d+)\((?P<q>-?\d+)\)")
            .expect("full entry regex")
    })
}

fn terse_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?P<pid>\d+)\](?P<name>\w+)(?::(?P<state>\w*))?\((?P<q>\d+)\)")
            .expect("terse entry regex")
    })
}

// ── Line classification ───────────────────────────────────────────────

/// Whether `line` (already trimmed) qualifies as a trace line.
pub fn is_trace_line(line: &str) -> bool {
    trace_prefix_regex().is_match(line)
}

/// Trimmed trace lines of `text`, in order.
pub fn trace_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| is_trace_line(l))
}

// ── Full grammar ──────────────────────────────────────────────────────

/// Parse one full-grammar line.
pub fn parse_full_line(line: &str) -> SchedlogResult<LevelObservation> {
    let caps = full_line_regex()
        .captures(line)
        .ok_or_else(|| SchedlogError::format("line does not match full grammar", line, line))?;

    let tick = parse_number::<u64>(&caps["tick"], "tick", line)?;
    let queue_set = caps["set"]
        .parse::<QueueSet>()
        .map_err(|_| SchedlogError::format("unknown queue set", &caps["set"], line))?;
    let level = parse_number::<i64>(&caps["level"], "level", line)?;
    let level_quantum = parse_number::<i64>(&caps["lq"], "level quantum", line)?;

    let procs = &caps["procs"];
    let mut processes = Vec::new();
    let mut pos = 0;

    for m in full_entry_regex().captures_iter(procs) {
        let Some(whole) = m.get(0) else { continue };
        if whole.start() != pos {
            return Err(SchedlogError::format(
                "invalid text in process list",
                &procs[pos..whole.start()],
                line,
            ));
        }
        pos = whole.end();

        processes.push(ProcessObservation::new(
            Pid::new(parse_number::<u32>(&m["pid"], "pid", line)?),
            &m["name"],
            Some(parse_number::<u32>(&m["state"], "state", line)?),
            parse_number::<i64>(&m["q"], "quantum", line)?,
        ));
    }

    if pos != procs.len() {
        return Err(SchedlogError::format(
            "trailing invalid text in process list",
            &procs[pos..],
            line,
        ));
    }

    Ok(LevelObservation {
        tick: Tick::new(tick),
        queue_set,
        level,
        level_quantum,
        processes,
    })
}

/// Parse captured text with the full grammar. Any malformed trace line
/// fails the whole trace.
pub fn parse_full(text: &str) -> SchedlogResult<Trace> {
    let levels = trace_lines(text)
        .map(parse_full_line)
        .collect::<SchedlogResult<Vec<_>>>()?;
    tracing::debug!(lines = levels.len(), "parsed full-grammar trace");
    Ok(Trace::new(levels))
}

// ── Terse grammar ─────────────────────────────────────────────────────

/// Tokenize one terse-grammar line.
pub fn parse_terse_line(line: &str) -> LineOutcome {
    if !is_trace_line(line) {
        return LineOutcome::NotTrace;
    }

    let mut parts = line.splitn(3, '|');
    let (Some(tick), Some(field), Some(procs)) = (parts.next(), parts.next(), parts.next()) else {
        return LineOutcome::Skipped {
            reason: "fewer than three fields",
        };
    };
    let Ok(tick) = tick.parse::<u64>() else {
        return LineOutcome::Skipped {
            reason: "tick out of range",
        };
    };

    let processes = terse_entry_regex()
        .captures_iter(procs)
        .filter_map(|m| {
            let pid = m["pid"].parse::<u32>().ok()?;
            let quantum = m["q"].parse::<i64>().ok()?;
            let state = m.name("state").and_then(|s| s.as_str().parse::<u32>().ok());
            Some(ProcessObservation::new(Pid::new(pid), &m["name"], state, quantum))
        })
        .collect();

    LineOutcome::Parsed(TraceLine::Terse(TickSnapshot::new(
        Tick::new(tick),
        field,
        processes,
    )))
}

/// Parse captured text with the terse grammar. Never fails; unusable
/// lines are dropped.
pub fn parse_terse(text: &str) -> TickLog {
    let mut snapshots = Vec::new();
    let mut skipped = 0usize;

    for line in text.lines().map(str::trim) {
        match parse_terse_line(line) {
            LineOutcome::Parsed(TraceLine::Terse(snap)) => snapshots.push(snap),
            LineOutcome::Skipped { reason } => {
                skipped += 1;
                tracing::debug!(line, reason, "skipped terse trace line");
            }
            LineOutcome::NotTrace | LineOutcome::Parsed(TraceLine::Full(_)) => {}
        }
    }

    tracing::debug!(lines = snapshots.len(), skipped, "parsed terse trace");
    TickLog::new(snapshots)
}

// ── Dispatch ──────────────────────────────────────────────────────────

/// Tokenize one line with the given grammar.
pub fn parse_line(line: &str, grammar: Grammar) -> SchedlogResult<LineOutcome> {
    let line = line.trim();
    match grammar {
        Grammar::Terse => Ok(parse_terse_line(line)),
        Grammar::Full if !is_trace_line(line) => Ok(LineOutcome::NotTrace),
        Grammar::Full => Ok(LineOutcome::Parsed(TraceLine::Full(parse_full_line(line)?))),
    }
}

/// Read and parse a captured log file with the full grammar.
pub fn read_full(path: &Path) -> SchedlogResult<Trace> {
    let text = std::fs::read_to_string(path).map_err(|e| SchedlogError::io(path, e))?;
    parse_full(&text)
}

/// Read and parse a captured log file with the terse grammar.
pub fn read_terse(path: &Path) -> SchedlogResult<TickLog> {
    let text = std::fs::read_to_string(path).map_err(|e| SchedlogError::io(path, e))?;
    Ok(parse_terse(&text))
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str, line: &str) -> SchedlogResult<T> {
    raw.parse::<T>()
        .map_err(|_| SchedlogError::format(format!("{} out of range", what), raw, line))
}
