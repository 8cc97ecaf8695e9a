//! Deterministic handling of time expressions in user messages.
//!
//! The model is asked to produce the `@timestamp` post-filter itself, but its
//! output is corrected here: no temporal language means no filter at all, and
//! expressions we can resolve exactly (month names, ISO dates, "last week")
//! replace whatever range the model guessed. English and German are
//! recognised.

use crate::search::query::{RangeBounds, SearchQueryDocument};
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

// Groups: leading day ("5 March", "5. März"), name, trailing day, year
static MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(\d{1,2})(?:\.|st|nd|rd|th)?\s+)?(january|february|march|april|may|june|july|august|september|october|november|december|januar|februar|märz|maerz|mai|juni|juli|oktober|dezember)\b(?:\s+(\d{1,2})(?:st|nd|rd|th)?\b)?(?:,?\s+(\d{4})\b)?",
    )
    .unwrap()
});

static LAST_N_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:last|past|letzten|vergangenen)\s+(\d{1,3})\s+(?:days?|tagen?)\b").unwrap()
});

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(today|yesterday|heute|gestern|(this|last|previous|past|diese[nrs]?|letzte[nrs]?|vorige[nrs]?|vergangene[nrs]?)\s+(week|month|year|woche|monat|jahr))\b",
    )
    .unwrap()
});

static BARE_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|during|for|im\s+jahr|im|aus)\s+((?:19|20)\d{2})\b").unwrap()
});

static TEMPORAL_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(ago|since|until|recent|recently|latest|days?|weeks?|months?|years?|hours?|minutes?|tonight|weekend|monday|tuesday|wednesday|thursday|friday|saturday|sunday|quarter|q[1-4]|seit|kürzlich|neulich|zuletzt|tagen?|wochen?|monate[n]?|jahre[n]?|stunden?|minuten?|wochenende|montag|dienstag|mittwoch|donnerstag|freitag|samstag|sonntag|quartal)\b",
    )
    .unwrap()
});

// Words before "may" that make it the month
const MONTH_PREPOSITIONS: &[&str] = &[
    "in", "from", "during", "since", "of", "until", "till", "through", "to", "and", "before",
    "after", "early", "late", "mid", "for", "last", "next",
];

// Words around "may" that make it the verb
const VERB_NEIGHBOURS: &[&str] = &[
    "i", "we", "you", "he", "she", "it", "they", "this", "that", "which", "who", "what",
    "there",
];

/// What the message says about time.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeIntent {
    /// No temporal language at all.
    Absent,
    /// An exact inclusive range could be computed.
    Resolved(RangeBounds),
    /// Temporal language we cannot pin down; the model's range stands.
    Unresolved,
}

pub fn analyze(message: &str, today: NaiveDate) -> TimeIntent {
    if let Some((start, end)) = iso_dates(message) {
        return TimeIntent::Resolved(day_span(start, end));
    }
    let months = month_names(message, today);
    if let Some((start, end)) = months.span {
        return TimeIntent::Resolved(day_span(start, end));
    }
    if let Some((start, end)) = relative(message, today) {
        return TimeIntent::Resolved(day_span(start, end));
    }
    if let Some((start, end)) = bare_year(message) {
        return TimeIntent::Resolved(day_span(start, end));
    }
    if months.ambiguous || TEMPORAL_HINT.is_match(message) {
        return TimeIntent::Unresolved;
    }
    TimeIntent::Absent
}

/// Rewrites the document's post-filter according to the message.
pub fn apply(document: &mut SearchQueryDocument, message: &str, today: NaiveDate) {
    match analyze(message, today) {
        TimeIntent::Absent => document.set_time_range(None),
        TimeIntent::Resolved(bounds) => document.set_time_range(Some(bounds)),
        TimeIntent::Unresolved => {}
    }
}

fn day_span(start: NaiveDate, end: NaiveDate) -> RangeBounds {
    RangeBounds {
        gte: format!("{}T00:00:00Z", start.format("%Y-%m-%d")),
        lte: format!("{}T23:59:59Z", end.format("%Y-%m-%d")),
    }
}

fn month_span(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next - Duration::days(1)))
}

fn widen(acc: Option<(NaiveDate, NaiveDate)>, span: (NaiveDate, NaiveDate)) -> (NaiveDate, NaiveDate) {
    match acc {
        None => span,
        Some((start, end)) => (start.min(span.0), end.max(span.1)),
    }
}

fn iso_dates(message: &str) -> Option<(NaiveDate, NaiveDate)> {
    ISO_DATE
        .captures_iter(message)
        .filter_map(|c| {
            NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
        })
        .fold(None, |acc, day| Some(widen(acc, (day, day))))
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "january" | "januar" => 1,
        "february" | "februar" => 2,
        "march" | "märz" | "maerz" => 3,
        "april" => 4,
        "may" | "mai" => 5,
        "june" | "juni" => 6,
        "july" | "juli" => 7,
        "august" => 8,
        "september" => 9,
        "october" | "oktober" => 10,
        "november" => 11,
        "december" | "dezember" => 12,
        _ => return None,
    };
    Some(month)
}

#[derive(Debug, Default)]
struct MonthScan {
    span: Option<(NaiveDate, NaiveDate)>,
    /// A "may" that could be either the month or the verb.
    ambiguous: bool,
}

enum MayReading {
    Month,
    Verb,
    Unclear,
}

fn neighbour_word(text: &str, last: bool) -> Option<String> {
    let mut words = text.split_whitespace();
    let word = if last { words.next_back() } else { words.next() }?;
    let word = word.trim_matches(|c: char| !c.is_alphanumeric());
    (!word.is_empty()).then(|| word.to_lowercase())
}

fn read_may(message: &str, start: usize, end: usize) -> MayReading {
    let before = neighbour_word(&message[..start], true);
    let after = neighbour_word(&message[end..], false);

    if before
        .as_deref()
        .is_some_and(|w| MONTH_PREPOSITIONS.contains(&w))
    {
        return MayReading::Month;
    }
    let verb_context = |w: &Option<String>| {
        w.as_deref().is_some_and(|w| VERB_NEIGHBOURS.contains(&w))
    };
    // "May I ..." opens a request; "it may ..." and "errors may ..." are modal
    if (before.is_none() && verb_context(&after)) || verb_context(&before) {
        return MayReading::Verb;
    }
    MayReading::Unclear
}

fn month_names(message: &str, today: NaiveDate) -> MonthScan {
    let mut scan = MonthScan::default();

    for c in MONTH.captures_iter(message) {
        let Some(name) = c.get(2) else { continue };
        let Some(month) = month_number(name.as_str()) else { continue };
        let day = c.get(1).or_else(|| c.get(3));
        let dated = day.is_some() || c.get(4).is_some();

        if name.as_str().eq_ignore_ascii_case("may") && !dated {
            match read_may(message, name.start(), name.end()) {
                MayReading::Month => {}
                MayReading::Verb => continue,
                MayReading::Unclear => {
                    scan.ambiguous = true;
                    continue;
                }
            }
        }

        let year = match c.get(4).and_then(|y| y.as_str().parse().ok()) {
            Some(year) => year,
            None if month > today.month() => today.year() - 1,
            None => today.year(),
        };
        let span = match day.and_then(|d| d.as_str().parse::<u32>().ok()) {
            Some(day) => NaiveDate::from_ymd_opt(year, month, day).map(|d| (d, d)),
            None => month_span(year, month),
        };
        if let Some(span) = span {
            scan.span = Some(widen(scan.span, span));
        }
    }

    scan
}

fn relative(message: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    if let Some(c) = LAST_N_DAYS.captures(message) {
        let days: i64 = c[1].parse().ok()?;
        let days = days.max(1);
        return Some((today - Duration::days(days - 1), today));
    }

    let c = RELATIVE.captures(message)?;
    match c[1].to_lowercase().as_str() {
        "today" | "heute" => return Some((today, today)),
        "yesterday" | "gestern" => {
            let day = today - Duration::days(1);
            return Some((day, day));
        }
        _ => {}
    }

    let which = c[2].to_lowercase();
    let which = match which.as_str() {
        "this" => "this",
        "past" => "past",
        w if w.starts_with("dies") => "this",
        _ => "last",
    };
    let unit = match c[3].to_lowercase().as_str() {
        "week" | "woche" => "week",
        "month" | "monat" => "month",
        _ => "year",
    };
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);

    match (which, unit) {
        ("this", "week") => Some((monday, monday + Duration::days(6))),
        ("past", "week") => Some((today - Duration::days(6), today)),
        (_, "week") => {
            let start = monday - Duration::days(7);
            Some((start, start + Duration::days(6)))
        }
        ("this", "month") => month_span(today.year(), today.month()),
        ("past", "month") => Some((today - Duration::days(29), today)),
        (_, "month") => {
            let (year, month) = if today.month() == 1 {
                (today.year() - 1, 12)
            } else {
                (today.year(), today.month() - 1)
            };
            month_span(year, month)
        }
        ("this", "year") => year_span(today.year()),
        ("past", "year") => Some((today - Duration::days(364), today)),
        (_, "year") => year_span(today.year() - 1),
        _ => None,
    }
}

fn year_span(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

fn bare_year(message: &str) -> Option<(NaiveDate, NaiveDate)> {
    let c = BARE_YEAR.captures(message)?;
    year_span(c[1].parse().ok()?)
}
