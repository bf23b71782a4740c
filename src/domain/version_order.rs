//! Conda-style version ordering
//!
//! A version string is split into an optional epoch (`1!`), the release part
//! and an optional local part (`+local`). Release and local parts are split
//! into components on `.` and `_`, and each component into runs of digits and
//! non-digits:
//! - digit runs compare numerically
//! - any text sorts before any number, so `1.0a1 < 1.0`
//! - `dev` sorts before every other text, `post` after every number
//! - `final` is the release itself, so `1.0final == 1.0`
//! - missing components count as `0`, so `1.0 == 1.0.0`

use std::cmp::Ordering;
use std::fmt;

/// Characters allowed in a normalized version string
fn is_version_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_lowercase() || matches!(c, '*' | '.' | '+' | '!' | '_')
}

/// Reason a version string was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVersion {
    /// The rejected input
    pub version: String,
    /// Human readable reason
    pub reason: &'static str,
}

impl fmt::Display for InvalidVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version '{}': {}", self.version, self.reason)
    }
}

impl std::error::Error for InvalidVersion {}

/// A single run inside a version component
///
/// Variant order matters: text < number < post.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    /// Non-numeric run; `dev` is stored upper-cased so it sorts first
    Text(String),
    Number(u128),
    Post,
}

const FILL: Segment = Segment::Number(0);

type Component = Vec<Segment>;

/// Parsed, totally ordered representation of a version string
#[derive(Debug, Clone)]
pub struct VersionOrder {
    raw: String,
    release: Vec<Component>,
    local: Vec<Component>,
}

impl VersionOrder {
    /// Parse a version string
    pub fn parse(version: &str) -> Result<Self, InvalidVersion> {
        let invalid = |reason| InvalidVersion {
            version: version.to_string(),
            reason,
        };

        let mut normalized = version.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(invalid("empty version string"));
        }
        if !normalized.chars().all(is_version_char) {
            // dashes are accepted as long as there are no underscores
            if normalized.contains('-') && !normalized.contains('_') {
                normalized = normalized.replace('-', "_");
            }
            if !normalized.chars().all(is_version_char) {
                return Err(invalid("invalid character(s)"));
            }
        }

        let (epoch, rest) = match normalized.split('!').collect::<Vec<_>>().as_slice() {
            [rest] => ("0", *rest),
            [epoch, rest] => {
                if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("epoch must be an integer"));
                }
                (*epoch, *rest)
            }
            _ => return Err(invalid("duplicated epoch separator '!'")),
        };

        let (public, local) = match rest.split('+').collect::<Vec<_>>().as_slice() {
            [public] => (*public, None),
            [public, local] => (*public, Some(*local)),
            _ => return Err(invalid("duplicated local version separator '+'")),
        };
        if public.is_empty() {
            return Err(invalid("empty version component"));
        }

        // openssl-like versions keep a trailing underscore on the last component
        let mut parts: Vec<String> = match public.strip_suffix('_') {
            Some(stripped) => {
                let mut parts: Vec<String> = stripped.split(['.', '_']).map(String::from).collect();
                if let Some(last) = parts.last_mut() {
                    last.push('_');
                }
                parts
            }
            None => public.split(['.', '_']).map(String::from).collect(),
        };
        parts.insert(0, epoch.to_string());

        let release = parts
            .iter()
            .map(|part| parse_component(part).ok_or_else(|| invalid("empty version component")))
            .collect::<Result<Vec<_>, _>>()?;

        let local = match local {
            Some(local) => local
                .split(['.', '_'])
                .map(|part| {
                    parse_component(part).ok_or_else(|| invalid("empty version component"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            raw: version.to_string(),
            release,
            local,
        })
    }

    /// The version string this was parsed from
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Split a component into digit and non-digit runs
fn parse_component(part: &str) -> Option<Component> {
    if part.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    let mut chars = part.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let class = run_class(c);
        let mut end = start + c.len_utf8();
        while let Some(&(idx, next)) = chars.peek() {
            if run_class(next) != class {
                break;
            }
            end = idx + next.len_utf8();
            chars.next();
        }
        let run = &part[start..end];
        // `final` marks the release itself
        if run == "final" {
            continue;
        }
        let segment = match class {
            RunClass::Digit => match run.parse::<u128>() {
                Ok(n) => Segment::Number(n),
                // absurdly long numbers still order after any sane one
                Err(_) => Segment::Number(u128::MAX),
            },
            _ if run == "post" => Segment::Post,
            _ if run == "dev" => Segment::Text("DEV".to_string()),
            _ => Segment::Text(run.to_string()),
        };
        segments.push(segment);
    }

    // components start with a number to keep numbers and strings in phase
    if !part.starts_with(|c: char| c.is_ascii_digit()) {
        segments.insert(0, FILL);
    }
    Some(segments)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunClass {
    Digit,
    Star,
    Other,
}

fn run_class(c: char) -> RunClass {
    if c.is_ascii_digit() {
        RunClass::Digit
    } else if c == '*' {
        RunClass::Star
    } else {
        RunClass::Other
    }
}

/// Compare two component lists, padding both with zeros
fn cmp_components(a: &[Component], b: &[Component]) -> Ordering {
    let empty: Component = Vec::new();
    let zero = FILL;
    for i in 0..a.len().max(b.len()) {
        let ca = a.get(i).unwrap_or(&empty);
        let cb = b.get(i).unwrap_or(&empty);
        for j in 0..ca.len().max(cb.len()) {
            let sa = ca.get(j).unwrap_or(&zero);
            let sb = cb.get(j).unwrap_or(&zero);
            match sa.cmp(sb) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
    }
    Ordering::Equal
}

impl Ord for VersionOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_components(&self.release, &other.release)
            .then_with(|| cmp_components(&self.local, &other.local))
    }
}

impl PartialOrd for VersionOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionOrder {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionOrder {}

impl fmt::Display for VersionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for VersionOrder {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compare two version strings
pub fn compare(a: &str, b: &str) -> Result<Ordering, InvalidVersion> {
    Ok(VersionOrder::parse(a)?.cmp(&VersionOrder::parse(b)?))
}
