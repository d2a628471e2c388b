//! Tag parsing, transformation and candidate selection.

use std::cmp::Ordering;

use regex::Regex;
use semver::Version;
use shipwatch_core::error::{Result, WatchError};
use shipwatch_core::model::{Container, SemverDiff};

/// Apply a `<regex> => <replacement>` formula to a tag.
///
/// `$1`..`$n` in the replacement refer to capture groups. A missing formula,
/// an invalid regex or a non-matching tag leaves the tag unchanged.
pub fn transform_tag(formula: Option<&str>, tag: &str) -> String {
    let Some(formula) = formula.map(str::trim).filter(|f| !f.is_empty()) else {
        return tag.to_string();
    };
    let Some((pattern, replacement)) = formula.split_once("=>") else {
        return tag.to_string();
    };
    let Ok(regex) = Regex::new(pattern.trim()) else {
        return tag.to_string();
    };
    let Some(captures) = regex.captures(tag) else {
        return tag.to_string();
    };

    let mut transformed = String::new();
    let mut chars = replacement.trim().chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            transformed.push(c);
            continue;
        }
        let mut group = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            group.push(d);
            chars.next();
        }
        match group.parse::<usize>() {
            Ok(index) => {
                if let Some(m) = captures.get(index) {
                    transformed.push_str(m.as_str());
                }
            }
            Err(_) => transformed.push('$'),
        }
    }
    transformed
}

/// Lenient semver parse.
///
/// Strips a leading `v`/`V`/`=` and pads `X` and `X.Y` to three components,
/// keeping any pre-release or build suffix. Returns `None` for tags that
/// are not versions (`latest`, `alpine`, ...).
pub fn parse_semver(tag: &str) -> Option<Version> {
    let cleaned = tag
        .trim()
        .trim_start_matches(['v', 'V', '='])
        .trim();
    if let Ok(version) = Version::parse(cleaned) {
        return Some(version);
    }

    let split = cleaned.find(['-', '+']).unwrap_or(cleaned.len());
    let (core, suffix) = cleaned.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&format!("{}{}", padded, suffix)).ok()
}

/// Semver precedence: build metadata is ignored.
pub fn compare_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Whether `candidate` is strictly greater than `current` (both parsed leniently).
pub fn is_greater_semver(candidate: &str, current: &str) -> bool {
    match (parse_semver(candidate), parse_semver(current)) {
        (Some(candidate), Some(current)) => {
            compare_precedence(&candidate, &current) == Ordering::Greater
        }
        _ => false,
    }
}

/// Most significant component that differs between two versions.
///
/// Pre-release changes on a differing major/minor/patch count as that
/// component; a change confined to the pre-release counts as `Prerelease`.
pub fn semver_diff(from: &str, to: &str) -> SemverDiff {
    let (Some(from), Some(to)) = (parse_semver(from), parse_semver(to)) else {
        return SemverDiff::Unknown;
    };
    if from.major != to.major {
        SemverDiff::Major
    } else if from.minor != to.minor {
        SemverDiff::Minor
    } else if from.patch != to.patch {
        SemverDiff::Patch
    } else if from.pre != to.pre {
        SemverDiff::Prerelease
    } else {
        SemverDiff::Unknown
    }
}

/// Include/exclude tag filters of one container.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl TagFilter {
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        Ok(Self {
            include: compile(include, "include")?,
            exclude: compile(exclude, "exclude")?,
        })
    }

    pub fn from_container(container: &Container) -> Result<Self> {
        Self::new(
            container.include_tags.as_deref(),
            container.exclude_tags.as_deref(),
        )
    }

    pub fn accepts(&self, tag: &str) -> bool {
        self.include.as_ref().map_or(true, |re| re.is_match(tag))
            && !self.exclude.as_ref().is_some_and(|re| re.is_match(tag))
    }
}

fn compile(pattern: Option<&str>, which: &str) -> Result<Option<Regex>> {
    match pattern.map(str::trim).filter(|p| !p.is_empty()) {
        Some(pattern) => Regex::new(pattern).map(Some).map_err(|e| {
            WatchError::Parse(format!("invalid {} tag regex '{}': {}", which, pattern, e))
        }),
        None => Ok(None),
    }
}

/// Ordered update candidates for a container from the registry's tag list.
///
/// Semver tags yield every strictly greater version, most recent first and
/// without precedence ties. Non-semver tags yield the filtered list in
/// registry order minus the current tag; whether one of them is a real
/// update is left to digest comparison.
pub fn tag_candidates(container: &Container, tags: &[String]) -> Result<Vec<String>> {
    let filter = TagFilter::from_container(container)?;
    let transform = container.transform_tags.as_deref();
    let current = &container.image.tag.value;
    let filtered = tags.iter().filter(|tag| filter.accepts(tag));

    if !container.image.tag.semver {
        let mut seen = std::collections::HashSet::new();
        return Ok(filtered
            .filter(|tag| *tag != current)
            .filter(|tag| seen.insert(tag.as_str()))
            .cloned()
            .collect());
    }

    let Some(current_version) = parse_semver(&transform_tag(transform, current)) else {
        return Ok(Vec::new());
    };
    let mut candidates: Vec<(Version, &String)> = filtered
        .filter_map(|tag| parse_semver(&transform_tag(transform, tag)).map(|v| (v, tag)))
        .filter(|(version, _)| compare_precedence(version, &current_version) == Ordering::Greater)
        .collect();
    candidates.sort_by(|(a, _), (b, _)| compare_precedence(b, a));
    candidates.dedup_by(|(a, _), (b, _)| compare_precedence(a, b) == Ordering::Equal);
    Ok(candidates.into_iter().map(|(_, tag)| tag.clone()).collect())
}
