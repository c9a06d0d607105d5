//! Rule matcher: pipe-separated alternatives, substring match

/// Check whether a rule's matcher applies to the event subject.
///
/// An absent or empty pattern matches everything. Otherwise the pattern is
/// split on `|` and the subject matches if it contains any alternative.
/// Case-sensitive.
pub fn matches(pattern: Option<&str>, subject: &str) -> bool {
    let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
        return true;
    };
    pattern
        .split('|')
        .filter(|alt| !alt.is_empty())
        .any(|alt| subject.contains(alt))
}
