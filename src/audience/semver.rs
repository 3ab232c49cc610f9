//! Version comparison for `semver_*` matchers.
//!
//! Targets may be partial (`"2"`, `"2.1"`), in which case only the supplied components are
//! compared. A pre-release suffix starts at `-`, build metadata at `+`, whichever comes first.
use std::cmp::Ordering;

const PRE_RELEASE_SEPARATOR: char = '-';
const BUILD_SEPARATOR: char = '+';

fn is_pre_release(version: &str) -> bool {
    match (version.find(PRE_RELEASE_SEPARATOR), version.find(BUILD_SEPARATOR)) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(minus), Some(plus)) => minus < plus,
    }
}

fn is_build(version: &str) -> bool {
    match (version.find(BUILD_SEPARATOR), version.find(PRE_RELEASE_SEPARATOR)) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(plus), Some(minus)) => plus < minus,
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Split version into numeric components followed by an optional suffix.
///
/// Returns `None` for malformed versions.
fn split(version: &str) -> Option<Vec<&str>> {
    if version.is_empty() || version.chars().any(char::is_whitespace) {
        return None;
    }

    let separator = if is_pre_release(version) {
        Some(PRE_RELEASE_SEPARATOR)
    } else if is_build(version) {
        Some(BUILD_SEPARATOR)
    } else {
        None
    };

    let (prefix, suffix) = match separator {
        Some(separator) => {
            let (prefix, suffix) = version.split_once(separator)?;
            if suffix.is_empty() {
                return None;
            }
            (prefix, Some(suffix))
        }
        None => (version, None),
    };

    if prefix.matches('.').count() > 2 {
        return None;
    }

    let mut parts = Vec::with_capacity(4);
    for part in prefix.split('.') {
        if !is_number(part) {
            return None;
        }
        parts.push(part);
    }
    parts.extend(suffix);
    Some(parts)
}

fn compare_numbers(a: &str, b: &str) -> Option<Ordering> {
    let a: u64 = a.parse().ok()?;
    let b: u64 = b.parse().ok()?;
    Some(a.cmp(&b))
}

/// Compare dot-separated pre-release identifiers. Numeric identifiers compare numerically and
/// rank below alphanumeric ones. A longer list wins when all shared identifiers are equal.
fn compare_pre_release(version: &str, target: &str) -> Ordering {
    let mut version_ids = version.split('.');
    let mut target_ids = target.split('.');
    loop {
        let ordering = match (version_ids.next(), target_ids.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(a), Some(b)) => match (is_number(a), is_number(b)) {
                (true, true) => compare_numbers(a, b)
                    .unwrap_or_else(|| a.len().cmp(&b.len()).then_with(|| a.cmp(b))),
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.cmp(b),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

/// Compare user `version` against `target`.
///
/// Returns `None` if either version is malformed.
pub(crate) fn compare(version: &str, target: &str) -> Option<Ordering> {
    let target_parts = split(target)?;
    let version_parts = split(version)?;

    for (idx, target_part) in target_parts.iter().enumerate() {
        let Some(version_part) = version_parts.get(idx) else {
            return Some(if is_pre_release(target) || is_build(target) {
                Ordering::Greater
            } else {
                Ordering::Less
            });
        };

        let ordering = if !is_number(version_part) {
            compare_pre_release(version_part, target_part)
        } else if is_number(target_part) {
            compare_numbers(version_part, target_part)?
        } else {
            return Some(Ordering::Less);
        };

        if ordering != Ordering::Equal {
            return Some(ordering);
        }
    }

    if is_pre_release(version) && !is_pre_release(target) {
        return Some(Ordering::Less);
    }

    Some(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::compare;

    #[test]
    fn compares_full_versions() {
        assert_eq!(compare("2.0.1", "2.0.0"), Some(Ordering::Greater));
        assert_eq!(compare("2.0.0", "2.0.1"), Some(Ordering::Less));
        assert_eq!(compare("2.0.0", "2.0.0"), Some(Ordering::Equal));
        assert_eq!(compare("10.0.0", "9.0.0"), Some(Ordering::Greater));
    }

    #[test]
    fn partial_target_compares_supplied_components() {
        assert_eq!(compare("2.9.1", "2"), Some(Ordering::Equal));
        assert_eq!(compare("2.9.1", "2.9"), Some(Ordering::Equal));
        assert_eq!(compare("3.0.0", "2.9"), Some(Ordering::Greater));
    }

    #[test]
    fn shorter_version_is_less() {
        assert_eq!(compare("2.9", "2.9.1"), Some(Ordering::Less));
    }

    #[test]
    fn pre_release_is_less_than_release() {
        assert_eq!(compare("3.7.1-beta", "3.7.1"), Some(Ordering::Less));
        assert_eq!(compare("3.7.1", "3.7.1-beta"), Some(Ordering::Greater));
        assert_eq!(compare("3.7.1-beta", "3.7.1-beta"), Some(Ordering::Equal));
        assert_eq!(compare("3.7.1-beta.2", "3.7.1-beta.1"), Some(Ordering::Greater));
    }

    #[test]
    fn pre_release_identifiers_follow_precedence() {
        assert_eq!(compare("1.0.0-beta.10", "1.0.0-beta.9"), Some(Ordering::Greater));
        assert_eq!(compare("1.0.0-beta.9", "1.0.0-beta.10"), Some(Ordering::Less));
        assert_eq!(compare("1.0.0-1", "1.0.0-alpha"), Some(Ordering::Less));
        assert_eq!(compare("1.0.0-alpha.beta", "1.0.0-alpha.1"), Some(Ordering::Greater));
        assert_eq!(compare("1.0.0-alpha", "1.0.0-alpha.1"), Some(Ordering::Less));
        assert_eq!(compare("1.0.0-rc.1", "1.0.0-beta.11"), Some(Ordering::Greater));
    }

    #[test]
    fn build_metadata_is_split_off() {
        assert_eq!(compare("3.7.1+build", "3.7.1"), Some(Ordering::Equal));
        assert_eq!(compare("3.7.1-beta+build", "3.7.1-beta"), Some(Ordering::Greater));
    }

    #[test]
    fn rejects_malformed_versions() {
        for invalid in [
            "", "-", ".", "..", "+", "+test", " ", "2 .3. 0", "2.", ".2.2", "3.7.2.2", "3.x",
            "3.7.1-", "-1.2.3", "1..2",
        ] {
            assert_eq!(compare(invalid, "1.0.0"), None, "{invalid:?}");
            assert_eq!(compare("1.0.0", invalid), None, "{invalid:?}");
        }
    }
}
