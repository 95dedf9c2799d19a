/// Major reported for runtimes whose version could not be inferred.
/// Never satisfies a compatibility check.
pub const UNKNOWN_MAJOR: u32 = 0;

/// Infer the Java major version from an installation folder name.
///
/// Patterns, in priority order: `jdk-N…`, `jre-N…`, `N.x…` (with legacy
/// `1.N.x` mapping to `N`), then the vendor spellings `jdk1.8.0_392`,
/// `java-17-openjdk-amd64` and `temurin-21.jdk`.
pub fn major_from_dir_name(name: &str) -> u32 {
    let lower = name.trim().to_ascii_lowercase();

    for prefix in ["jdk-", "jre-"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return leading_major(rest).unwrap_or(UNKNOWN_MAJOR);
        }
    }

    if lower.starts_with(|c: char| c.is_ascii_digit()) {
        return leading_major(&lower).unwrap_or(UNKNOWN_MAJOR);
    }

    for prefix in ["jdk", "jre"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            if rest.starts_with(|c: char| c.is_ascii_digit()) {
                return leading_major(rest).unwrap_or(UNKNOWN_MAJOR);
            }
        }
    }

    lower
        .split('-')
        .skip(1)
        .find(|segment| segment.starts_with(|c: char| c.is_ascii_digit()))
        .and_then(leading_major)
        .unwrap_or(UNKNOWN_MAJOR)
}

/// Parse a `java -version` style string (`17.0.8`, `1.8.0_392`) into its major.
pub fn parse_major_version(version: &str) -> u32 {
    leading_major(version.trim()).unwrap_or(UNKNOWN_MAJOR)
}

fn leading_major(raw: &str) -> Option<u32> {
    let mut numbers = raw
        .split(|c: char| !c.is_ascii_digit())
        .take_while(|segment| !segment.is_empty())
        .map(|segment| segment.parse::<u32>().ok());

    let first = numbers.next()??;
    if first == 1 {
        // `1.8.0_392` → 8; a bare `1` is not a real JDK version
        return match raw.as_bytes().get(1) {
            Some(b'.') => numbers.next().flatten().filter(|n| *n > 1),
            _ => None,
        };
    }
    if first == 0 {
        return None;
    }
    Some(first)
}

/// Java major the given base game version expects.
pub fn required_java_for_minecraft_version(minecraft_version: &str) -> u32 {
    let lower = minecraft_version.to_ascii_lowercase();
    if let Some(week_pos) = lower.find('w') {
        let year_hint = &lower[..week_pos];
        let year_suffix = year_hint
            .len()
            .checked_sub(2)
            .and_then(|start| year_hint.get(start..));
        if let Some(year_suffix) = year_suffix {
            if let Ok(snapshot_year) = year_suffix.parse::<u32>() {
                if snapshot_year >= 24 {
                    return 21;
                }
                return 17;
            }
        }
    }

    let mut parts = minecraft_version.split('.');
    let major = parts
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(1);
    let minor = parts
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(20);
    let patch = parts
        .next()
        .and_then(|p| p.split('-').next())
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(0);

    if major > 1 || minor >= 21 || (minor == 20 && patch >= 5) {
        21
    } else if minor >= 17 {
        17
    } else {
        8
    }
}
