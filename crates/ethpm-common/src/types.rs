pub mod address;
pub mod content;
pub mod uri;

use std::sync::LazyLock;

use regex::Regex;

/// ethPM package names: lowercase, start with a letter, at most 256 chars.
pub static PACKAGE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][-a-z0-9]{0,255}$").unwrap());

/// Local aliases for installed packages and registries.
pub static ALIAS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][-_a-zA-Z0-9]{0,255}$").unwrap());

/// Exact versions or simple semver ranges (`1.0.0`, `^1.2`, `>=0.3.1-beta.1`).
pub static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[~^=]|[<>]=?)?v?\d+(?:\.\d+){0,2}(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$",
    )
    .unwrap()
});

/// Whether `name` is a valid ethPM package name.
pub fn is_valid_package_name(name: &str) -> bool {
    PACKAGE_NAME_REGEX.is_match(name)
}

/// Whether `alias` is a valid local alias.
pub fn is_valid_alias(alias: &str) -> bool {
    ALIAS_REGEX.is_match(alias)
}

/// Whether `version` is an exact version or a simple version range.
pub fn is_valid_version(version: &str) -> bool {
    VERSION_REGEX.is_match(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_must_start_with_a_letter() {
        assert!(is_valid_alias("owned"));
        assert!(is_valid_alias("Owned_v2-x"));
        assert!(!is_valid_alias("_invalid"));
        assert!(!is_valid_alias("1nvalid"));
        assert!(!is_valid_alias(""));
    }

    #[test]
    fn versions() {
        for ok in ["1.0.0", "1", "^1.2", ">=0.3.1-beta.1", "v2.0.0+build.5"] {
            assert!(is_valid_version(ok), "{ok}");
        }
        for bad in ["", "latest", "1..0", "1.0.0.0"] {
            assert!(!is_valid_version(bad), "{bad}");
        }
    }

    #[test]
    fn package_names_are_lowercase() {
        assert!(is_valid_package_name("owned"));
        assert!(is_valid_package_name("safe-math-lib"));
        assert!(!is_valid_package_name("Owned"));
        assert!(!is_valid_package_name("-owned"));
    }
}
