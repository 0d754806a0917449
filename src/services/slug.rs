//! URL slugs

/// Turn a title into a URL slug.
///
/// Lowercases ASCII letters and digits, maps whitespace, `-` and `_` to a
/// single hyphen and drops everything else. Leading and trailing hyphens are
/// trimmed.
pub fn generate_slug(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !result.is_empty() {
                result.push('-');
            }
            pending_hyphen = false;
            result.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_hyphen = true;
        }
    }

    result
}

/// Slug for `text`, or `fallback` when nothing usable remains
pub fn slug_or(text: &str, fallback: &str) -> String {
    let slug = generate_slug(text);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// The `n`th candidate when `base` is taken: `base`, `base-2`, `base-3`, ...
pub fn numbered_slug(base: &str, n: u32) -> String {
    if n <= 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Rust & Axum: a guide!  "), "rust-axum-a-guide");
        assert_eq!(generate_slug("snake_case--and  spaces"), "snake-case-and-spaces");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_slug_or_and_numbering() {
        assert_eq!(slug_or("???", "post"), "post");
        assert_eq!(numbered_slug("hello", 1), "hello");
        assert_eq!(numbered_slug("hello", 3), "hello-3");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_slug_is_url_safe(text in ".{0,60}") {
            let slug = generate_slug(&text);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }
    }
}
