/// Lowercased, dash-separated form of a title. Letters from any script are
/// kept so Arabic titles produce Arabic slugs.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    // Keep URLs a reasonable length; cut on a char boundary.
    if slug.chars().count() > 80 {
        slug = slug.chars().take(80).collect();
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// Canonical slug for a listing: the title slug suffixed with its id.
pub fn canonical(title: &str, id: i64) -> String {
    let base = slugify(title);
    if base.is_empty() {
        id.to_string()
    } else {
        format!("{base}-{id}")
    }
}

/// Id encoded in a key that is either a bare id or ends with `-<id>`.
pub fn trailing_id(key: &str) -> Option<i64> {
    let tail = key.rsplit('-').next()?;
    tail.parse().ok().filter(|id: &i64| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_latin_and_arabic() {
        assert_eq!(slugify("Senior  Rust Developer!"), "senior-rust-developer");
        assert_eq!(slugify("مطلوب محاسب - الرياض"), "مطلوب-محاسب-الرياض");
        assert_eq!(slugify("--"), "");
    }

    #[test]
    fn canonical_appends_id() {
        assert_eq!(canonical("Driver needed", 42), "driver-needed-42");
        assert_eq!(canonical("!!!", 7), "7");
    }

    #[test]
    fn trailing_id_parsing() {
        assert_eq!(trailing_id("driver-needed-42"), Some(42));
        assert_eq!(trailing_id("42"), Some(42));
        assert_eq!(trailing_id("driver-needed"), None);
        assert_eq!(trailing_id("-0"), None);
    }
}
