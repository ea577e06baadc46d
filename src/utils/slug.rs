// src/utils/slug.rs

use rand::Rng;
use slug::slugify;

/// Builds a URL slug from a title: transliterated/slugified title plus a
/// random 5-digit suffix. The suffix makes equal titles collision-free
/// without exposing row ids in URLs.
pub fn make_slug(title: &str) -> String {
    let code: u32 = rand::thread_rng().gen_range(10000..=99999);
    format!("{}-{}", slugify(title), code)
}

/// Rebuilds a slug after a title edit, preserving the original 5-digit
/// suffix. Slugs are stable identifiers used in URLs and share links, so a
/// rename must not rotate the suffix.
pub fn reslug(title: &str, current_slug: &str) -> String {
    let code = current_slug
        .rsplit('-')
        .next()
        .filter(|tail| tail.len() == 5 && tail.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_owned);

    match code {
        Some(code) => format!("{}-{}", slugify(title), code),
        None => make_slug(title),
    }
}
