//! Services layer
//!
//! Business rules on top of the repositories: validation, slugs,
//! markdown rendering, derived values and cache invalidation. Each service
//! has its own error enum which the API layer maps onto HTTP statuses.

pub mod category;
pub mod feed;
pub mod flight;
pub mod geocode;
pub mod markdown;
pub mod portfolio;
pub mod post;
pub mod seed;
pub mod tag;

pub use category::{CategoryService, CategoryServiceError};
pub use feed::FeedService;
pub use flight::{haversine_km, FlightService, FlightServiceError};
pub use geocode::{GeocodeError, GeocodeReport, GeocodeService, Geocoder, NominatimGeocoder};
pub use markdown::MarkdownRenderer;
pub use portfolio::{PortfolioError, PortfolioService};
pub use post::{PostQuery, PostService, PostServiceError};
pub use seed::{SeedData, SeedReport, SeedService};
pub use tag::{TagService, TagServiceError};

/// How many numbered variants `slug_candidates` yields before giving up
pub const MAX_SLUG_ATTEMPTS: usize = 100;

/// Build a URL-friendly slug.
///
/// Lowercases, keeps ASCII alphanumerics and non-ASCII letters, turns
/// everything else into single hyphens and trims hyphens from both ends.
pub fn generate_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().to_lowercase().chars() {
        let keep = c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric());
        if keep {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// `base`, then `base-2`, `base-3`, ... up to [`MAX_SLUG_ATTEMPTS`] items.
pub fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((2..).map(move |n| format!("{}-{}", base, n)))
        .take(MAX_SLUG_ATTEMPTS)
}

/// Trimmed value, or `None` when blank
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("Hello, World!"), "hello-world");
        assert_eq!(generate_slug("  many   spaces_and-dashes "), "many-spaces-and-dashes");
        assert_eq!(generate_slug("Zürich 2024"), "zürich-2024");
        assert_eq!(generate_slug("Rust & WebAssembly"), "rust-webassembly");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn test_slug_candidates() {
        let candidates: Vec<String> = slug_candidates("trip").take(3).collect();
        assert_eq!(candidates, vec!["trip", "trip-2", "trip-3"]);
        assert_eq!(slug_candidates("x").count(), MAX_SLUG_ATTEMPTS);
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  a ")), Some("a"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    proptest! {
        #[test]
        fn prop_slug_is_well_formed(text in "\\PC{0,60}") {
            let slug = generate_slug(&text);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(!slug.chars().any(|c| c.is_ascii_uppercase() || c.is_whitespace()));
        }

        #[test]
        fn prop_slug_is_idempotent(text in "[A-Za-z0-9 _.-]{0,40}") {
            let once = generate_slug(&text);
            prop_assert_eq!(generate_slug(&once), once.clone());
        }
    }
}
