//! Data models
//!
//! Entities stored in the database plus the input and view types the
//! services and API exchange.

mod category;
mod flight;
mod portfolio;
mod post;

pub use category::{Category, CategoryWithCount, CreateCategoryInput, Tag, TagWithCount};
pub use flight::{
    AirlineCount, Airport, CabinClass, CreateAirportInput, CreateFlightInput, CreateTripInput,
    Flight, FlightDetail, FlightStats, RouteCount, Trip, TripDetail,
};
pub use portfolio::{
    CreateProjectInput, CreateSkillInput, CreateTestimonialInput, PortfolioOverview,
    PortfolioSearchResult, Project, ProjectFilter, ProjectStatus, Skill, SkillGroup, Testimonial,
    UpdateProjectInput,
};
pub use post::{
    CreatePostInput, ListParams, PagedResult, Post, PostDetail, PostFilter, PostStatus,
    UpdatePostInput,
};

/// Pairs with `LIKE ? ESCAPE '!'`; a backslash would need different
/// quoting on SQLite and MySQL
pub const LIKE_ESCAPE: char = '!';

/// Lowercased `LIKE` pattern matching `keyword` anywhere, with the
/// keyword's own `%` and `_` taken literally
pub fn contains_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.to_lowercase().chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("Rust"), "%rust%");
        assert_eq!(contains_pattern("100%"), "%100!%%");
        assert_eq!(contains_pattern("snake_case!"), "%snake!_case!!%");
    }
}
