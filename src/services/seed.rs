//! Seed fixtures
//!
//! Loads a YAML fixture set and inserts it through the regular services so
//! the same validation applies. Running a seed twice is harmless: rows whose
//! natural key (slug, name, IATA code) already exists are skipped.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::models::{
    CreateAirportInput, CreateCategoryInput, CreateFlightInput, CreatePostInput,
    CreateProjectInput, CreateSkillInput, CreateTestimonialInput, CreateTripInput,
};
use crate::services::{
    generate_slug, CategoryService, CategoryServiceError, FlightService, FlightServiceError,
    PortfolioError, PortfolioService, PostService, PostServiceError,
};

const DEFAULT_SEED: &str = include_str!("../../seeds/default.yml");

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed data: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Unknown {kind} '{key}' referenced by {by}")]
    UnknownReference {
        kind: &'static str,
        key: String,
        by: String,
    },

    #[error(transparent)]
    Category(#[from] CategoryServiceError),

    #[error(transparent)]
    Post(#[from] PostServiceError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error(transparent)]
    Flight(#[from] FlightServiceError),
}

/// A post fixture. Categories are referenced by slug.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedPost {
    #[serde(flatten)]
    pub post: CreatePostInput,
    #[serde(default)]
    pub category: Option<String>,
}

/// A flight fixture. Trips are referenced by slug.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedFlight {
    #[serde(flatten)]
    pub flight: CreateFlightInput,
    #[serde(default)]
    pub trip: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub categories: Vec<CreateCategoryInput>,
    pub posts: Vec<SeedPost>,
    pub projects: Vec<CreateProjectInput>,
    pub skills: Vec<CreateSkillInput>,
    pub testimonials: Vec<CreateTestimonialInput>,
    pub airports: Vec<CreateAirportInput>,
    pub trips: Vec<CreateTripInput>,
    pub flights: Vec<SeedFlight>,
}

impl SeedData {
    pub fn from_yaml(source: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// The fixture set compiled into the binary
    pub fn builtin() -> Result<Self, SeedError> {
        Self::from_yaml(DEFAULT_SEED)
    }

    /// Read `path`, or the built-in set when no path is given
    pub async fn load(path: Option<&Path>) -> Result<Self, SeedError> {
        match path {
            Some(path) => {
                let source = tokio::fs::read_to_string(path).await?;
                Self::from_yaml(&source)
            }
            None => Self::builtin(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SeedCount {
    pub inserted: usize,
    pub skipped: usize,
}

impl SeedCount {
    fn record(&mut self, inserted: bool) {
        if inserted {
            self.inserted += 1;
        } else {
            self.skipped += 1;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub categories: SeedCount,
    pub posts: SeedCount,
    pub projects: SeedCount,
    pub skills: SeedCount,
    pub testimonials: SeedCount,
    pub airports: SeedCount,
    pub trips: SeedCount,
    pub flights: SeedCount,
}

impl SeedReport {
    pub fn inserted(&self) -> usize {
        self.sections().iter().map(|(_, c)| c.inserted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.sections().iter().map(|(_, c)| c.skipped).sum()
    }

    pub fn sections(&self) -> [(&'static str, SeedCount); 8] {
        [
            ("categories", self.categories),
            ("posts", self.posts),
            ("projects", self.projects),
            ("skills", self.skills),
            ("testimonials", self.testimonials),
            ("airports", self.airports),
            ("trips", self.trips),
            ("flights", self.flights),
        ]
    }
}

pub struct SeedService {
    posts: Arc<PostService>,
    categories: Arc<CategoryService>,
    portfolio: Arc<PortfolioService>,
    flights: Arc<FlightService>,
}

impl SeedService {
    pub fn new(
        posts: Arc<PostService>,
        categories: Arc<CategoryService>,
        portfolio: Arc<PortfolioService>,
        flights: Arc<FlightService>,
    ) -> Self {
        Self {
            posts,
            categories,
            portfolio,
            flights,
        }
    }

    /// Insert `data` in dependency order. Validation errors abort the run.
    pub async fn apply(&self, data: SeedData) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::default();

        for input in data.categories {
            let inserted = match self.categories.create(input).await {
                Ok(_) => true,
                Err(CategoryServiceError::DuplicateName(_)) => false,
                Err(e) => return Err(e.into()),
            };
            report.categories.record(inserted);
        }

        for SeedPost { mut post, category } in data.posts {
            if let Some(slug) = category {
                let found = match self.categories.get_by_slug(&slug).await {
                    Ok(category) => category,
                    Err(CategoryServiceError::NotFound(_)) => {
                        return Err(SeedError::UnknownReference {
                            kind: "category",
                            key: slug,
                            by: post.title,
                        })
                    }
                    Err(e) => return Err(e.into()),
                };
                post.category_id = Some(found.id);
            }
            pin_slug(&mut post.slug, &post.title);
            let inserted = match self.posts.create(post).await {
                Ok(_) => true,
                Err(PostServiceError::DuplicateSlug(_)) => false,
                Err(e) => return Err(e.into()),
            };
            report.posts.record(inserted);
        }

        for mut project in data.projects {
            pin_slug(&mut project.slug, &project.title);
            let inserted = match self.portfolio.create_project(project).await {
                Ok(_) => true,
                Err(PortfolioError::Duplicate(_)) => false,
                Err(e) => return Err(e.into()),
            };
            report.projects.record(inserted);
        }

        for skill in data.skills {
            let inserted = match self.portfolio.create_skill(skill).await {
                Ok(_) => true,
                Err(PortfolioError::Duplicate(_)) => false,
                Err(e) => return Err(e.into()),
            };
            report.skills.record(inserted);
        }

        let mut testimonials: HashSet<(String, String)> = self
            .portfolio
            .list_testimonials(false)
            .await?
            .into_iter()
            .map(|t| (t.author_name, t.content))
            .collect();
        for testimonial in data.testimonials {
            let key = (
                testimonial.author_name.trim().to_string(),
                testimonial.content.trim().to_string(),
            );
            let inserted = if testimonials.contains(&key) {
                false
            } else {
                self.portfolio.create_testimonial(testimonial).await?;
                testimonials.insert(key);
                true
            };
            report.testimonials.record(inserted);
        }

        for airport in data.airports {
            let inserted = match self.flights.create_airport(airport).await {
                Ok(_) => true,
                Err(FlightServiceError::Duplicate(_)) => false,
                Err(e) => return Err(e.into()),
            };
            report.airports.record(inserted);
        }

        for mut trip in data.trips {
            pin_slug(&mut trip.slug, &trip.name);
            let inserted = match self.flights.create_trip(trip).await {
                Ok(_) => true,
                Err(FlightServiceError::Duplicate(_)) => false,
                Err(e) => return Err(e.into()),
            };
            report.trips.record(inserted);
        }

        let trips: HashMap<String, i64> = self
            .flights
            .list_trips()
            .await?
            .into_iter()
            .map(|t| (t.slug, t.id))
            .collect();
        let mut flights: HashSet<(String, i64)> = self
            .flights
            .list_flights()
            .await?
            .into_iter()
            .map(|f| flight_key(&f.flight.flight_number, f.flight.departure_time.timestamp()))
            .collect();
        for SeedFlight { mut flight, trip } in data.flights {
            if let Some(slug) = trip {
                let id = trips.get(&slug).copied().ok_or_else(|| SeedError::UnknownReference {
                    kind: "trip",
                    key: slug.clone(),
                    by: flight.flight_number.clone(),
                })?;
                flight.trip_id = Some(id);
            }
            let key = flight_key(&flight.flight_number, flight.departure_time.timestamp());
            let inserted = if flights.contains(&key) {
                false
            } else {
                self.flights.create_flight(flight).await?;
                flights.insert(key);
                true
            };
            report.flights.record(inserted);
        }

        tracing::info!(
            inserted = report.inserted(),
            skipped = report.skipped(),
            "Seed applied"
        );
        Ok(report)
    }
}

/// Stored flight numbers are trimmed and upper-cased on create
fn flight_key(number: &str, departure: i64) -> (String, i64) {
    (number.trim().to_ascii_uppercase(), departure)
}

/// Fix a generated slug up front so a second run hits the duplicate check
/// instead of creating `slug-2`.
fn pin_slug(slug: &mut Option<String>, source: &str) {
    if slug.as_deref().map_or(true, |s| s.trim().is_empty()) {
        *slug = Some(generate_slug(source));
    }
}
