//! Database repositories
//!
//! One trait plus one sqlx implementation per entity.

pub mod airport;
pub mod category;
pub mod flight;
pub mod post;
pub mod project;
pub mod skill;
pub mod tag;
pub mod testimonial;
pub mod trip;

pub use airport::{AirportRepository, SqlxAirportRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use flight::{FlightRepository, SqlxFlightRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use project::{ProjectRepository, SqlxProjectRepository};
pub use skill::{SkillRepository, SqlxSkillRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use testimonial::{SqlxTestimonialRepository, TestimonialRepository};
pub use trip::{SqlxTripRepository, TripRepository};
