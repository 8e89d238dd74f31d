//! Flight log API endpoints: flights, airports and trips

use axum::{extract::State, http::StatusCode};

use crate::api::blog::Deleted;
use crate::api::extract::{Json, Path};
use crate::api::middleware::AppState;
use crate::api::responses::{created, ok, ApiError, ApiResponse};
use crate::models::{
    Airport, CreateAirportInput, CreateFlightInput, CreateTripInput, FlightDetail, FlightStats,
    Trip, TripDetail,
};

/// GET /api/flights
pub async fn list_flights(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<FlightDetail>>, ApiError> {
    Ok(ok(state.flight_service.list_flights().await?))
}

/// POST /api/flights
pub async fn create_flight(
    State(state): State<AppState>,
    Json(input): Json<CreateFlightInput>,
) -> Result<(StatusCode, ApiResponse<FlightDetail>), ApiError> {
    Ok(created(state.flight_service.create_flight(input).await?))
}

/// GET /api/flights/stats
pub async fn stats(State(state): State<AppState>) -> Result<ApiResponse<FlightStats>, ApiError> {
    Ok(ok(state.flight_service.stats().await?))
}

/// DELETE /api/flights/{id}
pub async fn delete_flight(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<Deleted>, ApiError> {
    state.flight_service.delete_flight(id).await?;
    Ok(ok(Deleted { id }))
}

/// GET /api/airports
pub async fn list_airports(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<Airport>>, ApiError> {
    Ok(ok(state.flight_service.list_airports().await?))
}

/// POST /api/airports
pub async fn create_airport(
    State(state): State<AppState>,
    Json(input): Json<CreateAirportInput>,
) -> Result<(StatusCode, ApiResponse<Airport>), ApiError> {
    Ok(created(state.flight_service.create_airport(input).await?))
}

/// GET /api/trips
pub async fn list_trips(State(state): State<AppState>) -> Result<ApiResponse<Vec<Trip>>, ApiError> {
    Ok(ok(state.flight_service.list_trips().await?))
}

/// POST /api/trips
pub async fn create_trip(
    State(state): State<AppState>,
    Json(input): Json<CreateTripInput>,
) -> Result<(StatusCode, ApiResponse<Trip>), ApiError> {
    Ok(created(state.flight_service.create_trip(input).await?))
}

/// GET /api/trips/{slug}
pub async fn get_trip(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ApiResponse<TripDetail>, ApiError> {
    Ok(ok(state.flight_service.get_trip(&slug).await?))
}
