//! Saved itinerary endpoints

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::get,
};
use serde::Serialize;

use crate::AppState;
use crate::auth::SessionSecret;
use crate::error::AppError;
use crate::service::{Itinerary, ItineraryPreview, SavedItinerary};

/// Create itineraries router
///
/// Routes:
/// - GET / - Previews of the caller's saved trips
/// - POST / - Save a generated itinerary
/// - GET /:trip_id - One saved itinerary
/// - DELETE /:trip_id - Remove a saved itinerary
pub fn itineraries_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(save))
        .route("/:trip_id", get(fetch).delete(remove))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Saved {
    success: bool,
    trip_id: String,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct Listing {
    success: bool,
    itineraries: Vec<ItineraryPreview>,
}

#[derive(Debug, Serialize)]
struct Found {
    success: bool,
    itinerary: SavedItinerary,
}

#[derive(Debug, Serialize)]
struct Deleted {
    success: bool,
    message: &'static str,
}

/// POST /api/itineraries
async fn save(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Json(itinerary): Json<Itinerary>,
) -> Result<Json<Saved>, AppError> {
    let trip_id = state.itineraries.save_itinerary(&session, itinerary).await?;
    Ok(Json(Saved {
        success: true,
        trip_id,
        message: "Itinerary saved successfully",
    }))
}

/// GET /api/itineraries
async fn list(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
) -> Result<Json<Listing>, AppError> {
    let itineraries = state.itineraries.get_user_itineraries(&session).await?;
    Ok(Json(Listing {
        success: true,
        itineraries,
    }))
}

/// GET /api/itineraries/:trip_id
async fn fetch(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Path(trip_id): Path<String>,
) -> Result<Json<Found>, AppError> {
    let itinerary = state.itineraries.get_itinerary(&session, &trip_id).await?;
    Ok(Json(Found {
        success: true,
        itinerary,
    }))
}

/// DELETE /api/itineraries/:trip_id
async fn remove(
    State(state): State<AppState>,
    SessionSecret(session): SessionSecret,
    Path(trip_id): Path<String>,
) -> Result<Json<Deleted>, AppError> {
    state.itineraries.delete_itinerary(&session, &trip_id).await?;
    Ok(Json(Deleted {
        success: true,
        message: "Itinerary deleted successfully",
    }))
}
