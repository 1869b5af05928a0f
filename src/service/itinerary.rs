//! Saved itineraries
//!
//! A generated itinerary is split across six collections keyed by
//! `trip_id`: the trip itself, its budget breakdown, days, time blocks,
//! recommendations and the journey path. Reads put it back together in the
//! shape the planner produced it.
//!
//! Documents are written with the server API key; ownership is recorded in
//! the trip document and checked here.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::reject;
use crate::config::ItineraryStoreConfig;
use crate::error::{self, AppError};
use crate::identity::{Account, Document, IdentityError, IdentityService, Query};

/// Upper bound on documents fetched per collection and trip
const LIST_LIMIT: u32 = 500;

const TRIP_ID: &str = "trip_id";

/// Itinerary as produced by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(default)]
    pub name: String,
    pub metadata: TripMetadata,
    #[serde(rename = "itinerary", default)]
    pub days: Vec<ItineraryDay>,
    #[serde(default)]
    pub recommendations: Recommendations,
    #[serde(default)]
    pub essential_info: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey_path: Option<JourneyPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripMetadata {
    pub trip_type: String,
    pub duration_days: u32,
    pub total_budget: TotalBudget,
    #[serde(default)]
    pub preferences: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalBudget {
    pub currency: String,
    /// Decimal amount as text, e.g. `"1450.50"`
    pub total: String,
    #[serde(default)]
    pub breakdown: BudgetBreakdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetBreakdown {
    pub accommodation: f64,
    pub transportation: f64,
    pub activities: f64,
    pub food: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub day_number: u32,
    pub date: String,
    #[serde(default)]
    pub weather: Value,
    #[serde(default)]
    pub time_blocks: Vec<TimeBlock>,
}

/// Slot in a day; holds an activity, a travel leg, or neither
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    /// `fixed` or `flexible`
    #[serde(rename = "type")]
    pub kind: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Value>,
}

impl TimeBlock {
    /// Stored block type and the content saved for it
    fn content(&self) -> (&'static str, Option<&Value>) {
        match (&self.activity, &self.travel) {
            (Some(activity), _) => ("activity", Some(activity)),
            (None, Some(travel)) => ("travel", Some(travel)),
            (None, None) => ("other", None),
        }
    }

    fn priority(&self) -> i64 {
        self.activity
            .as_ref()
            .and_then(|activity| activity.get("priority"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendations {
    pub accommodations: Vec<Value>,
    pub dining: Vec<Value>,
    pub transportation: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JourneyPath {
    pub overview: Vec<Value>,
    pub distance_km: f64,
    pub elevation_profile: Vec<Value>,
}

/// A saved itinerary read back from storage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedItinerary {
    /// Trip id
    pub id: String,
    #[serde(flatten)]
    pub itinerary: Itinerary,
    /// When the trip was saved
    pub current_date_time: String,
    /// Owning account id
    pub current_user: String,
}

/// Summary row for the saved-trips list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryPreview {
    pub trip_id: String,
    pub name: String,
    pub trip_type: String,
    pub created_at: String,
    pub duration_days: u32,
    pub total_budget: f64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    trip_id: String,
    user_id: String,
    #[serde(default)]
    name: String,
    trip_type: String,
    duration_days: u32,
    currency: String,
    total_budget: f64,
    #[serde(default)]
    preferences: Option<String>,
    #[serde(default)]
    essential_info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BudgetRow {
    #[serde(flatten)]
    breakdown: BudgetBreakdown,
    #[serde(default)]
    currency: String,
}

#[derive(Debug, Deserialize)]
struct DayRow {
    day_id: String,
    day_number: u32,
    date: String,
    #[serde(default)]
    weather: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeBlockRow {
    day_id: String,
    #[serde(rename = "type")]
    kind: String,
    block_type: String,
    start_time: String,
    end_time: String,
    duration_minutes: u32,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    warnings: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendationRow {
    rec_type: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct JourneyPathRow {
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    distance_km: f64,
    #[serde(default)]
    elevation_profile: Option<String>,
}

/// Itinerary persistence service
pub struct ItineraryService {
    identity: Arc<dyn IdentityService>,
    store: ItineraryStoreConfig,
}

impl ItineraryService {
    /// Create new itinerary service
    pub fn new(identity: Arc<dyn IdentityService>, store: ItineraryStoreConfig) -> Self {
        Self { identity, store }
    }

    /// Save a generated itinerary for the session's account
    ///
    /// A failed save removes the documents it had already written.
    ///
    /// # Returns
    /// The new trip id
    pub async fn save_itinerary(
        &self,
        session: &str,
        itinerary: Itinerary,
    ) -> error::Result<String> {
        const FAILED: &str = "Failed to save itinerary";

        let total_budget = itinerary
            .metadata
            .total_budget
            .total
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|total| total.is_finite())
            .ok_or_else(|| AppError::Validation("Total budget must be a number".to_string()))?;

        let owner = self.owner(session, "save_itinerary", FAILED).await?;
        let trip_id = ulid::Ulid::new().to_string();

        let mut written = Vec::new();
        if let Err(error) = self
            .write_itinerary(&trip_id, &owner.id, total_budget, &itinerary, &mut written)
            .await
        {
            self.remove_documents(&written).await;
            return Err(store_error("save_itinerary", FAILED)(error));
        }

        tracing::info!(
            trip_id = %trip_id,
            user_id = %owner.id,
            documents = written.len(),
            "Itinerary saved"
        );
        Ok(trip_id)
    }

    /// Read back one of the session account's itineraries
    ///
    /// Trips of other accounts are reported as not found.
    pub async fn get_itinerary(
        &self,
        session: &str,
        trip_id: &str,
    ) -> error::Result<SavedItinerary> {
        const FAILED: &str = "Failed to retrieve itinerary";

        let owner = self.owner(session, "get_itinerary", FAILED).await?;
        let Some((document, trip)) = self
            .find_trip(trip_id)
            .await
            .map_err(store_error("get_itinerary", FAILED))?
        else {
            return Err(AppError::NotFound);
        };
        if trip.user_id != owner.id {
            return Err(AppError::NotFound);
        }

        self.assemble(document, trip)
            .await
            .map_err(store_error("get_itinerary", FAILED))
    }

    /// Previews of the session account's itineraries, newest first
    pub async fn get_user_itineraries(
        &self,
        session: &str,
    ) -> error::Result<Vec<ItineraryPreview>> {
        const FAILED: &str = "Failed to get user itineraries";

        let owner = self.owner(session, "get_user_itineraries", FAILED).await?;
        let documents = self
            .identity
            .list_documents(
                &self.store.database_id,
                &self.store.itineraries_collection,
                &[
                    Query::Equal("user_id", owner.id.clone()),
                    Query::OrderDesc("$createdAt"),
                    Query::Limit(LIST_LIMIT),
                ],
            )
            .await
            .map_err(store_error("get_user_itineraries", FAILED))?;

        documents
            .iter()
            .map(|document| -> Result<ItineraryPreview, IdentityError> {
                let trip: TripRow = document.decode()?;
                Ok(ItineraryPreview {
                    trip_id: trip.trip_id,
                    name: trip.name,
                    trip_type: trip.trip_type,
                    created_at: document.created_at.clone(),
                    duration_days: trip.duration_days,
                    total_budget: trip.total_budget,
                    currency: trip.currency,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error("get_user_itineraries", FAILED))
    }

    /// Delete an itinerary and every document belonging to it
    ///
    /// The trip document goes last so an interrupted delete can be retried.
    pub async fn delete_itinerary(&self, session: &str, trip_id: &str) -> error::Result<()> {
        const FAILED: &str = "Failed to delete itinerary";

        let owner = self.owner(session, "delete_itinerary", FAILED).await?;
        let Some((document, trip)) = self
            .find_trip(trip_id)
            .await
            .map_err(store_error("delete_itinerary", FAILED))?
        else {
            return Err(AppError::NotFound);
        };
        if trip.user_id != owner.id {
            tracing::warn!(trip_id, user_id = %owner.id, "Refusing to delete another account's itinerary");
            return Err(AppError::Forbidden(
                "You don't have permission to delete this itinerary".to_string(),
            ));
        }

        let store = &self.store;
        for collection in [
            &store.budgets_collection,
            &store.days_collection,
            &store.time_blocks_collection,
            &store.recommendations_collection,
            &store.journey_paths_collection,
        ] {
            let related = self
                .list_for_trip(collection, trip_id, None)
                .await
                .map_err(store_error("delete_itinerary", FAILED))?;
            for doc in related {
                self.identity
                    .delete_document(&store.database_id, collection, &doc.id)
                    .await
                    .map_err(store_error("delete_itinerary", FAILED))?;
            }
        }

        self.identity
            .delete_document(&store.database_id, &store.itineraries_collection, &document.id)
            .await
            .map_err(store_error("delete_itinerary", FAILED))?;

        tracing::info!(trip_id, user_id = %owner.id, "Itinerary deleted");
        Ok(())
    }

    /// Account behind the session
    async fn owner(
        &self,
        session: &str,
        operation: &'static str,
        message: &'static str,
    ) -> error::Result<Account> {
        self.identity.get_account(session).await.map_err(|error| {
            if error.is_unauthenticated() {
                return AppError::Unauthorized;
            }
            store_error(operation, message)(error)
        })
    }

    async fn write_itinerary(
        &self,
        trip_id: &str,
        user_id: &str,
        total_budget: f64,
        itinerary: &Itinerary,
        written: &mut Vec<(String, String)>,
    ) -> Result<(), IdentityError> {
        let store = &self.store;
        let metadata = &itinerary.metadata;
        let budget = &metadata.total_budget;

        self.create(
            &store.itineraries_collection,
            trip_id.to_string(),
            json!({
                "trip_id": trip_id,
                "user_id": user_id,
                "name": itinerary.name,
                "trip_type": metadata.trip_type,
                "duration_days": metadata.duration_days,
                "currency": budget.currency,
                "total_budget": total_budget,
                "preferences": metadata.preferences.to_string(),
                "essential_info": itinerary.essential_info.to_string(),
                "status": "created",
            }),
            written,
        )
        .await?;

        self.create(
            &store.budgets_collection,
            new_id(),
            json!({
                "trip_id": trip_id,
                "accommodation": budget.breakdown.accommodation,
                "transportation": budget.breakdown.transportation,
                "activities": budget.breakdown.activities,
                "food": budget.breakdown.food,
                "currency": budget.currency,
            }),
            written,
        )
        .await?;

        for day in &itinerary.days {
            let day_id = new_id();
            self.create(
                &store.days_collection,
                day_id.clone(),
                json!({
                    "trip_id": trip_id,
                    "day_id": day_id,
                    "day_number": day.day_number,
                    "date": day.date,
                    "weather": day.weather.to_string(),
                }),
                written,
            )
            .await?;

            for block in &day.time_blocks {
                let (block_type, content) = block.content();
                self.create(
                    &store.time_blocks_collection,
                    new_id(),
                    json!({
                        "trip_id": trip_id,
                        "day_id": day_id,
                        "block_id": new_id(),
                        "type": block.kind,
                        "block_type": block_type,
                        "start_time": block.start_time,
                        "end_time": block.end_time,
                        "duration_minutes": block.duration_minutes,
                        "content": content.map(Value::to_string),
                        "warnings": block.warnings.as_ref().map(Value::to_string),
                        "priority": block.priority(),
                    }),
                    written,
                )
                .await?;
            }
        }

        let recommendations = &itinerary.recommendations;
        for (rec_type, items) in [
            ("accommodations", &recommendations.accommodations),
            ("dining", &recommendations.dining),
            ("transportation", &recommendations.transportation),
        ] {
            for item in items {
                self.create(
                    &store.recommendations_collection,
                    new_id(),
                    json!({
                        "trip_id": trip_id,
                        "rec_id": new_id(),
                        "rec_type": rec_type,
                        "name": recommendation_name(rec_type, item),
                        "content": item.to_string(),
                    }),
                    written,
                )
                .await?;
            }
        }

        if let Some(path) = &itinerary.journey_path {
            self.create(
                &store.journey_paths_collection,
                new_id(),
                json!({
                    "trip_id": trip_id,
                    "overview": Value::from(path.overview.clone()).to_string(),
                    "distance_km": path.distance_km,
                    "elevation_profile": Value::from(path.elevation_profile.clone()).to_string(),
                }),
                written,
            )
            .await?;
        }

        Ok(())
    }

    async fn create(
        &self,
        collection: &str,
        document_id: String,
        data: Value,
        written: &mut Vec<(String, String)>,
    ) -> Result<(), IdentityError> {
        self.identity
            .create_document(&self.store.database_id, collection, &document_id, data)
            .await?;
        written.push((collection.to_string(), document_id));
        Ok(())
    }

    /// Undo a partial save, newest document first
    async fn remove_documents(&self, written: &[(String, String)]) {
        for (collection, document_id) in written.iter().rev() {
            if let Err(error) = self
                .identity
                .delete_document(&self.store.database_id, collection, document_id)
                .await
            {
                tracing::warn!(%error, collection = %collection, document_id = %document_id, "Failed to remove partial itinerary document");
            }
        }
    }

    async fn find_trip(&self, trip_id: &str) -> Result<Option<(Document, TripRow)>, IdentityError> {
        let documents = self
            .list_for_trip(&self.store.itineraries_collection, trip_id, None)
            .await?;
        match documents.into_iter().next() {
            Some(document) => {
                let trip = document.decode()?;
                Ok(Some((document, trip)))
            }
            None => Ok(None),
        }
    }

    async fn list_for_trip(
        &self,
        collection: &str,
        trip_id: &str,
        order: Option<Query>,
    ) -> Result<Vec<Document>, IdentityError> {
        let mut queries = vec![Query::Equal(TRIP_ID, trip_id.to_string())];
        queries.extend(order);
        queries.push(Query::Limit(LIST_LIMIT));
        self.identity
            .list_documents(&self.store.database_id, collection, &queries)
            .await
    }

    async fn assemble(
        &self,
        document: Document,
        trip: TripRow,
    ) -> Result<SavedItinerary, IdentityError> {
        let store = &self.store;
        let trip_id = trip.trip_id.as_str();

        let budget = match self
            .list_for_trip(&store.budgets_collection, trip_id, None)
            .await?
            .first()
        {
            Some(document) => Some(document.decode::<BudgetRow>()?),
            None => None,
        };
        let days: Vec<DayRow> = decode_all(
            self.list_for_trip(
                &store.days_collection,
                trip_id,
                Some(Query::OrderAsc("day_number")),
            )
            .await?,
        )?;
        let blocks: Vec<TimeBlockRow> = decode_all(
            self.list_for_trip(&store.time_blocks_collection, trip_id, None)
                .await?,
        )?;
        let recommendation_rows: Vec<RecommendationRow> = decode_all(
            self.list_for_trip(&store.recommendations_collection, trip_id, None)
                .await?,
        )?;
        let journey_path = match self
            .list_for_trip(&store.journey_paths_collection, trip_id, None)
            .await?
            .first()
        {
            Some(document) => {
                let row: JourneyPathRow = document.decode()?;
                JourneyPath {
                    overview: parse_list(row.overview.as_deref())?,
                    distance_km: row.distance_km,
                    elevation_profile: parse_list(row.elevation_profile.as_deref())?,
                }
            }
            None => JourneyPath::default(),
        };

        let mut blocks_by_day: HashMap<String, Vec<TimeBlock>> = HashMap::new();
        for row in blocks {
            let content = parse_json(row.content.as_deref())?;
            let (activity, travel) = match row.block_type.as_str() {
                "activity" => (Some(content), None),
                "travel" => (None, Some(content)),
                _ => (None, None),
            };
            let warnings = match row.warnings.as_deref() {
                Some(raw) => Some(parse_json(Some(raw))?),
                None => None,
            };
            blocks_by_day.entry(row.day_id).or_default().push(TimeBlock {
                kind: row.kind,
                start_time: row.start_time,
                end_time: row.end_time,
                duration_minutes: row.duration_minutes,
                activity: activity.filter(|v| !v.is_null()),
                travel: travel.filter(|v| !v.is_null()),
                warnings: warnings.filter(|v| !v.is_null()),
            });
        }

        let days = days
            .into_iter()
            .map(|day| -> Result<ItineraryDay, IdentityError> {
                Ok(ItineraryDay {
                    time_blocks: blocks_by_day.remove(&day.day_id).unwrap_or_default(),
                    day_number: day.day_number,
                    date: day.date,
                    weather: parse_json(day.weather.as_deref())?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut recommendations = Recommendations::default();
        for row in recommendation_rows {
            let mut item = parse_json(Some(row.content.as_str()))?;
            match row.rec_type.as_str() {
                "accommodations" => {
                    zero_null_coordinates(&mut item);
                    recommendations.accommodations.push(item);
                }
                "dining" => recommendations.dining.push(item),
                "transportation" => {
                    if let Some(fields) = item.as_object_mut() {
                        let duration = fields.entry("duration").or_insert(Value::Null);
                        if duration.is_null() {
                            *duration = json!(0);
                        }
                    }
                    recommendations.transportation.push(item);
                }
                other => tracing::debug!(rec_type = other, "Skipping unknown recommendation type"),
            }
        }

        let (currency, breakdown) = match budget {
            Some(row) if !row.currency.is_empty() => (row.currency, row.breakdown),
            Some(row) => (trip.currency.clone(), row.breakdown),
            None => (trip.currency.clone(), BudgetBreakdown::default()),
        };

        Ok(SavedItinerary {
            id: trip.trip_id.clone(),
            itinerary: Itinerary {
                name: trip.name,
                metadata: TripMetadata {
                    trip_type: trip.trip_type,
                    duration_days: trip.duration_days,
                    total_budget: TotalBudget {
                        currency,
                        total: trip.total_budget.to_string(),
                        breakdown,
                    },
                    preferences: parse_json(trip.preferences.as_deref())?,
                },
                days,
                recommendations,
                essential_info: parse_json(trip.essential_info.as_deref())?,
                journey_path: Some(journey_path),
            },
            current_date_time: document.created_at,
            current_user: trip.user_id,
        })
    }
}

/// Map a storage failure to a user-facing message
///
/// An unreachable backend is a 502 rather than a rejected action.
fn store_error(
    operation: &'static str,
    message: &'static str,
) -> impl FnOnce(IdentityError) -> AppError {
    move |error| {
        if error.is_unavailable() {
            tracing::error!(operation, %error, "Itinerary storage unavailable");
            return AppError::Identity(error);
        }
        reject(operation, message)(error)
    }
}

fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

fn recommendation_name(rec_type: &str, item: &Value) -> String {
    let field = if rec_type == "transportation" {
        "operator"
    } else {
        "name"
    };
    match item.get(field).and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ if rec_type == "transportation" => "Transportation option".to_string(),
        _ => String::new(),
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(
    documents: Vec<Document>,
) -> Result<Vec<T>, IdentityError> {
    documents.iter().map(Document::decode).collect()
}

/// Stored JSON text back to a value; absent is `null`
fn parse_json(raw: Option<&str>) -> Result<Value, IdentityError> {
    match raw {
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            IdentityError::UnexpectedResponse(format!("stored itinerary field is not JSON: {e}"))
        }),
        None => Ok(Value::Null),
    }
}

fn parse_list(raw: Option<&str>) -> Result<Vec<Value>, IdentityError> {
    match parse_json(raw)? {
        Value::Array(items) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

/// `location.coordinates.lat/lng` of null become 0
fn zero_null_coordinates(item: &mut Value) {
    let Some(coordinates) = item
        .pointer_mut("/location/coordinates")
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    for axis in ["lat", "lng"] {
        let value = coordinates.entry(axis).or_insert(Value::Null);
        if value.is_null() {
            *value = json!(0);
        }
    }
}
