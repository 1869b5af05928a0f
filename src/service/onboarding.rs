//! Onboarding service
//!
//! Travel preferences are stored in the account prefs as strings, list
//! fields JSON-encoded, next to the completion metadata the request gate
//! reads on every page load.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{self, Checks};
use super::reject_or_unauthorized;
use crate::error::AppError;
use crate::identity::{Account, IdentityService, Prefs};

const DEFAULT_BUDGET: u8 = 50;
const MAX_BUDGET: i64 = 100;

const COMPLETED: &str = "onboardingCompleted";
const SKIPPED: &str = "onboardingSkipped";
const DATE: &str = "onboardingDate";

/// Preferred travel pace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripPace {
    Relaxed,
    #[default]
    Moderate,
    Fast,
}

impl TripPace {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripPace::Relaxed => "relaxed",
            TripPace::Moderate => "moderate",
            TripPace::Fast => "fast",
        }
    }
}

impl FromStr for TripPace {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "relaxed" => Ok(TripPace::Relaxed),
            "moderate" => Ok(TripPace::Moderate),
            "fast" => Ok(TripPace::Fast),
            _ => Err(()),
        }
    }
}

/// Travel preferences collected during onboarding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingPreferences {
    pub interests: Vec<String>,
    pub travel_style: Vec<String>,
    pub dietary_preferences: Vec<String>,
    /// 0 to 100
    pub budget: u8,
    #[serde(rename = "useAI")]
    pub use_ai: bool,
    pub base_city: String,
    pub trip_pace: TripPace,
    pub accessibility_needs: Vec<String>,
}

impl Default for OnboardingPreferences {
    fn default() -> Self {
        Self {
            interests: Vec::new(),
            travel_style: Vec::new(),
            dietary_preferences: Vec::new(),
            budget: DEFAULT_BUDGET,
            use_ai: true,
            base_city: String::new(),
            trip_pace: TripPace::default(),
            accessibility_needs: Vec::new(),
        }
    }
}

impl OnboardingPreferences {
    /// Encode as account prefs entries
    pub fn to_prefs(&self) -> Prefs {
        let mut prefs = Prefs::new();
        prefs.insert("interests", encode_list(&self.interests));
        prefs.insert("travelStyle", encode_list(&self.travel_style));
        prefs.insert("dietaryPreferences", encode_list(&self.dietary_preferences));
        prefs.insert("budget", self.budget.to_string());
        prefs.insert("useAI", self.use_ai.to_string());
        prefs.insert("baseCity", self.base_city.clone());
        prefs.insert("tripPace", self.trip_pace.as_str());
        prefs.insert("accessibilityNeeds", encode_list(&self.accessibility_needs));
        prefs
    }

    /// Decode from account prefs
    ///
    /// Missing fields take their defaults. Returns `None` when prefs are
    /// empty or any present field cannot be decoded.
    pub fn from_prefs(prefs: &Prefs) -> Option<Self> {
        if prefs.is_empty() {
            return None;
        }

        let defaults = Self::default();
        let budget = match prefs.get_str("budget") {
            Some(raw) => raw.parse::<u8>().ok().filter(|b| i64::from(*b) <= MAX_BUDGET)?,
            None => defaults.budget,
        };
        let use_ai = match prefs.get_str("useAI") {
            Some(raw) => raw.parse::<bool>().ok()?,
            None => defaults.use_ai,
        };
        let trip_pace = match prefs.get_str("tripPace") {
            Some(raw) => raw.parse::<TripPace>().ok()?,
            None => defaults.trip_pace,
        };

        Some(Self {
            interests: decode_list(prefs, "interests")?,
            travel_style: decode_list(prefs, "travelStyle")?,
            dietary_preferences: decode_list(prefs, "dietaryPreferences")?,
            budget,
            use_ai,
            base_city: prefs.get_str("baseCity").unwrap_or_default().to_string(),
            trip_pace,
            accessibility_needs: decode_list(prefs, "accessibilityNeeds")?,
        })
    }
}

/// Preferences plus completion metadata, as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPreferences {
    #[serde(flatten)]
    pub preferences: OnboardingPreferences,
    pub onboarding_completed: bool,
    pub onboarding_skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_date: Option<String>,
}

impl StoredPreferences {
    pub fn from_prefs(prefs: &Prefs) -> Option<Self> {
        Some(Self {
            preferences: OnboardingPreferences::from_prefs(prefs)?,
            onboarding_completed: prefs.get_str(COMPLETED) == Some("true"),
            onboarding_skipped: prefs.get_str(SKIPPED) == Some("true"),
            onboarding_date: prefs.get_str(DATE).map(str::to_string),
        })
    }
}

/// Onboarding submission
///
/// Every value arrives as a string; list fields hold a JSON array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OnboardingForm {
    pub interests: Option<String>,
    pub travel_style: Option<String>,
    pub dietary_preferences: Option<String>,
    pub budget: Option<String>,
    #[serde(rename = "useAI")]
    pub use_ai: Option<String>,
    pub base_city: Option<String>,
    pub trip_pace: Option<String>,
    pub accessibility_needs: Option<String>,
}

impl OnboardingForm {
    /// Parse and validate into preferences
    ///
    /// # Errors
    /// `Validation` with the first failing rule's message
    pub fn parse(self) -> Result<OnboardingPreferences, AppError> {
        let interests = parse_list(self.interests)?;
        let travel_style = parse_list(self.travel_style)?;
        let dietary_preferences = parse_list(self.dietary_preferences)?;
        let accessibility_needs = parse_list(self.accessibility_needs)?;

        let budget = match validation::non_blank(self.budget) {
            Some(raw) => validation::leading_integer(&raw)
                .ok_or_else(|| AppError::Validation("Budget must be a number".to_string()))?,
            None => i64::from(DEFAULT_BUDGET),
        };
        let base_city = self.base_city.unwrap_or_default().trim().to_string();
        let trip_pace = match validation::non_blank(self.trip_pace) {
            Some(raw) => raw.parse::<TripPace>().ok(),
            None => Some(TripPace::default()),
        };

        Checks::new()
            .check(!interests.is_empty(), "Select at least one interest")
            .check(
                (0..=MAX_BUDGET).contains(&budget),
                "Budget must be between 0 and 100",
            )
            .check(!base_city.is_empty(), "Home city is required")
            .check(
                trip_pace.is_some(),
                "Trip pace must be relaxed, moderate, or fast",
            )
            .finish()?;

        Ok(OnboardingPreferences {
            interests,
            travel_style,
            dietary_preferences,
            budget: u8::try_from(budget).unwrap_or(DEFAULT_BUDGET),
            use_ai: self.use_ai.as_deref() == Some("true"),
            base_city,
            trip_pace: trip_pace.unwrap_or_default(),
            accessibility_needs,
        })
    }
}

/// Onboarding service
pub struct OnboardingService {
    identity: Arc<dyn IdentityService>,
}

impl OnboardingService {
    /// Create new onboarding service
    pub fn new(identity: Arc<dyn IdentityService>) -> Self {
        Self { identity }
    }

    /// Completion predicate the gate applies to a resolved account
    pub fn is_complete(account: &Account) -> bool {
        account.prefs.get_str(COMPLETED) == Some("true")
    }

    /// Whether the session's account finished onboarding
    ///
    /// Any failure, including a missing session, is `false`.
    pub async fn check_onboarding_status(&self, session: Option<&str>) -> bool {
        let Some(session) = session else {
            return false;
        };

        match self.identity.get_account(session).await {
            Ok(account) => Self::is_complete(&account),
            Err(error) => {
                tracing::debug!(%error, "Failed to check onboarding status");
                false
            }
        }
    }

    /// Validate the submission and mark onboarding complete
    ///
    /// Existing prefs not touched by onboarding are preserved.
    pub async fn complete_onboarding(
        &self,
        session: &str,
        form: OnboardingForm,
    ) -> Result<(), AppError> {
        let preferences = form.parse()?;

        let mut prefs = self
            .identity
            .get_prefs(session)
            .await
            .map_err(reject_or_unauthorized(
                "complete_onboarding",
                "Failed to save preferences",
            ))?;
        prefs.merge(preferences.to_prefs());
        prefs.insert(COMPLETED, "true");
        prefs.insert(SKIPPED, "false");
        prefs.insert(DATE, now());

        let account = self
            .identity
            .update_prefs(session, &prefs)
            .await
            .map_err(reject_or_unauthorized(
                "complete_onboarding",
                "Failed to save preferences",
            ))?;

        tracing::info!(user_id = %account.id, "Onboarding completed");
        Ok(())
    }

    /// Mark onboarding complete with default preferences
    ///
    /// Overwrites onboarding values regardless of earlier submissions.
    pub async fn skip_onboarding(&self, session: &str) -> Result<(), AppError> {
        let mut prefs = self
            .identity
            .get_prefs(session)
            .await
            .map_err(reject_or_unauthorized(
                "skip_onboarding",
                "Failed to skip onboarding",
            ))?;
        prefs.merge(OnboardingPreferences::default().to_prefs());
        prefs.insert(COMPLETED, "true");
        prefs.insert(SKIPPED, "true");
        prefs.insert(DATE, now());

        let account = self
            .identity
            .update_prefs(session, &prefs)
            .await
            .map_err(reject_or_unauthorized(
                "skip_onboarding",
                "Failed to skip onboarding",
            ))?;

        tracing::info!(user_id = %account.id, "Onboarding skipped");
        Ok(())
    }

    /// Decoded preferences for the session's account
    pub async fn get_user_preferences(&self, session: Option<&str>) -> Option<StoredPreferences> {
        let session = session?;

        match self.identity.get_prefs(session).await {
            Ok(prefs) => StoredPreferences::from_prefs(&prefs),
            Err(error) => {
                tracing::debug!(%error, "Failed to load preferences");
                None
            }
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode_list(values: &[String]) -> String {
    serde_json::Value::from(values.to_vec()).to_string()
}

fn decode_list(prefs: &Prefs, key: &str) -> Option<Vec<String>> {
    match prefs.get_str(key) {
        Some(raw) => serde_json::from_str(raw).ok(),
        None => Some(Vec::new()),
    }
}

fn parse_list(raw: Option<String>) -> Result<Vec<String>, AppError> {
    match validation::non_blank(raw) {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|_| AppError::Validation("Invalid preferences data".to_string())),
        None => Ok(Vec::new()),
    }
}
