//! Typed wrappers for the portal's profile, case and message endpoints.
//!
//! Reads degrade instead of failing where the portal can still render
//! something useful: a missing or temporarily unavailable resource becomes
//! `None` or an empty list. Session expiry always propagates.

use portal_types::{ApiPath, HttpMethod, RequestDescriptor, encode_path_segment};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiClient, ApiError};

const PROFILE_TEMPLATE: &str = "/api/users/{id}/profile";
const CASES_PATH: &str = "/api/v1/cases";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
}

/// Partial profile update; unset fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub sent_at: Option<String>,
}

/// List endpoints answer either with a bare array or `{ "items": [...] }`.
/// An empty or non-JSON success arrives as `{}` and reads as no items.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(default = "Vec::new")]
        items: Vec<T>,
    },
}

impl<T> ListEnvelope<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) | ListEnvelope::Wrapped { items } => items,
        }
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    Ok(serde_json::from_value(value)?)
}

fn profile_template() -> Result<ApiPath, ApiError> {
    Ok(ApiPath::new(PROFILE_TEMPLATE)?)
}

/// Fetch a profile by GUID or username. `Ok(None)` if the user does not exist
/// or the profile service is down.
pub async fn get_profile(
    client: &ApiClient,
    identifier: &str,
) -> Result<Option<UserProfile>, ApiError> {
    match client
        .request_for_user(&profile_template()?, identifier, HttpMethod::Get, None)
        .await
    {
        Ok(value) => decode(value).map(Some),
        Err(e) if e.is_not_found() || e.is_service_unavailable() => {
            tracing::info!(error = %e, "Profile unavailable");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub async fn update_profile(
    client: &ApiClient,
    identifier: &str,
    update: &ProfileUpdate,
) -> Result<UserProfile, ApiError> {
    let body = serde_json::to_value(update)?;
    let value = client
        .request_for_user(&profile_template()?, identifier, HttpMethod::Put, Some(body))
        .await?;
    decode(value)
}

/// Cases visible to the current user. Empty when the backend is unreachable.
pub async fn list_cases(client: &ApiClient) -> Result<Vec<CaseSummary>, ApiError> {
    let descriptor = RequestDescriptor::get(ApiPath::new(CASES_PATH)?);
    match client.request_json::<ListEnvelope<CaseSummary>>(&descriptor).await {
        Ok(list) => Ok(list.into_items()),
        Err(e) if e.is_service_unavailable() || e.is_network_error() => {
            tracing::warn!(error = %e, "Case list unavailable");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Messages on a case. Empty when the case is gone or the backend is down.
pub async fn list_messages(client: &ApiClient, case_id: &str) -> Result<Vec<Message>, ApiError> {
    let path = ApiPath::new(format!(
        "{CASES_PATH}/{}/messages",
        encode_path_segment(case_id.trim())
    ))?;
    match client
        .request_json::<ListEnvelope<Message>>(&RequestDescriptor::get(path))
        .await
    {
        Ok(list) => Ok(list.into_items()),
        Err(e) if e.is_not_found() || e.is_service_unavailable() => {
            tracing::info!(error = %e, case_id, "Messages unavailable");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
