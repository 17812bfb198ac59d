//! GUID resolution for routes that only accept UUID identifiers.

use portal_types::{ApiPath, HttpMethod, RequestDescriptor, encode_path_segment};
use serde_json::Value;
use uuid::Uuid;

use crate::{ApiClient, ApiError};

const ID_PLACEHOLDER: &str = "id";

impl ApiClient {
    /// Map `identifier` to a GUID.
    ///
    /// GUIDs are returned as-is without a network call. Anything else is looked
    /// up with `GET {guid_lookup_path}/{identifier}`, which must answer with an
    /// object carrying an `id` or `guid` field.
    pub async fn resolve_guid(&self, identifier: &str) -> Result<Uuid, ApiError> {
        let identifier = identifier.trim();
        if let Ok(guid) = Uuid::parse_str(identifier) {
            return Ok(guid);
        }
        if identifier.is_empty() {
            return Err(ApiError::GuidLookup {
                identifier: identifier.to_string(),
                reason: "identifier is empty".to_string(),
            });
        }

        let path = ApiPath::new(format!(
            "{}/{}",
            self.config().guid_lookup_path.as_str().trim_end_matches('/'),
            encode_path_segment(identifier)
        ))?;

        tracing::debug!(identifier, "Resolving GUID");
        let value = self.request(&RequestDescriptor::get(path)).await?;

        extract_guid(&value).ok_or_else(|| ApiError::GuidLookup {
            identifier: identifier.to_string(),
            reason: "lookup response has no GUID `id` field".to_string(),
        })
    }

    /// Send a request to `template` after substituting the GUID of
    /// `identifier` for its `{id}` placeholder.
    pub async fn request_for_user(
        &self,
        template: &ApiPath,
        identifier: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        if !template.has_placeholder(ID_PLACEHOLDER) {
            return Err(ApiError::GuidLookup {
                identifier: identifier.to_string(),
                reason: format!("path template {template} has no {{id}} placeholder"),
            });
        }

        let guid = self.resolve_guid(identifier).await?;
        let mut descriptor =
            RequestDescriptor::new(method, template.fill(ID_PLACEHOLDER, &guid.to_string())?);
        descriptor.body = body;
        self.request(&descriptor).await
    }
}

fn extract_guid(value: &Value) -> Option<Uuid> {
    ["id", "guid"]
        .iter()
        .filter_map(|key| value.get(key).and_then(Value::as_str))
        .find_map(|raw| Uuid::parse_str(raw.trim()).ok())
}
