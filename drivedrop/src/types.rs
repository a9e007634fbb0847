use serde::{ Deserialize, Serialize };

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
/// The subset of a Microsoft Graph DriveItem that uploads and folder checks rely on.
pub struct DriveItem {
    /// The unique identifier of the item within the drive.
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
/// A SharePoint site as returned by the site lookup endpoint.
pub struct Site {
    /// Composite site identifier (`hostname,siteCollectionId,webId`).
    pub id: String,
    /// The full title for the site.
    pub display_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
/// Provides information necessary to address a DriveItem via the API.
pub struct ItemReference {
    /// Identifier of the item in the drive.
    pub id: String,
    /// Path that can be used to navigate to the item.
    pub path: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
/// Body of a folder creation request.
pub struct CreateFolderRequest {
    pub name: String,
    pub folder: EmptyFacet,
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: String,
    #[serde(rename = "parentReference", skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ItemReference>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
/// An empty facet, serialised as `{}`.
pub struct EmptyFacet {}

#[derive(Deserialize, Debug, Default)]
/// Token endpoint reply. Either the token fields or the error fields are set.
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// The most descriptive error text the provider gave, if any.
    pub fn error_text(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.error.clone())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Deserialize, Debug)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Deserialize, Debug)]
struct GraphErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Extracts `code: message` from a Graph error body, falling back to the raw text.
/// See https://learn.microsoft.com/en-us/onedrive/developer/rest-api/concepts/errors
pub fn graph_error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<GraphErrorBody>(body) {
        Ok(GraphErrorBody { error }) => match (error.code, error.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code,
            (None, Some(message)) => message,
            (None, None) => String::from("unknown error"),
        },
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_folder_request_without_parent() {
        let request = CreateFolderRequest {
            name: String::from("PowerBI"),
            folder: EmptyFacet {},
            conflict_behavior: String::from("rename"),
            parent_reference: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "PowerBI",
                "folder": {},
                "@microsoft.graph.conflictBehavior": "rename"
            })
        );
    }

    #[test]
    fn test_graph_error_message_variants() {
        let body = br#"{"error":{"code":"itemNotFound","message":"The resource could not be found."}}"#;
        assert_eq!(graph_error_message(body), "itemNotFound: The resource could not be found.");
        assert_eq!(graph_error_message(b"Bad Gateway "), "Bad Gateway");
    }

    #[test]
    fn test_drive_item_ignores_unknown_fields() {
        let item: DriveItem = serde_json::from_str(
            r#"{"id":"01ABC","name":"report.xlsx","size":10,"file":{"mimeType":"x"}}"#,
        )
        .unwrap();
        assert_eq!(item.id, "01ABC");
    }

    #[test]
    fn test_token_response_error_text_prefers_description() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"AADSTS70000: expired"}"#,
        )
        .unwrap();
        assert_eq!(resp.error_text().as_deref(), Some("AADSTS70000: expired"));

        let resp: TokenResponse = serde_json::from_str(r#"{"error":"invalid_grant"}"#).unwrap();
        assert_eq!(resp.error_text().as_deref(), Some("invalid_grant"));
    }
}
