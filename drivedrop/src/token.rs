use log::{debug, error, info, warn};
use url::form_urlencoded;

use crate::credentials::{redact, Credentials};
use crate::error::{Error, Result};
use crate::http::Httper;
use crate::types::TokenResponse;
use crate::GRAPH_SCOPES;

/// Space separated scope parameter shared by the refresh and bootstrap requests.
pub fn scope_param() -> String {
    GRAPH_SCOPES.join(" ")
}

/// Exchanges the stored refresh token for an access token.
///
/// Every call is a full round trip to the token endpoint. The provider rotates the
/// refresh token on each exchange, so the new one is written back before the access
/// token is handed out.
pub struct TokenService<'a> {
    http: &'a dyn Httper,
    credentials: &'a Credentials,
}

impl<'a> TokenService<'a> {
    pub fn new(http: &'a dyn Httper, credentials: &'a Credentials) -> Self {
        Self { http, credentials }
    }

    pub fn get_access_token(&self) -> Result<String> {
        let client = self.credentials.client();
        let refresh_token = self.credentials.refresh_token()?;

        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &client.client_id)
            .append_pair("client_secret", &client.client_secret)
            .append_pair("refresh_token", &refresh_token)
            .append_pair("grant_type", "refresh_token")
            .append_pair("scope", &scope_param())
            .finish();
        let headers = vec![(
            String::from("Content-Type"),
            String::from("application/x-www-form-urlencoded"),
        )];

        debug!("Requesting access token from {}", client.token_endpoint);
        let resp = self
            .http
            .post(client.token_endpoint.clone(), form, headers)
            .map_err(|err| {
                error!("Token request to {} failed - {}", client.token_endpoint, err);
                Error::Auth(format!("token request failed - {}", err))
            })?;
        debug!("Token endpoint answered {}", resp.status_code);

        let parsed: Option<TokenResponse> = serde_json::from_slice(&resp.body).ok();
        if !resp.is_success() {
            let detail = parsed
                .as_ref()
                .and_then(TokenResponse::error_text)
                .unwrap_or_else(|| resp.text());
            error!("Token endpoint returned {} - {}", resp.status_code, detail);
            return Err(Error::Auth(format!("{} - {}", resp.status_code, detail)));
        }

        let parsed = parsed.ok_or_else(|| {
            error!("Token endpoint returned a body that is not JSON");
            Error::Auth(String::from("token response is not valid JSON"))
        })?;
        if parsed.error.is_some() {
            let detail = parsed.error_text().unwrap_or_else(|| String::from("unknown error"));
            error!("Authentication failed: {}", detail);
            return Err(Error::Auth(detail));
        }

        let access_token = parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Auth(String::from("token response has no access_token")))?;

        match parsed.refresh_token.filter(|token| !token.trim().is_empty()) {
            Some(rotated) => {
                self.credentials.rotate_refresh_token(&rotated)?;
                if self.credentials.verbose() {
                    info!("=== refresh token === {}", redact(&rotated));
                }
            }
            None => warn!("Token response carried no refresh_token, keeping the stored one"),
        }

        info!("Access token retrieved");
        if self.credentials.verbose() {
            info!("=== access token === {}", redact(&access_token));
        }
        Ok(access_token)
    }
}
