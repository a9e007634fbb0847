//!
//! Pushes the files of a local folder to a SharePoint document library (or the personal
//! OneDrive as a fallback) through Microsoft Graph, then tags each local file with the
//! id the service assigned to it.
//!
//! The access token comes from a refresh token kept in a local file. The identity
//! platform rotates that token on every exchange, so it is rewritten after each run.
//! The first refresh token is obtained once with [`bootstrap::get_initial_token`].
//!

pub mod bootstrap;
pub mod credentials;
pub mod destination;
pub mod error;
pub mod http;
pub mod settings;
pub mod token;
pub mod types;
pub mod upload;

#[cfg(test)]
mod testing;

pub use credentials::{ClientDescriptor, CredentialStore, Credentials};
pub use destination::{Destination, DestinationResolver, SiteLocator, UploadTarget};
pub use error::{Error, Result};
pub use http::{HttpClient, HttpError, HttpResponse, Httper, RetryPolicy};
pub use settings::Settings;
pub use token::TokenService;
pub use upload::{RunSummary, Uploader};

// Constants
pub const GENERATE_MS_OAUTH2_CREDENTIALS_INSTRUCTIONS: &str = r#"
    Obtains the first refresh token for drivedrop through the Microsoft identity platform (PKCE).
    Before running it, you'll need to register your own application. See
    https://docs.microsoft.com/azure/active-directory/develop/quickstart-register-app
    * Register a `Web` application with:
        - A `Redirect URI` of `http://localhost:<REDIRECT_PORT>/redirect`
            - <REDIRECT_PORT> defaults to `8080`
        - The supported account type matching the tenant that owns the SharePoint site
    * Copy the `Application (client) ID` into `client_id` of `client_secret.json`.
    * In `Certificates & secrets` add a new client secret and copy its value into `client_secret`.
    * Fill `authorization_endpoint` and `token_endpoint` with the tenant's v2.0 endpoints.
    * In `API permissions` add the delegated Microsoft Graph permissions
      `Files.ReadWrite.All` and `Sites.ReadWrite.All`.
"#;
pub const API_BASE_URL: &str = "https://graph.microsoft.com/v1.0/";

/// Scopes requested on consent and on every refresh. `offline_access` is what makes the
/// identity platform hand out refresh tokens.
pub const GRAPH_SCOPES: [&str; 3] = [
    "https://graph.microsoft.com/Files.ReadWrite.All",
    "https://graph.microsoft.com/Sites.ReadWrite.All",
    "offline_access",
];
