//!
//! One-time interactive authorization code flow that produces the first refresh token.
//!
//! Based on the oauth2-rs example for Microsoft Graph:
//! https://github.com/ramosbugs/oauth2-rs/blob/main/examples/msgraph.rs
//!

use oauth2::basic::BasicClient;
use oauth2::{
    AuthType,
    AuthUrl,
    AuthorizationCode,
    ClientId,
    ClientSecret,
    CsrfToken,
    PkceCodeChallenge,
    RedirectUrl,
    Scope,
    TokenResponse,
    TokenUrl,
};

use std::io::{ BufRead, BufReader, Write };
use std::net::TcpListener;
use url::Url;

use log::{debug, info, warn};

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::GRAPH_SCOPES;

pub const DEFAULT_REDIRECT_PORT: u16 = 8080;
pub const DEFAULT_REDIRECT_ENDPOINT: &str = "/redirect";

/// How the authorization code gets back from the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    /// The user pastes the code, or the whole redirect URL, into the terminal.
    Paste,
    /// A one-shot listener on `127.0.0.1:{port}` catches the redirect.
    Listen,
}

/// Options for [`get_initial_token`].
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub source: CodeSource,
    pub redirect_port: u16,
    /// If true, automatically opens the generated authorization URL.
    pub auto_open_auth_url: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            source: CodeSource::Paste,
            redirect_port: DEFAULT_REDIRECT_PORT,
            auto_open_auth_url: true,
        }
    }
}

/// Builds the redirect URI registered for the application.
pub fn redirect_url(port: u16) -> String {
    format!("http://localhost:{}{}", port, DEFAULT_REDIRECT_ENDPOINT)
}

/// Runs the consent flow and stores the resulting refresh token.
pub fn get_initial_token(credentials: &Credentials, options: &BootstrapOptions) -> Result<()> {
    let descriptor = credentials.client();
    let auth_url = AuthUrl::new(descriptor.authorization_endpoint.clone())
        .map_err(|err| Error::Config(format!("invalid authorization endpoint - {}", err)))?;
    let token_url = TokenUrl::new(descriptor.token_endpoint.clone())
        .map_err(|err| Error::Config(format!("invalid token endpoint - {}", err)))?;
    let redirect = redirect_url(options.redirect_port);
    let redirect_uri = RedirectUrl::new(redirect.clone())
        .map_err(|err| Error::Config(format!("invalid redirect URL - {}", err)))?;
    debug!("redirect_url={:?}", redirect);

    let client = BasicClient::new(
        ClientId::new(descriptor.client_id.clone()),
        Some(ClientSecret::new(descriptor.client_secret.clone())),
        auth_url,
        Some(token_url)
    )
        // Microsoft identity platform expects client_id and client_secret in the body
        // rather than Basic authentication.
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(redirect_uri);

    let (pkce_code_challenge, pkce_code_verifier) = PkceCodeChallenge::new_random_sha256();
    let mut auth_request = client.authorize_url(CsrfToken::new_random);
    for scope in GRAPH_SCOPES.iter() {
        auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
    }
    let (authorize_url, csrf_state) = auth_request
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    if options.auto_open_auth_url {
        println!("Opening the following URL:\n{}\n", authorize_url);
        if let Err(err) = open::that(authorize_url.as_str()) {
            warn!("Unable to open a browser ({}), open the URL manually", err);
        }
    } else {
        println!("Open this URL in your browser:\n{}\n", authorize_url);
    }

    let code = match options.source {
        CodeSource::Paste => read_pasted_code(csrf_state.secret())?,
        CodeSource::Listen => listen_for_code(options.redirect_port, csrf_state.secret())?,
    };

    let token = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_code_verifier)
        .request(oauth2::reqwest::http_client)
        .map_err(|err| Error::Auth(format!("authorization code exchange failed - {:?}", err)))?;

    let refresh_token = token
        .refresh_token()
        .ok_or_else(|| Error::Auth(String::from("no refresh token returned (is offline_access granted?)")))?;
    credentials.rotate_refresh_token(refresh_token.secret())?;
    info!(
        "Initial refresh token stored in {}",
        credentials.store().refresh_token_path().display()
    );
    Ok(())
}

fn read_pasted_code(expected_state: &str) -> Result<String> {
    print!("Paste the authorization code (or the full redirect URL): ");
    std::io::stdout()
        .flush()
        .map_err(|err| Error::io("writing prompt", err))?;
    let mut input = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|err| Error::io("reading authorization code", err))?;
    extract_code(&input, expected_state)
}

/// Accepts either a bare authorization code or the redirect URL that carries it.
/// When a URL carries a `state`, it must match the one sent with the request.
pub fn extract_code(input: &str, expected_state: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::Auth(String::from("no authorization code entered")));
    }
    match Url::parse(input) {
        Ok(url) => code_from_url(&url, expected_state),
        Err(_) => Ok(input.to_string()),
    }
}

fn code_from_url(url: &Url, expected_state: &str) -> Result<String> {
    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };
    if let Some(error) = param("error") {
        let description = param("error_description").unwrap_or_default();
        return Err(Error::Auth(format!("consent failed: {} {}", error, description).trim().to_string()));
    }
    if let Some(state) = param("state") {
        if state != expected_state {
            return Err(Error::Auth(String::from("state mismatch in redirect URL")));
        }
    }
    param("code").ok_or_else(|| Error::Auth(String::from("redirect URL has no code parameter")))
}

/// Pulls the code out of an HTTP request line such as `GET /redirect?code=..&state=.. HTTP/1.1`.
pub fn code_from_request_line(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::Auth(format!("malformed redirect request: {:?}", request_line)))?;
    let url = Url::parse(&format!("http://localhost{}", target))
        .map_err(|err| Error::Auth(format!("malformed redirect target {} - {}", target, err)))?;
    if url.query_pairs().all(|(key, _)| key != "state") {
        return Err(Error::Auth(String::from("redirect request has no state parameter")));
    }
    code_from_url(&url, expected_state)
}

fn listen_for_code(port: u16, expected_state: &str) -> Result<String> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .map_err(|err| Error::io(format!("binding redirect listener on port {}", port), err))?;
    info!("Waiting for the redirect on http://localhost:{}{}", port, DEFAULT_REDIRECT_ENDPOINT);

    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Redirect connection failed - {}", err);
                continue;
            }
        };
        let mut request_line = String::new();
        if let Err(err) = BufReader::new(&stream).read_line(&mut request_line) {
            warn!("Unable to read redirect request - {}", err);
            continue;
        }
        // Browsers also ask for /favicon.ico.
        if !request_line.contains(DEFAULT_REDIRECT_ENDPOINT) {
            debug!("Ignoring request {:?}", request_line.trim());
            continue;
        }

        let outcome = code_from_request_line(&request_line, expected_state);
        let message = match outcome {
            Ok(_) => "Go back to your terminal :)",
            Err(_) => "Authorization failed, check your terminal.",
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}",
            message.len(),
            message
        );
        if let Err(err) = stream.write_all(response.as_bytes()) {
            warn!("Unable to answer the redirect request - {}", err);
        }
        return outcome;
    }
    Err(Error::Auth(String::from("redirect listener stopped before a code arrived")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bare_code() {
        assert_eq!(extract_code("  M.C507_abc \n", "state-1").unwrap(), "M.C507_abc");
    }

    #[test]
    fn test_extract_code_from_redirect_url() {
        let url = "http://localhost:8080/redirect?code=abc%2F123&state=state-1";
        assert_eq!(extract_code(url, "state-1").unwrap(), "abc/123");
    }

    #[test]
    fn test_extract_code_rejects_wrong_state() {
        let url = "http://localhost:8080/redirect?code=abc&state=other";
        assert!(matches!(extract_code(url, "state-1"), Err(Error::Auth(_))));
    }

    #[test]
    fn test_extract_code_reports_consent_error() {
        let url = "http://localhost:8080/redirect?error=access_denied&error_description=user+declined";
        match extract_code(url, "state-1") {
            Err(Error::Auth(message)) => assert!(message.contains("access_denied")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_extract_code_empty_input() {
        assert!(matches!(extract_code("\n", "s"), Err(Error::Auth(_))));
    }

    #[test]
    fn test_code_from_request_line() {
        let line = "GET /redirect?code=xyz&state=s1 HTTP/1.1\r\n";
        assert_eq!(code_from_request_line(line, "s1").unwrap(), "xyz");
        assert!(code_from_request_line("GET /redirect?code=xyz HTTP/1.1", "s1").is_err());
        assert!(code_from_request_line("", "s1").is_err());
    }

    #[test]
    fn test_redirect_url() {
        assert_eq!(redirect_url(8080), "http://localhost:8080/redirect");
    }
}
