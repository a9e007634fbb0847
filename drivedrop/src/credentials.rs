//! Local credential files: the OAuth client descriptor and the rotating refresh token.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const CLIENT_SECRET_FILE: &str = "client_secret.json";
pub const REFRESH_TOKEN_FILE: &str = "refresh_token.txt";

/// OAuth2 application registration used for every token request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientDescriptor {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

// Every field optional so a missing key is reported by name instead of a serde message.
#[derive(Deserialize, Default)]
struct RawClientDescriptor {
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl RawClientDescriptor {
    fn validate(self) -> std::result::Result<ClientDescriptor, String> {
        let fields = [
            ("authorization_endpoint", self.authorization_endpoint),
            ("token_endpoint", self.token_endpoint),
            ("client_id", self.client_id),
            ("client_secret", self.client_secret),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing or empty keys: {}", missing.join(", ")));
        }
        let [auth, token, id, secret] = fields.map(|(_, value)| value.unwrap_or_default().trim().to_string());
        Ok(ClientDescriptor {
            authorization_endpoint: auth,
            token_endpoint: token,
            client_id: id,
            client_secret: secret,
        })
    }
}

/// Shows the first four characters of a secret.
pub fn redact(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    format!("{}…", shown)
}

/// Where the client descriptor and refresh token live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStore {
    client_path: PathBuf,
    refresh_token_path: PathBuf,
}

impl CredentialStore {
    pub fn new(client_path: impl Into<PathBuf>, refresh_token_path: impl Into<PathBuf>) -> Self {
        Self {
            client_path: client_path.into(),
            refresh_token_path: refresh_token_path.into(),
        }
    }

    /// Store using the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(CLIENT_SECRET_FILE), dir.join(REFRESH_TOKEN_FILE))
    }

    pub fn client_path(&self) -> &Path {
        &self.client_path
    }

    pub fn refresh_token_path(&self) -> &Path {
        &self.refresh_token_path
    }

    /// Reads and validates the client descriptor.
    pub fn load_client(&self) -> Result<ClientDescriptor> {
        let path = self.client_path.display();
        let contents = match fs::read_to_string(&self.client_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                error!("Client secret file not found: {}", path);
                return Err(Error::Config(format!("client secret file not found: {}", path)));
            }
            Err(err) => {
                error!("Unable to read {} - {}", path, err);
                return Err(Error::Config(format!("unable to read {} - {}", path, err)));
            }
        };
        let raw: RawClientDescriptor = serde_json::from_str(&contents).map_err(|err| {
            error!("Failed to parse JSON in {} - {}", path, err);
            Error::Config(format!("failed to parse JSON in {} - {}", path, err))
        })?;
        raw.validate().map_err(|message| {
            error!("Validation error in {} - {}", path, message);
            Error::Config(format!("{} in {}", message, path))
        })
    }

    /// Reads the trimmed refresh token.
    pub fn load_refresh_token(&self) -> Result<String> {
        let path = self.refresh_token_path.display();
        let token = match fs::read_to_string(&self.refresh_token_path) {
            Ok(contents) => contents.trim().to_string(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                error!("Refresh token file not found: {} (run `dropr login` first)", path);
                return Err(Error::Config(format!("refresh token file not found: {}", path)));
            }
            Err(err) => {
                error!("Unable to read {} - {}", path, err);
                return Err(Error::Config(format!("unable to read {} - {}", path, err)));
            }
        };
        if token.is_empty() {
            error!("Refresh token in {} is empty", path);
            return Err(Error::Config(format!("refresh token in {} is empty", path)));
        }
        Ok(token)
    }

    /// Overwrites the refresh token file. Last writer wins.
    pub fn save_refresh_token(&self, token: &str) -> Result<()> {
        let path = self.refresh_token_path.display();
        fs::write(&self.refresh_token_path, format!("{}\n", token.trim())).map_err(|err| {
            error!("Failed to write refresh token to {} - {}", path, err);
            Error::io(format!("writing refresh token to {}", path), err)
        })?;
        debug!("Refresh token written to {}", path);
        Ok(())
    }
}

/// Credential context built once at startup and passed to every operation that talks
/// to the identity provider.
#[derive(Debug)]
pub struct Credentials {
    store: CredentialStore,
    client: ClientDescriptor,
    verbose: bool,
}

/// Redacted form of the stored refresh token. A missing token is not an error here,
/// `login` runs before one exists.
fn stored_token_hint(store: &CredentialStore) -> String {
    match fs::read_to_string(store.refresh_token_path()) {
        Ok(token) if !token.trim().is_empty() => redact(token.trim()),
        _ => String::from("(none stored yet)"),
    }
}

impl Credentials {
    /// Loads the client descriptor from `store`. With `verbose`, the endpoints and
    /// redacted secrets are logged.
    pub fn load(store: CredentialStore, verbose: bool) -> Result<Self> {
        let client = store.load_client()?;
        if verbose {
            info!("=== authorization endpoint === {}", client.authorization_endpoint);
            info!("=== token endpoint === {}", client.token_endpoint);
            info!("=== client id === {}", client.client_id);
            info!("=== client secret === {}", redact(&client.client_secret));
            info!("=== refresh token === {}", stored_token_hint(&store));
        }
        Ok(Self { store, client, verbose })
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn client(&self) -> &ClientDescriptor {
        &self.client
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn refresh_token(&self) -> Result<String> {
        self.store.load_refresh_token()
    }

    /// Persists the refresh token issued by the latest exchange.
    pub fn rotate_refresh_token(&self, token: &str) -> Result<()> {
        self.store.save_refresh_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID_CLIENT: &str = r#"{
        "authorization_endpoint": "https://login.example.com/authorize",
        "token_endpoint": "https://login.example.com/token",
        "client_id": "client-123",
        "client_secret": "s3cret"
    }"#;

    fn store_with_client(contents: &str) -> (TempDir, CredentialStore) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CLIENT_SECRET_FILE), contents).unwrap();
        let store = CredentialStore::in_dir(dir.path());
        (dir, store)
    }

    #[test]
    fn test_load_client_valid() {
        let (_dir, store) = store_with_client(VALID_CLIENT);
        let client = store.load_client().unwrap();
        assert_eq!(client.client_id, "client-123");
        assert_eq!(client.token_endpoint, "https://login.example.com/token");
    }

    #[test]
    fn test_load_client_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        assert!(matches!(store.load_client(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_client_malformed_and_empty() {
        for contents in ["{not json", "", "{}"] {
            let (_dir, store) = store_with_client(contents);
            assert!(
                matches!(store.load_client(), Err(Error::Config(_))),
                "expected config error for {:?}",
                contents
            );
        }
    }

    #[test]
    fn test_load_client_reports_missing_keys() {
        let (_dir, store) = store_with_client(
            r#"{"authorization_endpoint":"https://a","token_endpoint":"https://t","client_id":""}"#,
        );
        match store.load_client() {
            Err(Error::Config(message)) => {
                assert!(message.contains("client_id"));
                assert!(message.contains("client_secret"));
                assert!(!message.contains("token_endpoint"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_refresh_token_round_trip_is_trimmed() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        store.save_refresh_token("  rt-1 ").unwrap();
        assert_eq!(
            fs::read_to_string(store.refresh_token_path()).unwrap(),
            "rt-1\n"
        );
        assert_eq!(store.load_refresh_token().unwrap(), "rt-1");
    }

    #[test]
    fn test_refresh_token_missing_or_blank() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        assert!(matches!(store.load_refresh_token(), Err(Error::Config(_))));

        fs::write(store.refresh_token_path(), "  \n").unwrap();
        assert!(matches!(store.load_refresh_token(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_refresh_token_into_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(
            dir.path().join(CLIENT_SECRET_FILE),
            dir.path().join("missing").join(REFRESH_TOKEN_FILE),
        );
        assert!(matches!(store.save_refresh_token("rt"), Err(Error::Io { .. })));
    }

    #[test]
    fn test_verbose_load_redacts_refresh_token() {
        let (_dir, store) = store_with_client(VALID_CLIENT);
        assert_eq!(stored_token_hint(&store), "(none stored yet)");
        let creds = Credentials::load(store, true).unwrap();
        assert!(creds.verbose());

        creds.rotate_refresh_token("rt-very-secret").unwrap();
        assert_eq!(stored_token_hint(creds.store()), "rt-v…");
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("abcdefgh"), "abcd…");
        assert_eq!(redact("ab"), "ab…");
    }
}
