//! Decides where uploads go: a SharePoint site drive when the site can be found,
//! otherwise the signed-in user's personal drive.

use log::{debug, error, info, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{Error, Result};
use crate::http::{bearer, Httper};
use crate::types::{graph_error_message, CreateFolderRequest, DriveItem, EmptyFacet, ItemReference, Site};

/// Characters escaped inside a single path segment of a Graph path-based address.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Which drive receives the uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The document library of a SharePoint site.
    SharePoint { site_id: String },
    /// The signed-in user's OneDrive.
    PersonalDrive,
}

impl Destination {
    /// Drive root relative to the Graph base URL.
    pub fn drive_root(&self) -> String {
        match self {
            Destination::SharePoint { site_id } => format!("sites/{}/drive", site_id),
            Destination::PersonalDrive => String::from("me/drive"),
        }
    }

    pub fn is_sharepoint(&self) -> bool {
        matches!(self, Destination::SharePoint { .. })
    }
}

/// Fully resolved upload location, fixed for the rest of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub destination: Destination,
    /// Normalised folder path below the drive root, empty for the root itself.
    pub folder: String,
}

impl UploadTarget {
    /// Address of the simple upload endpoint for `file_name` inside the target folder.
    pub fn content_url(&self, base_url: &str, file_name: &str) -> String {
        let item_path = if self.folder.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.folder, file_name)
        };
        format!(
            "{}{}/root:/{}:/content",
            base_url,
            self.destination.drive_root(),
            encode_path(&item_path)
        )
    }
}

/// SharePoint site address, e.g. `contoso.sharepoint.com` and `/sites/Finance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLocator {
    pub hostname: String,
    pub site_path: String,
}

/// Strips leading and trailing separators and collapses empty segments.
pub fn normalize_folder_path(path: &str) -> String {
    path.split(|c: char| c == '/' || c == '\\')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encodes each segment of a `/` separated path.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Looks up sites and folders with an already obtained access token.
pub struct DestinationResolver<'a> {
    http: &'a dyn Httper,
    base_url: &'a str,
    access_token: &'a str,
}

impl<'a> DestinationResolver<'a> {
    pub fn new(http: &'a dyn Httper, base_url: &'a str, access_token: &'a str) -> Self {
        Self {
            http,
            base_url,
            access_token,
        }
    }

    /// Returns the site id, or `None` when the site cannot be resolved for any reason.
    pub fn resolve_site(&self, hostname: &str, site_path: &str) -> Option<String> {
        let site_path = normalize_folder_path(site_path);
        let url = if site_path.is_empty() {
            format!("{}sites/{}", self.base_url, hostname)
        } else {
            format!("{}sites/{}:/{}", self.base_url, hostname, encode_path(&site_path))
        };
        debug!("Looking up SharePoint site at {}", url);
        let resp = match self.http.get(url, vec![bearer(self.access_token)]) {
            Ok(resp) => resp,
            Err(err) => {
                warn!("Site lookup for {}:/{} failed - {}", hostname, site_path, err);
                return None;
            }
        };
        if !resp.is_success() {
            warn!(
                "Site lookup for {}:/{} returned {} - {}",
                hostname,
                site_path,
                resp.status_code,
                graph_error_message(&resp.body)
            );
            return None;
        }
        match serde_json::from_slice::<Site>(&resp.body) {
            Ok(site) => {
                info!("Resolved SharePoint site {} ({})", site.display_name.as_deref().unwrap_or(hostname), site.id);
                Some(site.id)
            }
            Err(err) => {
                warn!("Site lookup for {}:/{} returned no id - {}", hostname, site_path, err);
                None
            }
        }
    }

    /// Makes sure `folder_path` exists under the destination's drive root.
    ///
    /// `Ok(true)` when the folder exists or was created, `Ok(false)` when the service
    /// could not be reached, `Err` when it answered with an unexpected status.
    pub fn ensure_folder(&self, destination: &Destination, folder_path: &str) -> Result<bool> {
        let folder = normalize_folder_path(folder_path);
        if folder.is_empty() {
            return Ok(true);
        }
        let drive_root = destination.drive_root();
        let url = format!("{}{}/root:/{}", self.base_url, drive_root, encode_path(&folder));

        let resp = match self.http.get(url, vec![bearer(self.access_token)]) {
            Ok(resp) => resp,
            Err(err) => {
                error!("Unable to check folder {} - {}", folder, err);
                return Ok(false);
            }
        };
        match resp.status_code {
            200 => {
                debug!("Folder {} already exists", folder);
                Ok(true)
            }
            404 => self.create_folder(&drive_root, &folder),
            status => {
                let message = graph_error_message(&resp.body);
                error!("Checking folder {} returned {} - {}", folder, status, message);
                Err(Error::Destination(format!("checking folder {} returned {} - {}", folder, status, message)))
            }
        }
    }

    fn create_folder(&self, drive_root: &str, folder: &str) -> Result<bool> {
        let (parent, name) = match folder.rsplit_once('/') {
            Some((parent, name)) => (Some(parent), name),
            None => (None, folder),
        };
        let parent_reference = parent.and_then(|parent| self.lookup_parent(drive_root, parent));
        let request = CreateFolderRequest {
            name: name.to_string(),
            folder: EmptyFacet {},
            conflict_behavior: String::from("rename"),
            parent_reference,
        };
        let body = serde_json::to_string(&request)
            .map_err(|err| Error::Destination(format!("unable to serialise folder request - {}", err)))?;

        // Graph creates the child under whichever item's collection receives the POST
        let url = match &request.parent_reference {
            Some(parent) => format!("{}{}/items/{}/children", self.base_url, drive_root, parent.id),
            None => format!("{}{}/root/children", self.base_url, drive_root),
        };
        let headers = vec![
            bearer(self.access_token),
            (String::from("Content-type"), String::from("application/json")),
        ];
        debug!("Making POST request to URL={} with body={}", url, body);
        let resp = match self.http.post(url, body, headers) {
            Ok(resp) => resp,
            Err(err) => {
                error!("Unable to create folder {} - {}", folder, err);
                return Ok(false);
            }
        };
        if !resp.is_success() {
            let message = graph_error_message(&resp.body);
            error!("Creating folder {} returned {} - {}", folder, resp.status_code, message);
            return Err(Error::Destination(format!(
                "creating folder {} returned {} - {}",
                folder, resp.status_code, message
            )));
        }
        info!("Created folder {}", folder);
        Ok(true)
    }

    // Best effort: any failure just leaves parentReference out of the create request.
    fn lookup_parent(&self, drive_root: &str, parent: &str) -> Option<ItemReference> {
        let url = format!("{}{}/root:/{}", self.base_url, drive_root, encode_path(parent));
        let resp = self.http.get(url, vec![bearer(self.access_token)]).ok()?;
        if !resp.is_success() {
            debug!("Parent folder {} lookup returned {}", parent, resp.status_code);
            return None;
        }
        let item: DriveItem = serde_json::from_slice(&resp.body).ok()?;
        Some(ItemReference {
            id: item.id,
            path: format!("/drive/root:/{}", parent),
        })
    }

    /// Prefers the SharePoint site drive and falls back to the personal drive when the
    /// site cannot be resolved. A site that resolves but whose folder cannot be ensured
    /// is fatal.
    pub fn resolve(&self, site: Option<&SiteLocator>, folder_path: &str) -> Result<UploadTarget> {
        let folder = normalize_folder_path(folder_path);
        let site_id = site.and_then(|site| self.resolve_site(&site.hostname, &site.site_path));

        let destination = match site_id {
            Some(site_id) => {
                let destination = Destination::SharePoint { site_id };
                if !self.ensure_folder(&destination, &folder)? {
                    return Err(Error::Destination(format!(
                        "folder {} on the SharePoint site is not reachable",
                        folder
                    )));
                }
                destination
            }
            None => {
                if site.is_some() {
                    warn!("Falling back to the personal drive");
                }
                Destination::PersonalDrive
            }
        };
        info!("Uploading to {}/root:/{}", destination.drive_root(), folder);
        Ok(UploadTarget { destination, folder })
    }
}
