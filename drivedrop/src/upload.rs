//! Uploads every file of a local folder and tags each uploaded file with its remote id.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::credentials::Credentials;
use crate::destination::{DestinationResolver, SiteLocator, UploadTarget};
use crate::error::{Error, Result};
use crate::http::{bearer, Httper};
use crate::token::TokenService;
use crate::types::{graph_error_message, DriveItem};

pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A file found in the source folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub size: u64,
    pub mime_type: String,
}

impl LocalFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub remote_id: String,
    pub local_path: PathBuf,
}

/// Per-run counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub uploaded: usize,
    pub renamed: usize,
    pub failed: usize,
}

/// MIME type guessed from the extension.
pub fn mime_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string()
}

/// Regular files directly under `folder`, sorted by name.
pub fn list_files(folder: &Path) -> Result<Vec<LocalFile>> {
    let entries = fs::read_dir(folder)
        .map_err(|err| Error::io(format!("listing {}", folder.display()), err))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(format!("listing {}", folder.display()), err))?;
        let path = entry.path();
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("Skipping {} - {}", path.display(), err);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(LocalFile {
            mime_type: mime_type_for(&path),
            size: metadata.len(),
            path,
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Inserts `_fid_{remote_id}` between the stem and the extension of `file_name`.
pub fn fid_file_name(file_name: &str, remote_id: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    match path.extension() {
        Some(extension) => format!("{}_fid_{}.{}", stem, remote_id, extension.to_string_lossy()),
        None => format!("{}_fid_{}", stem, remote_id),
    }
}

/// Renames the uploaded file next to itself, never overwriting an existing file.
pub fn rename_with_fid(result: &UploadResult) -> Result<PathBuf> {
    let file_name = result
        .local_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let renamed = result
        .local_path
        .with_file_name(fid_file_name(&file_name, &result.remote_id));
    if renamed.exists() {
        return Err(Error::io(
            format!("renaming {} to {}", result.local_path.display(), renamed.display()),
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target already exists"),
        ));
    }
    fs::rename(&result.local_path, &renamed).map_err(|err| {
        Error::io(
            format!("renaming {} to {}", result.local_path.display(), renamed.display()),
            err,
        )
    })?;
    Ok(renamed)
}

/// PUTs one file to the target folder and returns the id the service assigned to it.
pub fn upload_file(
    http: &dyn Httper,
    base_url: &str,
    access_token: &str,
    target: &UploadTarget,
    file: &LocalFile,
) -> Result<UploadResult> {
    let file_name = file.file_name();
    let contents = fs::read(&file.path)
        .map_err(|err| Error::io(format!("reading {}", file.path.display()), err))?;
    let url = target.content_url(base_url, &file_name);
    let headers = vec![
        bearer(access_token),
        (String::from("Content-Type"), file.mime_type.clone()),
    ];
    debug!("Making PUT request to URL={} ({} bytes, {})", url, file.size, file.mime_type);

    let resp = http
        .put(url, contents, headers)
        .map_err(|err| Error::Upload(format!("{} - {}", file_name, err)))?;
    if !resp.is_success() {
        return Err(Error::Upload(format!(
            "{} - status {} - {}",
            file_name,
            resp.status_code,
            graph_error_message(&resp.body)
        )));
    }
    let item: DriveItem = serde_json::from_slice(&resp.body)
        .map_err(|err| Error::Upload(format!("{} - response has no item id - {}", file_name, err)))?;
    if item.id.is_empty() {
        return Err(Error::Upload(format!("{} - response has an empty item id", file_name)));
    }
    Ok(UploadResult {
        remote_id: item.id,
        local_path: file.path.clone(),
    })
}

/// Drives a whole run: token, destination, then every file in turn.
pub struct Uploader<'a> {
    pub http: &'a dyn Httper,
    pub credentials: &'a Credentials,
    /// Graph base URL, ending with `/`.
    pub base_url: String,
    /// SharePoint site to try first; `None` goes straight to the personal drive.
    pub site: Option<SiteLocator>,
    /// Folder below the drive root that receives the files.
    pub destination_path: String,
}

impl<'a> Uploader<'a> {
    /// Uploads the files found in `source_folder`.
    ///
    /// Authentication and destination failures abort the run. Failures of a single
    /// file are logged and counted, and the run moves on to the next file.
    pub fn run(&self, source_folder: &Path) -> Result<RunSummary> {
        let access_token = TokenService::new(self.http, self.credentials).get_access_token()?;
        let target = DestinationResolver::new(self.http, &self.base_url, &access_token)
            .resolve(self.site.as_ref(), &self.destination_path)?;

        let files = list_files(source_folder)?;
        let mut summary = RunSummary {
            discovered: files.len(),
            ..RunSummary::default()
        };
        if files.is_empty() {
            info!("No files to upload in {}", source_folder.display());
            return Ok(summary);
        }
        info!("Uploading {} file(s) from {}", files.len(), source_folder.display());

        let pb = indicatif::ProgressBar::new(files.len() as u64);
        for file in files.iter() {
            let file_name = file.file_name();
            let result = match upload_file(self.http, &self.base_url, &access_token, &target, file) {
                Ok(result) => result,
                Err(err) => {
                    error!("Skipping {} - {}", file_name, err);
                    summary.failed += 1;
                    pb.inc(1);
                    continue;
                }
            };
            summary.uploaded += 1;
            info!("Uploaded {} as {}", file_name, result.remote_id);

            match rename_with_fid(&result) {
                Ok(renamed) => {
                    summary.renamed += 1;
                    debug!("Renamed {} to {}", file.path.display(), renamed.display());
                }
                Err(err) => error!("Uploaded {} but could not rename it - {}", file_name, err),
            }
            pb.inc(1);
            pb.println(format!("[+] {} -> {}", file_name, result.remote_id));
        }
        pb.finish_and_clear();

        info!(
            "Run finished: {} uploaded, {} renamed, {} failed",
            summary.uploaded, summary.renamed, summary.failed
        );
        Ok(summary)
    }
}
