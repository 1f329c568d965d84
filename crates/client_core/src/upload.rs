use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::{store::PortalStore, PortalApi};

const MIB: u64 = 1024 * 1024;

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];
const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadKind {
    BannerImage,
    Syllabus,
    RequestAttachment,
}

impl UploadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadKind::BannerImage => "banner",
            UploadKind::Syllabus => "syllabus",
            UploadKind::RequestAttachment => "attachment",
        }
    }

    pub fn allowed_mime_types(self) -> &'static [&'static str] {
        match self {
            UploadKind::BannerImage => IMAGE_TYPES,
            UploadKind::Syllabus | UploadKind::RequestAttachment => DOCUMENT_TYPES,
        }
    }

    pub fn max_bytes(self) -> u64 {
        match self {
            UploadKind::BannerImage => 5 * MIB,
            UploadKind::Syllabus | UploadKind::RequestAttachment => 10 * MIB,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileSelection {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileSelection {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            bytes,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declared type if any, otherwise guessed from the file extension.
    pub fn effective_mime_type(&self) -> Option<String> {
        self.mime_type.clone().or_else(|| {
            mime_guess::from_path(&self.filename)
                .first_raw()
                .map(str::to_string)
        })
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file is empty")]
    Empty,
    #[error("{kind} does not accept files of type {mime_type}")]
    UnsupportedType { kind: &'static str, mime_type: String },
    #[error("{kind} must be at most {limit} bytes, got {size}")]
    TooLarge {
        kind: &'static str,
        size: u64,
        limit: u64,
    },
    #[error("upload failed: {0:#}")]
    Failed(anyhow::Error),
}

/// Checks a selection against the slot's policy before anything is sent.
/// Returns the MIME type to upload with.
pub fn validate_selection(kind: UploadKind, file: &FileSelection) -> Result<String, UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    let size = file.bytes.len() as u64;
    if size > kind.max_bytes() {
        return Err(UploadError::TooLarge {
            kind: kind.as_str(),
            size,
            limit: kind.max_bytes(),
        });
    }
    let mime_type = file
        .effective_mime_type()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if !kind.allowed_mime_types().contains(&mime_type.as_str()) {
        return Err(UploadError::UnsupportedType {
            kind: kind.as_str(),
            mime_type,
        });
    }
    Ok(mime_type)
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Stores the file and returns its public URL.
    async fn upload(
        &self,
        kind: UploadKind,
        file: FileSelection,
        mime_type: &str,
    ) -> anyhow::Result<String>;

    /// Called for every rejected or failed selection.
    fn report_failure(&self, _err: &UploadError) {}
}

#[async_trait]
impl<T> Uploader for T
where
    T: PortalApi + ?Sized,
{
    async fn upload(
        &self,
        kind: UploadKind,
        file: FileSelection,
        mime_type: &str,
    ) -> anyhow::Result<String> {
        self.upload_file(kind, &file.filename, mime_type, file.bytes)
            .await
    }
}

/// Uploads through the backend and shows every failure to the user.
#[async_trait]
impl Uploader for PortalStore {
    async fn upload(
        &self,
        kind: UploadKind,
        file: FileSelection,
        mime_type: &str,
    ) -> anyhow::Result<String> {
        self.api()
            .upload_file(kind, &file.filename, mime_type, file.bytes)
            .await
    }

    fn report_failure(&self, err: &UploadError) {
        self.notify_error(err.to_string());
    }
}

/// A file input whose only persisted value is the uploaded URL.
#[derive(Debug, Clone)]
pub struct FileSlot {
    kind: UploadKind,
    selected: Option<String>,
    url: Option<String>,
}

impl FileSlot {
    pub fn new(kind: UploadKind) -> Self {
        Self {
            kind,
            selected: None,
            url: None,
        }
    }

    /// Slot pre-filled from an existing record.
    pub fn with_url(kind: UploadKind, url: Option<String>) -> Self {
        Self {
            kind,
            selected: None,
            url,
        }
    }

    pub fn kind(&self) -> UploadKind {
        self.kind
    }

    pub fn selected_filename(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Validates and uploads right away. A rejected file leaves the slot
    /// untouched; a failed upload clears both the selection and the URL.
    pub async fn select<U>(&mut self, file: FileSelection, uploader: &U) -> Result<&str, UploadError>
    where
        U: Uploader + ?Sized,
    {
        let mime_type = match validate_selection(self.kind, &file) {
            Ok(mime_type) => mime_type,
            Err(err) => {
                uploader.report_failure(&err);
                return Err(err);
            }
        };
        let filename = file.filename.clone();
        self.selected = Some(filename.clone());

        match uploader.upload(self.kind, file, &mime_type).await {
            Ok(url) => {
                info!("upload: {} {filename} -> {url}", self.kind.as_str());
                Ok(self.url.insert(url).as_str())
            }
            Err(err) => {
                warn!("upload: {} {filename} failed: {err:#}", self.kind.as_str());
                self.clear();
                let err = UploadError::Failed(err);
                uploader.report_failure(&err);
                Err(err)
            }
        }
    }

    pub fn clear(&mut self) {
        self.selected = None;
        self.url = None;
    }
}

#[cfg(test)]
#[path = "tests/upload_tests.rs"]
mod tests;
