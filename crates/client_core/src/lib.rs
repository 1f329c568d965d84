use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{
        Lecturer, LecturerId, Partner, PartnerId, ProgramId, TrainingProgram,
        TrainingProgramRequest, TrainingProgramUnit,
    },
    protocol::{
        ApiEnvelope, LecturerReviewBatch, PartnerPayload, ProgramPayload, ProgramRequestPayload,
        UpdateUnitsRequest, UploadResponse,
    },
};
use tracing::{debug, warn};
use url::Url;

pub mod approval;
pub mod debounce;
pub mod error;
pub mod forms;
pub mod reorder;
pub mod search;
pub mod store;
pub mod upload;

pub use approval::{
    DraftKey, DraftStore, InMemoryDraftStore, LecturerReview, ReviewError, ReviewTarget,
};
pub use error::ClientError;
pub use store::{ListKind, LoadState, PortalEvent, PortalStore};
pub use upload::{FileSelection, FileSlot, UploadError, UploadKind, Uploader};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the portal asks of the backend. Grouped the way the backend
/// groups its routes: `public`, `admin`, `program`, `partner` and `files`.
#[async_trait]
pub trait PortalApi: Send + Sync {
    async fn list_public_programs(&self) -> Result<Vec<TrainingProgram>>;
    async fn get_public_program(&self, program_id: ProgramId) -> Result<TrainingProgram>;

    async fn list_programs(&self) -> Result<Vec<TrainingProgram>>;
    async fn list_lecturers(&self) -> Result<Vec<Lecturer>>;
    async fn get_lecturer(&self, lecturer_id: LecturerId) -> Result<Lecturer>;
    async fn list_partners(&self) -> Result<Vec<Partner>>;
    async fn list_program_requests(&self) -> Result<Vec<TrainingProgramRequest>>;
    async fn submit_lecturer_review(
        &self,
        lecturer_id: LecturerId,
        batch: &LecturerReviewBatch,
    ) -> Result<()>;

    async fn create_program(&self, payload: &ProgramPayload) -> Result<TrainingProgram>;
    async fn update_program(
        &self,
        program_id: ProgramId,
        payload: &ProgramPayload,
    ) -> Result<TrainingProgram>;
    async fn update_program_units(
        &self,
        program_id: ProgramId,
        units: &[TrainingProgramUnit],
    ) -> Result<()>;

    async fn update_partner(&self, partner_id: PartnerId, payload: &PartnerPayload)
        -> Result<Partner>;
    async fn create_program_request(
        &self,
        payload: &ProgramRequestPayload,
    ) -> Result<TrainingProgramRequest>;

    async fn upload_file(
        &self,
        kind: UploadKind,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub api_token: Option<String>,
    pub request_timeout: Option<Duration>,
}

pub struct HttpPortalClient {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpPortalClient {
    pub fn new(base_url: &str) -> std::result::Result<Self, ClientError> {
        Self::with_options(base_url, ClientOptions::default())
    }

    pub fn with_options(
        base_url: &str,
        options: ClientOptions,
    ) -> std::result::Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|err| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "scheme must be http or https".into(),
            });
        }

        let http = Client::builder()
            .timeout(options.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: options.api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("portal api: {method} {url}");
        let builder = self.http.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned + Send>(&self, path: &str) -> Result<T> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(ClientError::from)?;
        Ok(decode_envelope(response).await?)
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned + Send,
    {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(ClientError::from)?;
        Ok(decode_envelope(response).await?)
    }

    async fn send_ack<B>(&self, method: Method, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(ClientError::from)?;
        let status = response.status();
        let body = response.bytes().await.map_err(ClientError::from)?;
        match serde_json::from_slice::<ApiEnvelope<serde_json::Value>>(&body) {
            Ok(envelope) => Ok(envelope.into_ack().map_err(ClientError::from)?),
            Err(_) if status.is_success() && body.is_empty() => Ok(()),
            Err(err) if status.is_success() => Err(ClientError::Decode(err).into()),
            Err(_) => Err(ClientError::Status(status.as_u16()).into()),
        }
    }
}

async fn decode_envelope<T: DeserializeOwned + Send>(
    response: Response,
) -> std::result::Result<T, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;
    match serde_json::from_slice::<ApiEnvelope<T>>(&body) {
        Ok(envelope) => Ok(envelope.into_result()?),
        Err(err) if status.is_success() => Err(ClientError::Decode(err)),
        Err(_) => {
            warn!("portal api: HTTP {status} without an envelope body");
            Err(ClientError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl PortalApi for HttpPortalClient {
    async fn list_public_programs(&self) -> Result<Vec<TrainingProgram>> {
        self.get_json("public/programs").await
    }

    async fn get_public_program(&self, program_id: ProgramId) -> Result<TrainingProgram> {
        self.get_json(&format!("public/programs/{program_id}")).await
    }

    async fn list_programs(&self) -> Result<Vec<TrainingProgram>> {
        self.get_json("admin/programs").await
    }

    async fn list_lecturers(&self) -> Result<Vec<Lecturer>> {
        self.get_json("admin/lecturers").await
    }

    async fn get_lecturer(&self, lecturer_id: LecturerId) -> Result<Lecturer> {
        self.get_json(&format!("admin/lecturers/{lecturer_id}")).await
    }

    async fn list_partners(&self) -> Result<Vec<Partner>> {
        self.get_json("admin/partners").await
    }

    async fn list_program_requests(&self) -> Result<Vec<TrainingProgramRequest>> {
        self.get_json("admin/requests").await
    }

    async fn submit_lecturer_review(
        &self,
        lecturer_id: LecturerId,
        batch: &LecturerReviewBatch,
    ) -> Result<()> {
        self.send_ack(
            Method::POST,
            &format!("admin/lecturers/{lecturer_id}/review"),
            batch,
        )
        .await
    }

    async fn create_program(&self, payload: &ProgramPayload) -> Result<TrainingProgram> {
        self.send_json(Method::POST, "programs", payload).await
    }

    async fn update_program(
        &self,
        program_id: ProgramId,
        payload: &ProgramPayload,
    ) -> Result<TrainingProgram> {
        self.send_json(Method::PUT, &format!("programs/{program_id}"), payload)
            .await
    }

    async fn update_program_units(
        &self,
        program_id: ProgramId,
        units: &[TrainingProgramUnit],
    ) -> Result<()> {
        self.send_ack(
            Method::PUT,
            &format!("programs/{program_id}/units"),
            &UpdateUnitsRequest {
                units: units.to_vec(),
            },
        )
        .await
    }

    async fn update_partner(
        &self,
        partner_id: PartnerId,
        payload: &PartnerPayload,
    ) -> Result<Partner> {
        self.send_json(Method::PUT, &format!("partners/{partner_id}"), payload)
            .await
    }

    async fn create_program_request(
        &self,
        payload: &ProgramRequestPayload,
    ) -> Result<TrainingProgramRequest> {
        self.send_json(Method::POST, "partners/requests", payload)
            .await
    }

    async fn upload_file(
        &self,
        kind: UploadKind,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let response = self
            .request(Method::POST, "files/upload")
            .query(&[
                ("kind", kind.as_str()),
                ("filename", filename),
                ("mime_type", mime_type),
            ])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(ClientError::from)?;
        let uploaded: UploadResponse = decode_envelope(response).await?;
        Ok(uploaded.url)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
