use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        CertificateId, DegreeId, LecturerId, PartnerId, ProgramStatus, ReviewStatus,
        TrainingProgramUnit,
    },
    error::{ApiError, ApiException, ErrorCode},
};

/// Every backend response is wrapped as `{ "success": bool, "data": T }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, ApiException> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (_, _, Some(error)) => Err(error.into()),
            (true, None, None) => Err(ApiException::new(
                ErrorCode::Internal,
                "response marked successful but carried no data",
            )),
            (false, _, None) => Err(ApiException::new(ErrorCode::Internal, "request failed")),
        }
    }

    /// Like [`ApiEnvelope::into_result`] but for mutations whose `data` may be
    /// absent.
    pub fn into_ack(self) -> Result<(), ApiException> {
        match (self.success, self.error) {
            (true, _) => Ok(()),
            (false, Some(error)) => Err(error.into()),
            (false, None) => Err(ApiException::new(ErrorCode::Internal, "request failed")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision<Id> {
    pub id: Id,
    pub status: ReviewStatus,
    #[serde(default)]
    pub note: String,
}

/// All decisions for one lecturer, committed by the backend in a single
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LecturerReviewBatch {
    pub lecturer: ReviewDecision<LecturerId>,
    pub degrees: Vec<ReviewDecision<DegreeId>>,
    pub certificates: Vec<ReviewDecision<CertificateId>>,
    pub notify_by_email: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUnitsRequest {
    pub units: Vec<TrainingProgramUnit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramPayload {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub learning_outcomes: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgramStatus>,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syllabus_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub address: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<PartnerId>,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
}
