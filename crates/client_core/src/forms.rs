//! Editable form state for programs, partners and program requests.
//!
//! Fields are set by name, the way an input's `name` attribute would drive
//! them, and parsed on the way in. Submitting validates first and then hands
//! the payload to a [`SaveHandler`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{Partner, PartnerId, ProgramId, ProgramStatus, TrainingProgram},
    protocol::{PartnerPayload, ProgramPayload, ProgramRequestPayload},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    store::{ListKind, PortalStore},
    upload::{FileSelection, FileSlot, UploadError, UploadKind, Uploader},
};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum FormError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("{0}")]
    Invalid(String),
    #[error("save failed: {0:#}")]
    Save(anyhow::Error),
}

pub trait FormState {
    type Payload;

    /// Field names that must be non-blank before submit.
    const REQUIRED: &'static [&'static str];

    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError>;

    /// Current value rendered back as text; `None` for unknown names.
    fn field_value(&self, name: &str) -> Option<String>;

    fn payload(&self) -> Result<Self::Payload, FormError>;

    /// Cross-field rules, run after the required-field check passes.
    fn check_consistency(&self) -> Result<(), FormError> {
        Ok(())
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        Self::REQUIRED
            .iter()
            .copied()
            .filter(|name| {
                self.field_value(name)
                    .map_or(true, |value| value.trim().is_empty())
            })
            .collect()
    }

    fn validate(&self) -> Result<(), FormError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(FormError::MissingFields(missing));
        }
        self.check_consistency()
    }
}

#[async_trait]
pub trait SaveHandler<P: Send + 'static>: Send + Sync {
    async fn save(&self, payload: P) -> anyhow::Result<()>;

    /// Called when the form fails validation and nothing is saved.
    fn rejected(&self, _err: &FormError) {}
}

/// Validates `form` and passes its payload to `handler`. Nothing is sent when
/// validation fails.
pub async fn submit<F, H>(form: &F, handler: &H) -> Result<(), FormError>
where
    F: FormState,
    F::Payload: Send + 'static,
    H: SaveHandler<F::Payload> + ?Sized,
{
    let payload = match form.validate().and_then(|()| form.payload()) {
        Ok(payload) => payload,
        Err(err) => {
            handler.rejected(&err);
            return Err(err);
        }
    };
    handler.save(payload).await.map_err(FormError::Save)
}

fn parse_price(field: &'static str, value: &str) -> Result<Option<i64>, FormError> {
    let digits: String = value
        .chars()
        .filter(|ch| !matches!(ch, '.' | ',' | '₫') && !ch.is_whitespace())
        .collect();
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse::<i64>()
        .map(Some)
        .map_err(|err| FormError::InvalidValue {
            field,
            reason: err.to_string(),
        })
}

fn parse_date(field: &'static str, value: &str) -> Result<Option<NaiveDate>, FormError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map(Some)
        .map_err(|err| FormError::InvalidValue {
            field,
            reason: format!("{err} (expected YYYY-MM-DD)"),
        })
}

fn parse_program_status(value: &str) -> Result<Option<ProgramStatus>, FormError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    value
        .parse::<ProgramStatus>()
        .map(Some)
        .map_err(|err| FormError::InvalidValue {
            field: "status",
            reason: err.to_string(),
        })
}

/// Comma-separated input; blanks and case-insensitive duplicates are dropped.
fn parse_tags(value: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in value.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|known| known.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    tags
}

fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn looks_like_email(value: &str) -> bool {
    match value.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct ProgramForm {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub learning_outcomes: String,
    pub tags: Vec<String>,
    pub status: Option<ProgramStatus>,
    pub price: Option<i64>,
    pub discounted_price: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    banner: FileSlot,
    syllabus: FileSlot,
}

impl Default for ProgramForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            subtitle: String::new(),
            description: String::new(),
            learning_outcomes: String::new(),
            tags: Vec::new(),
            status: None,
            price: None,
            discounted_price: None,
            start_date: None,
            end_date: None,
            banner: FileSlot::new(UploadKind::BannerImage),
            syllabus: FileSlot::new(UploadKind::Syllabus),
        }
    }
}

impl ProgramForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edit form pre-filled from an existing program.
    pub fn from_program(program: &TrainingProgram) -> Self {
        Self {
            title: program.title.clone(),
            subtitle: program.subtitle.clone(),
            description: program.description.clone(),
            learning_outcomes: program.learning_outcomes.clone(),
            tags: program.tags.clone(),
            status: Some(program.status),
            price: Some(program.price),
            discounted_price: program.discounted_price,
            start_date: program.start_date,
            end_date: program.end_date,
            banner: FileSlot::with_url(UploadKind::BannerImage, program.banner_url.clone()),
            syllabus: FileSlot::with_url(UploadKind::Syllabus, program.syllabus_url.clone()),
        }
    }

    pub fn banner(&self) -> &FileSlot {
        &self.banner
    }

    pub fn syllabus(&self) -> &FileSlot {
        &self.syllabus
    }

    pub async fn select_banner<U>(
        &mut self,
        file: FileSelection,
        uploader: &U,
    ) -> Result<(), UploadError>
    where
        U: Uploader + ?Sized,
    {
        self.banner.select(file, uploader).await.map(|_| ())
    }

    pub async fn select_syllabus<U>(
        &mut self,
        file: FileSelection,
        uploader: &U,
    ) -> Result<(), UploadError>
    where
        U: Uploader + ?Sized,
    {
        self.syllabus.select(file, uploader).await.map(|_| ())
    }
}

impl FormState for ProgramForm {
    type Payload = ProgramPayload;

    const REQUIRED: &'static [&'static str] =
        &["title", "description", "price", "startDate", "endDate"];

    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        match name {
            "title" => self.title = value.to_string(),
            "subtitle" => self.subtitle = value.to_string(),
            "description" => self.description = value.to_string(),
            "learningOutcomes" => self.learning_outcomes = value.to_string(),
            "tags" => self.tags = parse_tags(value),
            "status" => self.status = parse_program_status(value)?,
            "price" => self.price = parse_price("price", value)?,
            "discountedPrice" => self.discounted_price = parse_price("discountedPrice", value)?,
            "startDate" => self.start_date = parse_date("startDate", value)?,
            "endDate" => self.end_date = parse_date("endDate", value)?,
            other => return Err(FormError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn field_value(&self, name: &str) -> Option<String> {
        let value = match name {
            "title" => self.title.clone(),
            "subtitle" => self.subtitle.clone(),
            "description" => self.description.clone(),
            "learningOutcomes" => self.learning_outcomes.clone(),
            "tags" => self.tags.join(", "),
            "status" => self.status.map(|s| s.as_str().to_string()).unwrap_or_default(),
            "price" => self.price.map(|p| p.to_string()).unwrap_or_default(),
            "discountedPrice" => self
                .discounted_price
                .map(|p| p.to_string())
                .unwrap_or_default(),
            "startDate" => self.start_date.map(|d| d.to_string()).unwrap_or_default(),
            "endDate" => self.end_date.map(|d| d.to_string()).unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }

    fn check_consistency(&self) -> Result<(), FormError> {
        if self.price.is_some_and(|price| price < 0)
            || self.discounted_price.is_some_and(|price| price < 0)
        {
            return Err(FormError::Invalid("prices must not be negative".into()));
        }
        if let (Some(price), Some(discounted)) = (self.price, self.discounted_price) {
            if discounted > price {
                return Err(FormError::Invalid(
                    "discounted price must not exceed the price".into(),
                ));
            }
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(FormError::Invalid(
                    "end date must not be before the start date".into(),
                ));
            }
        }
        Ok(())
    }

    fn payload(&self) -> Result<ProgramPayload, FormError> {
        let price = self
            .price
            .ok_or_else(|| FormError::MissingFields(vec!["price"]))?;
        Ok(ProgramPayload {
            title: self.title.trim().to_string(),
            subtitle: self.subtitle.trim().to_string(),
            description: self.description.trim().to_string(),
            learning_outcomes: self.learning_outcomes.trim().to_string(),
            tags: self.tags.clone(),
            status: self.status,
            price,
            discounted_price: self.discounted_price,
            start_date: self.start_date,
            end_date: self.end_date,
            banner_url: self.banner.url().map(str::to_string),
            syllabus_url: self.syllabus.url().map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PartnerForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub address: String,
    pub description: String,
    pub logo_url: Option<String>,
}

impl PartnerForm {
    pub fn from_partner(partner: &Partner) -> Self {
        Self {
            name: partner.name.clone(),
            email: partner.email.clone(),
            phone: partner.phone.clone(),
            website: partner.website.clone(),
            address: partner.address.clone(),
            description: partner.description.clone(),
            logo_url: partner.logo_url.clone(),
        }
    }
}

impl FormState for PartnerForm {
    type Payload = PartnerPayload;

    const REQUIRED: &'static [&'static str] = &["name", "email", "phone"];

    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        match name {
            "name" => self.name = value.to_string(),
            "email" => self.email = value.to_string(),
            "phone" => self.phone = value.to_string(),
            "website" => self.website = value.to_string(),
            "address" => self.address = value.to_string(),
            "description" => self.description = value.to_string(),
            "logoUrl" => self.logo_url = optional_text(value),
            other => return Err(FormError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn field_value(&self, name: &str) -> Option<String> {
        let value = match name {
            "name" => &self.name,
            "email" => &self.email,
            "phone" => &self.phone,
            "website" => &self.website,
            "address" => &self.address,
            "description" => &self.description,
            "logoUrl" => return Some(self.logo_url.clone().unwrap_or_default()),
            _ => return None,
        };
        Some(value.clone())
    }

    fn check_consistency(&self) -> Result<(), FormError> {
        if !looks_like_email(&self.email) {
            return Err(FormError::InvalidValue {
                field: "email",
                reason: format!("{} is not an email address", self.email.trim()),
            });
        }
        Ok(())
    }

    fn payload(&self) -> Result<PartnerPayload, FormError> {
        Ok(PartnerPayload {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            website: self.website.trim().to_string(),
            address: self.address.trim().to_string(),
            description: self.description.trim().to_string(),
            logo_url: self.logo_url.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProgramRequestForm {
    pub partner_id: Option<PartnerId>,
    pub title: String,
    pub description: String,
    attachment: FileSlot,
}

impl Default for ProgramRequestForm {
    fn default() -> Self {
        Self {
            partner_id: None,
            title: String::new(),
            description: String::new(),
            attachment: FileSlot::new(UploadKind::RequestAttachment),
        }
    }
}

impl ProgramRequestForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachment(&self) -> &FileSlot {
        &self.attachment
    }

    pub async fn select_attachment<U>(
        &mut self,
        file: FileSelection,
        uploader: &U,
    ) -> Result<(), UploadError>
    where
        U: Uploader + ?Sized,
    {
        self.attachment.select(file, uploader).await.map(|_| ())
    }
}

impl FormState for ProgramRequestForm {
    type Payload = ProgramRequestPayload;

    const REQUIRED: &'static [&'static str] = &["title", "description"];

    fn set_field(&mut self, name: &str, value: &str) -> Result<(), FormError> {
        match name {
            "partnerId" => {
                let value = value.trim();
                self.partner_id = if value.is_empty() {
                    None
                } else {
                    let id = value.parse::<i64>().map_err(|err| FormError::InvalidValue {
                        field: "partnerId",
                        reason: err.to_string(),
                    })?;
                    Some(PartnerId(id))
                };
            }
            "title" => self.title = value.to_string(),
            "description" => self.description = value.to_string(),
            other => return Err(FormError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn field_value(&self, name: &str) -> Option<String> {
        match name {
            "partnerId" => Some(self.partner_id.map(|id| id.to_string()).unwrap_or_default()),
            "title" => Some(self.title.clone()),
            "description" => Some(self.description.clone()),
            _ => None,
        }
    }

    fn payload(&self) -> Result<ProgramRequestPayload, FormError> {
        Ok(ProgramRequestPayload {
            partner_id: self.partner_id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            attachment_url: self.attachment.url().map(str::to_string),
        })
    }
}

/// Saves went through; re-fetch the affected list and tell the user.
async fn after_save(store: &PortalStore, kind: ListKind, message: String) {
    info!("forms: {message}");
    if let Err(err) = store.refresh(kind).await {
        warn!("forms: {} refresh failed after save: {err:#}", kind.label());
    }
    store.notify(message);
}

/// Creates a program, or updates it when `program_id` is set.
pub struct ProgramSave {
    pub store: Arc<PortalStore>,
    pub program_id: Option<ProgramId>,
}

#[async_trait]
impl SaveHandler<ProgramPayload> for ProgramSave {
    async fn save(&self, payload: ProgramPayload) -> anyhow::Result<()> {
        let api = self.store.api();
        let saved = match self.program_id {
            Some(id) => api.update_program(id, &payload).await,
            None => api.create_program(&payload).await,
        };
        match saved {
            Ok(program) => {
                after_save(
                    &self.store,
                    ListKind::Programs,
                    format!("program {} saved", program.id),
                )
                .await;
                Ok(())
            }
            Err(err) => {
                self.store
                    .notify_error(format!("failed to save program: {err}"));
                Err(err)
            }
        }
    }

    fn rejected(&self, err: &FormError) {
        self.store.notify_error(err.to_string());
    }
}

pub struct PartnerSave {
    pub store: Arc<PortalStore>,
    pub partner_id: PartnerId,
}

#[async_trait]
impl SaveHandler<PartnerPayload> for PartnerSave {
    async fn save(&self, payload: PartnerPayload) -> anyhow::Result<()> {
        match self.store.api().update_partner(self.partner_id, &payload).await {
            Ok(partner) => {
                after_save(
                    &self.store,
                    ListKind::Partners,
                    format!("partner {} saved", partner.id),
                )
                .await;
                Ok(())
            }
            Err(err) => {
                self.store
                    .notify_error(format!("failed to save partner: {err}"));
                Err(err)
            }
        }
    }

    fn rejected(&self, err: &FormError) {
        self.store.notify_error(err.to_string());
    }
}

pub struct RequestSave {
    pub store: Arc<PortalStore>,
}

#[async_trait]
impl SaveHandler<ProgramRequestPayload> for RequestSave {
    async fn save(&self, payload: ProgramRequestPayload) -> anyhow::Result<()> {
        match self.store.api().create_program_request(&payload).await {
            Ok(request) => {
                after_save(
                    &self.store,
                    ListKind::Requests,
                    format!("program request {} submitted", request.id),
                )
                .await;
                Ok(())
            }
            Err(err) => {
                self.store
                    .notify_error(format!("failed to submit program request: {err}"));
                Err(err)
            }
        }
    }

    fn rejected(&self, err: &FormError) {
        self.store.notify_error(err.to_string());
    }
}

#[cfg(test)]
#[path = "tests/forms_tests.rs"]
mod tests;
