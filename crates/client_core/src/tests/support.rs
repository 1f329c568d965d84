//! Fixtures and an in-process `PortalApi` double shared by the unit tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{
        Certificate, CertificateId, Degree, DegreeId, Lecturer, LecturerId, Partner, PartnerId,
        ProgramId, ProgramStatus, RequestId, ReviewStatus, TrainingProgram,
        TrainingProgramRequest, TrainingProgramUnit, UnitId,
    },
    protocol::{LecturerReviewBatch, PartnerPayload, ProgramPayload, ProgramRequestPayload},
};

use crate::{upload::UploadKind, PortalApi};

pub fn program(id: i64, title: &str) -> TrainingProgram {
    TrainingProgram {
        id: ProgramId(id),
        title: title.to_string(),
        subtitle: String::new(),
        description: format!("{title} description"),
        learning_outcomes: String::new(),
        tags: Vec::new(),
        status: ProgramStatus::Published,
        price: 1_000_000,
        discounted_price: None,
        start_date: None,
        end_date: None,
        banner_url: None,
        syllabus_url: None,
        units: Vec::new(),
        request_id: None,
        partner_id: None,
    }
}

pub fn unit(id: i64, order: u32) -> TrainingProgramUnit {
    TrainingProgramUnit {
        id: UnitId(id),
        lecturer_id: LecturerId(1),
        title: format!("unit {id}"),
        description: String::new(),
        duration_minutes: 90,
        order,
        is_lead: false,
    }
}

pub fn degree(id: i64, status: ReviewStatus) -> Degree {
    Degree {
        id: DegreeId(id),
        name: format!("degree {id}"),
        major: "Computer Science".into(),
        institution: "HCMUT".into(),
        level: "Master".into(),
        graduation_year: Some(2015),
        reference_url: None,
        status,
        admin_note: None,
    }
}

pub fn certificate(id: i64, status: ReviewStatus) -> Certificate {
    Certificate {
        id: CertificateId(id),
        name: format!("certificate {id}"),
        issuer: "AWS".into(),
        issued_at: None,
        expires_at: None,
        reference_url: None,
        status,
        admin_note: None,
    }
}

pub fn lecturer(id: i64, degrees: Vec<Degree>, certificates: Vec<Certificate>) -> Lecturer {
    Lecturer {
        id: LecturerId(id),
        full_name: format!("Lecturer {id}"),
        email: format!("lecturer{id}@example.com"),
        phone: "0900000000".into(),
        expertise: "Backend".into(),
        bio: String::new(),
        avatar_url: None,
        status: ReviewStatus::Pending,
        admin_note: None,
        degrees,
        certificates,
    }
}

pub fn partner(id: i64, name: &str) -> Partner {
    Partner {
        id: PartnerId(id),
        name: name.to_string(),
        email: "contact@partner.vn".into(),
        phone: "0281234567".into(),
        website: String::new(),
        address: String::new(),
        description: String::new(),
        logo_url: None,
        status: ReviewStatus::Approved,
    }
}

/// Records every call it receives. Lists are served from its fields;
/// mutations can be switched to fail.
#[derive(Default)]
pub struct RecordingApi {
    pub programs: Mutex<Vec<TrainingProgram>>,
    pub lecturers: Mutex<Vec<Lecturer>>,
    pub partners: Mutex<Vec<Partner>>,
    pub requests: Mutex<Vec<TrainingProgramRequest>>,
    pub fail_lists: AtomicBool,
    pub fail_mutations: AtomicBool,
    pub calls: Mutex<Vec<String>>,
    pub reviews: Mutex<Vec<(LecturerId, LecturerReviewBatch)>>,
    pub saved_units: Mutex<Vec<(ProgramId, Vec<TrainingProgramUnit>)>>,
    pub program_payloads: Mutex<Vec<(Option<ProgramId>, ProgramPayload)>>,
    pub partner_payloads: Mutex<Vec<PartnerPayload>>,
    pub request_payloads: Mutex<Vec<ProgramRequestPayload>>,
    pub uploads: Mutex<Vec<(UploadKind, String, String, usize)>>,
}

impl RecordingApi {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Calls other than list/get reads.
    pub fn mutation_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("list_") && !call.starts_with("get_"))
            .collect()
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("calls lock").push(call.into());
    }

    fn read<T: Clone>(&self, call: &str, items: &Mutex<Vec<T>>) -> Result<Vec<T>> {
        self.record(call);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(anyhow!("backend unavailable"));
        }
        Ok(items.lock().expect("list lock").clone())
    }

    fn mutate(&self, call: String) -> Result<()> {
        self.record(call);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(anyhow!("backend rejected the change"));
        }
        Ok(())
    }
}

#[async_trait]
impl PortalApi for RecordingApi {
    async fn list_public_programs(&self) -> Result<Vec<TrainingProgram>> {
        self.read("list_public_programs", &self.programs)
    }

    async fn get_public_program(&self, program_id: ProgramId) -> Result<TrainingProgram> {
        self.read("get_public_program", &self.programs)?
            .into_iter()
            .find(|program| program.id == program_id)
            .ok_or_else(|| anyhow!("program {program_id} not found"))
    }

    async fn list_programs(&self) -> Result<Vec<TrainingProgram>> {
        self.read("list_programs", &self.programs)
    }

    async fn list_lecturers(&self) -> Result<Vec<Lecturer>> {
        self.read("list_lecturers", &self.lecturers)
    }

    async fn get_lecturer(&self, lecturer_id: LecturerId) -> Result<Lecturer> {
        self.read("get_lecturer", &self.lecturers)?
            .into_iter()
            .find(|lecturer| lecturer.id == lecturer_id)
            .ok_or_else(|| anyhow!("lecturer {lecturer_id} not found"))
    }

    async fn list_partners(&self) -> Result<Vec<Partner>> {
        self.read("list_partners", &self.partners)
    }

    async fn list_program_requests(&self) -> Result<Vec<TrainingProgramRequest>> {
        self.read("list_program_requests", &self.requests)
    }

    async fn submit_lecturer_review(
        &self,
        lecturer_id: LecturerId,
        batch: &LecturerReviewBatch,
    ) -> Result<()> {
        self.mutate(format!("submit_lecturer_review {lecturer_id}"))?;
        self.reviews
            .lock()
            .expect("reviews lock")
            .push((lecturer_id, batch.clone()));
        Ok(())
    }

    async fn create_program(&self, payload: &ProgramPayload) -> Result<TrainingProgram> {
        self.mutate("create_program".into())?;
        self.program_payloads
            .lock()
            .expect("payload lock")
            .push((None, payload.clone()));
        let mut created = program(100, &payload.title);
        created.price = payload.price;
        Ok(created)
    }

    async fn update_program(
        &self,
        program_id: ProgramId,
        payload: &ProgramPayload,
    ) -> Result<TrainingProgram> {
        self.mutate(format!("update_program {program_id}"))?;
        self.program_payloads
            .lock()
            .expect("payload lock")
            .push((Some(program_id), payload.clone()));
        let mut updated = program(program_id.0, &payload.title);
        updated.price = payload.price;
        Ok(updated)
    }

    async fn update_program_units(
        &self,
        program_id: ProgramId,
        units: &[TrainingProgramUnit],
    ) -> Result<()> {
        self.mutate(format!("update_program_units {program_id}"))?;
        self.saved_units
            .lock()
            .expect("units lock")
            .push((program_id, units.to_vec()));
        Ok(())
    }

    async fn update_partner(
        &self,
        partner_id: PartnerId,
        payload: &PartnerPayload,
    ) -> Result<Partner> {
        self.mutate(format!("update_partner {partner_id}"))?;
        self.partner_payloads
            .lock()
            .expect("payload lock")
            .push(payload.clone());
        Ok(partner(partner_id.0, &payload.name))
    }

    async fn create_program_request(
        &self,
        payload: &ProgramRequestPayload,
    ) -> Result<TrainingProgramRequest> {
        self.mutate("create_program_request".into())?;
        self.request_payloads
            .lock()
            .expect("payload lock")
            .push(payload.clone());
        Ok(TrainingProgramRequest {
            id: RequestId(7),
            partner_id: payload.partner_id.unwrap_or(PartnerId(1)),
            title: payload.title.clone(),
            description: payload.description.clone(),
            attachment_url: payload.attachment_url.clone(),
            status: ReviewStatus::Pending,
            note: None,
        })
    }

    async fn upload_file(
        &self,
        kind: UploadKind,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        self.mutate(format!("upload_file {}", kind.as_str()))?;
        self.uploads.lock().expect("uploads lock").push((
            kind,
            filename.to_string(),
            mime_type.to_string(),
            bytes.len(),
        ));
        Ok(format!("https://cdn.example.com/{}/{filename}", kind.as_str()))
    }
}
