use std::sync::Mutex;

use super::*;
use crate::test_support::{partner, program, RecordingApi};

#[derive(Default)]
struct CapturingHandler<P> {
    saved: Mutex<Vec<P>>,
}

#[async_trait]
impl<P: Send + 'static> SaveHandler<P> for CapturingHandler<P> {
    async fn save(&self, payload: P) -> anyhow::Result<()> {
        self.saved.lock().expect("lock").push(payload);
        Ok(())
    }
}

fn filled_program_form() -> ProgramForm {
    let mut form = ProgramForm::new();
    for (name, value) in [
        ("title", "Python Bootcamp 2024"),
        ("description", "Twelve weeks of Python"),
        ("tags", "python, backend, Python, "),
        ("price", "2.000.000"),
        ("startDate", "2024-03-01"),
        ("endDate", "2024-05-31"),
    ] {
        form.set_field(name, value).expect(name);
    }
    form
}

#[test]
fn program_fields_are_parsed_on_input() {
    let mut form = filled_program_form();
    form.set_field("discountedPrice", "1,500,000 ₫")
        .expect("discount");
    form.set_field("status", "published").expect("status");

    assert_eq!(form.price, Some(2_000_000));
    assert_eq!(form.discounted_price, Some(1_500_000));
    assert_eq!(form.status, Some(ProgramStatus::Published));
    assert_eq!(form.tags, vec!["python", "backend"]);
    assert_eq!(form.field_value("startDate").as_deref(), Some("2024-03-01"));
}

#[test]
fn unknown_field_and_bad_values_are_rejected() {
    let mut form = ProgramForm::new();
    assert!(matches!(
        form.set_field("colour", "red"),
        Err(FormError::UnknownField(name)) if name == "colour"
    ));
    assert!(matches!(
        form.set_field("price", "two million"),
        Err(FormError::InvalidValue { field: "price", .. })
    ));
    assert!(matches!(
        form.set_field("startDate", "01/03/2024"),
        Err(FormError::InvalidValue { field: "startDate", .. })
    ));
    assert!(matches!(
        form.set_field("status", "DRAFT"),
        Err(FormError::InvalidValue { field: "status", .. })
    ));
}

#[test]
fn validation_lists_every_missing_field() {
    let mut form = ProgramForm::new();
    form.set_field("title", "  ").expect("title");
    form.set_field("price", "100").expect("price");

    match form.validate() {
        Err(FormError::MissingFields(missing)) => {
            assert_eq!(missing, vec!["title", "description", "startDate", "endDate"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn program_cross_field_rules() {
    let mut form = filled_program_form();
    form.set_field("endDate", "2024-02-01").expect("end");
    assert!(matches!(form.validate(), Err(FormError::Invalid(msg)) if msg.contains("end date")));

    let mut form = filled_program_form();
    form.set_field("discountedPrice", "3.000.000").expect("discount");
    assert!(matches!(form.validate(), Err(FormError::Invalid(msg)) if msg.contains("discounted")));

    let mut form = filled_program_form();
    form.set_field("price", "-1").expect("price");
    assert!(matches!(form.validate(), Err(FormError::Invalid(msg)) if msg.contains("negative")));

    assert!(filled_program_form().validate().is_ok());
}

#[tokio::test]
async fn submit_skips_handler_when_invalid() {
    let handler = CapturingHandler::<ProgramPayload>::default();
    let form = ProgramForm::new();

    let err = submit(&form, &handler).await.expect_err("invalid");
    assert!(matches!(err, FormError::MissingFields(_)));
    assert!(handler.saved.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn submit_passes_trimmed_payload() {
    let handler = CapturingHandler::<ProgramPayload>::default();
    let mut form = filled_program_form();
    form.set_field("subtitle", "  from zero  ").expect("subtitle");

    submit(&form, &handler).await.expect("submit");

    let saved = handler.saved.lock().expect("lock").clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].subtitle, "from zero");
    assert_eq!(saved[0].price, 2_000_000);
    assert_eq!(saved[0].start_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(saved[0].banner_url, None);
}

#[tokio::test]
async fn banner_upload_stores_only_the_url() {
    let api = RecordingApi::default();
    let mut form = filled_program_form();

    form.select_banner(FileSelection::new("cover.png", vec![1, 2, 3]), &api)
        .await
        .expect("upload");

    assert_eq!(
        form.banner().url(),
        Some("https://cdn.example.com/banner/cover.png")
    );
    let payload = form.payload().expect("payload");
    assert_eq!(
        payload.banner_url.as_deref(),
        Some("https://cdn.example.com/banner/cover.png")
    );
}

#[tokio::test]
async fn failed_syllabus_upload_clears_previous_url() {
    let api = RecordingApi::default();
    let mut existing = program(4, "Rust");
    existing.syllabus_url = Some("https://cdn.example.com/syllabus/old.pdf".into());
    let mut form = ProgramForm::from_program(&existing);
    api.fail_mutations(true);

    let err = form
        .select_syllabus(FileSelection::new("new.pdf", vec![0; 16]), &api)
        .await
        .expect_err("upload fails");

    assert!(matches!(err, UploadError::Failed(_)));
    assert_eq!(form.syllabus().url(), None);
    assert_eq!(form.syllabus().selected_filename(), None);
    assert_eq!(form.payload().expect("payload").syllabus_url, None);
}

#[tokio::test]
async fn program_save_creates_then_refreshes() {
    let api = Arc::new(RecordingApi::default());
    let store = PortalStore::new(api.clone());
    let mut events = store.subscribe_events();
    let handler = ProgramSave {
        store: store.clone(),
        program_id: None,
    };

    submit(&filled_program_form(), &handler)
        .await
        .expect("submit");

    assert_eq!(api.calls(), vec!["create_program", "list_programs"]);
    assert_eq!(
        events.recv().await.expect("event"),
        crate::store::PortalEvent::ListRefreshed(ListKind::Programs)
    );
    assert_eq!(
        events.recv().await.expect("event"),
        crate::store::PortalEvent::Notice("program 100 saved".into())
    );
}

#[tokio::test]
async fn program_save_updates_existing_program() {
    let api = Arc::new(RecordingApi::default());
    let store = PortalStore::new(api.clone());
    let handler = ProgramSave {
        store,
        program_id: Some(ProgramId(4)),
    };
    let mut form = ProgramForm::from_program(&program(4, "Rust"));
    form.set_field("startDate", "2024-01-01").expect("start");
    form.set_field("endDate", "2024-02-01").expect("end");

    submit(&form, &handler).await.expect("submit");

    let payloads = api.program_payloads.lock().expect("lock").clone();
    assert_eq!(payloads[0].0, Some(ProgramId(4)));
    assert_eq!(payloads[0].1.status, Some(ProgramStatus::Published));
}

#[tokio::test]
async fn invalid_program_is_reported_without_calls() {
    let api = Arc::new(RecordingApi::default());
    let store = PortalStore::new(api.clone());
    let mut events = store.subscribe_events();
    let handler = ProgramSave {
        store: store.clone(),
        program_id: None,
    };
    let mut form = filled_program_form();
    form.set_field("title", "  ").expect("title");

    let err = submit(&form, &handler).await.expect_err("missing title");

    assert!(matches!(err, FormError::MissingFields(ref fields) if fields == &vec!["title"]));
    assert!(api.calls().is_empty());
    assert_eq!(
        events.recv().await.expect("event"),
        crate::store::PortalEvent::Error("missing required fields: title".into())
    );
}

#[tokio::test]
async fn failed_save_surfaces_error() {
    let api = Arc::new(RecordingApi::default());
    api.fail_mutations(true);
    let store = PortalStore::new(api.clone());
    let handler = ProgramSave {
        store,
        program_id: None,
    };

    let err = submit(&filled_program_form(), &handler)
        .await
        .expect_err("backend rejects");
    assert!(matches!(err, FormError::Save(_)));
    assert_eq!(api.calls(), vec!["create_program"]);
}

#[test]
fn partner_form_checks_email() {
    let mut form = PartnerForm::from_partner(&partner(2, "FPT Software"));
    assert!(form.validate().is_ok());

    form.set_field("email", "not-an-email").expect("email");
    assert!(matches!(
        form.validate(),
        Err(FormError::InvalidValue { field: "email", .. })
    ));

    form.set_field("phone", "").expect("phone");
    assert!(matches!(
        form.validate(),
        Err(FormError::MissingFields(missing)) if missing == vec!["phone"]
    ));
}

#[tokio::test]
async fn partner_save_updates_and_refreshes() {
    let api = Arc::new(RecordingApi::default());
    let store = PortalStore::new(api.clone());
    let handler = PartnerSave {
        store,
        partner_id: PartnerId(2),
    };
    let mut form = PartnerForm::from_partner(&partner(2, "FPT"));
    form.set_field("logoUrl", " ").expect("logo");
    form.set_field("website", "https://fpt.vn").expect("website");

    submit(&form, &handler).await.expect("submit");

    assert_eq!(api.calls(), vec!["update_partner 2", "list_partners"]);
    let payloads = api.partner_payloads.lock().expect("lock").clone();
    assert_eq!(payloads[0].website, "https://fpt.vn");
    assert_eq!(payloads[0].logo_url, None);
}

#[tokio::test]
async fn request_form_submits_with_attachment() {
    let api = Arc::new(RecordingApi::default());
    let store = PortalStore::new(api.clone());
    let mut form = ProgramRequestForm::new();
    form.set_field("partnerId", "3").expect("partner");
    form.set_field("title", "Kubernetes for ops").expect("title");
    form.set_field("description", "Two-day workshop")
        .expect("description");
    form.select_attachment(
        FileSelection::new("outline.docx", b"PK".to_vec()),
        api.as_ref(),
    )
    .await
    .expect("attach");

    submit(&form, &RequestSave { store })
        .await
        .expect("submit");

    let payloads = api.request_payloads.lock().expect("lock").clone();
    assert_eq!(payloads[0].partner_id, Some(PartnerId(3)));
    assert_eq!(
        payloads[0].attachment_url.as_deref(),
        Some("https://cdn.example.com/attachment/outline.docx")
    );
    assert_eq!(
        api.calls(),
        vec![
            "upload_file attachment",
            "create_program_request",
            "list_program_requests"
        ]
    );
}

#[test]
fn request_form_rejects_bad_partner_id() {
    let mut form = ProgramRequestForm::new();
    assert!(matches!(
        form.set_field("partnerId", "abc"),
        Err(FormError::InvalidValue { field: "partnerId", .. })
    ));
    form.set_field("partnerId", "").expect("clear");
    assert_eq!(form.partner_id, None);
}
