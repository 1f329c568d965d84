use std::{path::Path, sync::Arc};

use anyhow::{Context as _, Result};
use client_core::{
    debounce::ProgramPicker,
    forms::{
        submit, FormState, PartnerForm, PartnerSave, ProgramForm, ProgramRequestForm,
        ProgramSave, RequestSave,
    },
    reorder::UnitList,
    search::{
        filter_records, format_price, sort_programs, ProgramSortKey, SearchFilter, SessionSearch,
        SortDirection,
    },
    FileSelection, HttpPortalClient, LecturerReview, ListKind, PortalApi, PortalEvent,
    PortalStore,
};
use shared::domain::{LecturerId, PartnerId, ProgramId, ProgramStatus, TrainingProgram, UnitId};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    config::Settings, LecturerCommand, PartnerCommand, ProgramCommand, ProgramFilterArgs,
    ProgramFormArgs, RequestCommand, SortArg,
};

pub struct Context {
    settings: Settings,
    store: Arc<PortalStore>,
}

impl Context {
    pub fn connect(settings: Settings) -> Result<Self> {
        let client = HttpPortalClient::with_options(&settings.api_url, settings.client_options())
            .with_context(|| format!("cannot use api url {}", settings.api_url))?;
        info!("portal-admin: using backend {}", client.base_url());
        Ok(Self {
            store: PortalStore::new(Arc::new(client)),
            settings,
        })
    }

    async fn drafts(&self) -> Result<Arc<Storage>> {
        let database_url = self.settings.draft_database_url();
        let storage = Storage::new(&database_url)
            .await
            .with_context(|| format!("failed to open draft cache {database_url}"))?;
        Ok(Arc::new(storage))
    }

    async fn program(&self, id: ProgramId) -> Result<TrainingProgram> {
        self.store.refresh(ListKind::Programs).await?;
        self.store
            .programs()
            .await
            .items()
            .iter()
            .find(|program| program.id == id)
            .cloned()
            .with_context(|| format!("program {id} not found"))
    }
}

/// Prints queued notices and errors the way a toast would show them.
fn report(events: &mut broadcast::Receiver<PortalEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            PortalEvent::Notice(message) => println!("{message}"),
            PortalEvent::Error(message) => eprintln!("error: {message}"),
            PortalEvent::ListRefreshed(_) => {}
        }
    }
}

fn print_programs(programs: &[&TrainingProgram]) {
    for program in programs {
        let price = match program.discounted_price {
            Some(discounted) => format!(
                "{} (was {})",
                format_price(discounted),
                format_price(program.price)
            ),
            None => format_price(program.price),
        };
        println!(
            "{:>6}  {:<9}  {:<28}  {}  [{}]",
            program.id.0,
            program.status.as_str(),
            price,
            program.title,
            program.tags.join(", ")
        );
    }
    if programs.is_empty() {
        println!("no programs match");
    }
}

fn program_filter(args: &ProgramFilterArgs) -> SearchFilter<ProgramStatus> {
    SearchFilter {
        query: args.query.clone().unwrap_or_default(),
        tags: args.tags.clone(),
        statuses: args.statuses.clone(),
    }
}

fn sort_key(sort: SortArg) -> ProgramSortKey {
    match sort {
        SortArg::Title => ProgramSortKey::Title,
        SortArg::Price => ProgramSortKey::Price,
        SortArg::StartDate => ProgramSortKey::StartDate,
        SortArg::Status => ProgramSortKey::Status,
    }
}

fn apply_sort(programs: &mut [&TrainingProgram], args: &ProgramFilterArgs) {
    if let Some(sort) = args.sort {
        let direction = if args.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        sort_programs(programs, sort_key(sort), direction);
    }
}

async fn load_programs(ctx: &Context, public: bool) -> Result<Vec<TrainingProgram>> {
    let kind = if public {
        ListKind::PublicPrograms
    } else {
        ListKind::Programs
    };
    ctx.store.refresh(kind).await?;
    let state = if public {
        ctx.store.public_programs().await
    } else {
        ctx.store.programs().await
    };
    Ok(state.items().to_vec())
}

async fn read_selection(path: &Path) -> Result<FileSelection> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(FileSelection::new(filename, bytes))
}

fn apply_fields<F: FormState>(form: &mut F, fields: &[(String, String)]) -> Result<()> {
    for (name, value) in fields {
        form.set_field(name, value)?;
    }
    Ok(())
}

async fn fill_program_form(
    ctx: &Context,
    form: &mut ProgramForm,
    args: &ProgramFormArgs,
) -> Result<()> {
    apply_fields(form, &args.fields)?;
    let uploader = ctx.store.as_ref();
    if let Some(path) = &args.banner {
        form.select_banner(read_selection(path).await?, uploader).await?;
    }
    if let Some(path) = &args.syllabus {
        form.select_syllabus(read_selection(path).await?, uploader).await?;
    }
    Ok(())
}

pub async fn programs(ctx: &Context, command: ProgramCommand) -> Result<()> {
    let mut events = ctx.store.subscribe_events();
    let outcome = run_program_command(ctx, command).await;
    report(&mut events);
    outcome
}

async fn run_program_command(ctx: &Context, command: ProgramCommand) -> Result<()> {
    match command {
        ProgramCommand::List { filter } => {
            let programs = load_programs(ctx, filter.public).await?;
            let mut found = filter_records(&programs, &program_filter(&filter));
            apply_sort(&mut found, &filter);
            print_programs(&found);
        }
        ProgramCommand::Search { filter } => {
            let programs = load_programs(ctx, filter.public).await?;
            let mut session: SessionSearch<ProgramId> = SessionSearch::new();
            let mut found = session.run(&programs, &program_filter(&filter));
            apply_sort(&mut found, &filter);
            print_programs(&found);
        }
        ProgramCommand::Pick { query } => {
            let programs = load_programs(ctx, false).await?;
            let picker = ProgramPicker::new(ctx.settings.search_debounce());
            if let Some(found) = picker.query(&programs, &query).await {
                print_programs(&found);
            }
        }
        ProgramCommand::Show { id } => {
            let program = ctx.store.api().get_public_program(ProgramId(id)).await?;
            println!("{}", serde_json::to_string_pretty(&program)?);
        }
        ProgramCommand::Create { form: args } => {
            let mut form = ProgramForm::new();
            fill_program_form(ctx, &mut form, &args).await?;
            let handler = ProgramSave {
                store: ctx.store.clone(),
                program_id: None,
            };
            submit(&form, &handler).await?;
        }
        ProgramCommand::Update { id, form: args } => {
            let existing = ctx.program(ProgramId(id)).await?;
            let mut form = ProgramForm::from_program(&existing);
            fill_program_form(ctx, &mut form, &args).await?;
            let handler = ProgramSave {
                store: ctx.store.clone(),
                program_id: Some(existing.id),
            };
            submit(&form, &handler).await?;
        }
        ProgramCommand::MoveUnit {
            program_id,
            from,
            to,
        } => {
            let program = ctx.program(ProgramId(program_id)).await?;
            let mut units = UnitList::new(program.id, &program.units);
            units.move_unit(UnitId(from), UnitId(to))?;
            if units.is_dirty() {
                units.save(&ctx.store).await?;
            }
            for unit in units.units() {
                let lead = if unit.is_lead { " (lead)" } else { "" };
                println!("{:>3}. {}{lead}", unit.order, unit.title);
            }
        }
        ProgramCommand::SetLead {
            program_id,
            unit_id,
            off,
        } => {
            let program = ctx.program(ProgramId(program_id)).await?;
            let mut units = UnitList::new(program.id, &program.units);
            units.set_lead(UnitId(unit_id), !off)?;
            units.save(&ctx.store).await?;
        }
    }
    Ok(())
}

pub async fn lecturers(ctx: &Context, command: LecturerCommand) -> Result<()> {
    let mut events = ctx.store.subscribe_events();
    let outcome = run_lecturer_command(ctx, command).await;
    report(&mut events);
    outcome
}

async fn open_review(ctx: &Context, id: i64) -> Result<LecturerReview> {
    let lecturer = ctx.store.api().get_lecturer(LecturerId(id)).await?;
    let drafts = ctx.drafts().await?;
    Ok(LecturerReview::open(&lecturer, drafts).await?)
}

fn print_review(review: &LecturerReview) {
    for target in review.targets() {
        let status = review
            .status_of(target)
            .map(|status| status.as_str())
            .unwrap_or("?");
        let note = review.note_of(target).unwrap_or_default();
        let target = target.to_string();
        if note.is_empty() {
            println!("{target:<18} {status}");
        } else {
            println!("{target:<18} {status}  {note}");
        }
    }
    let pending = review.pending_targets().len();
    if pending > 0 {
        println!("{pending} item(s) pending");
    }
}

async fn run_lecturer_command(ctx: &Context, command: LecturerCommand) -> Result<()> {
    match command {
        LecturerCommand::List { query, statuses } => {
            ctx.store.refresh(ListKind::Lecturers).await?;
            let lecturers = ctx.store.lecturers().await;
            let filter = SearchFilter {
                query: query.unwrap_or_default(),
                tags: Vec::new(),
                statuses,
            };
            for lecturer in filter_records(lecturers.items(), &filter) {
                println!(
                    "{:>6}  {:<9}  {}  <{}>  {} degree(s), {} certificate(s)",
                    lecturer.id.0,
                    lecturer.status.as_str(),
                    lecturer.full_name,
                    lecturer.email,
                    lecturer.degrees.len(),
                    lecturer.certificates.len()
                );
            }
        }
        LecturerCommand::Show { id } => {
            let review = open_review(ctx, id).await?;
            print_review(&review);
        }
        LecturerCommand::Approve { id, target, note } => {
            let mut review = open_review(ctx, id).await?;
            review.approve(target, &note).await?;
            print_review(&review);
        }
        LecturerCommand::Reject { id, target, note } => {
            let mut review = open_review(ctx, id).await?;
            review.reject(target, &note).await?;
            print_review(&review);
        }
        LecturerCommand::Reset { id, target } => {
            let mut review = open_review(ctx, id).await?;
            review.refresh(target).await?;
            print_review(&review);
        }
        LecturerCommand::Save { id, notify } => {
            let review = open_review(ctx, id).await?;
            review.save(&ctx.store, notify).await?;
        }
    }
    Ok(())
}

pub async fn partners(ctx: &Context, command: PartnerCommand) -> Result<()> {
    let mut events = ctx.store.subscribe_events();
    let outcome = async {
        match command {
            PartnerCommand::List { query } => {
                ctx.store.refresh(ListKind::Partners).await?;
                let partners = ctx.store.partners().await;
                let filter = SearchFilter::with_query(query.unwrap_or_default());
                for partner in filter_records(partners.items(), &filter) {
                    println!(
                        "{:>6}  {:<9}  {}  <{}>",
                        partner.id.0,
                        partner.status.as_str(),
                        partner.name,
                        partner.email
                    );
                }
            }
            PartnerCommand::Update { id, fields } => {
                ctx.store.refresh(ListKind::Partners).await?;
                let partner = ctx
                    .store
                    .partners()
                    .await
                    .items()
                    .iter()
                    .find(|partner| partner.id == PartnerId(id))
                    .cloned()
                    .with_context(|| format!("partner {id} not found"))?;
                let mut form = PartnerForm::from_partner(&partner);
                apply_fields(&mut form, &fields)?;
                let handler = PartnerSave {
                    store: ctx.store.clone(),
                    partner_id: partner.id,
                };
                submit(&form, &handler).await?;
            }
        }
        anyhow::Ok(())
    }
    .await;
    report(&mut events);
    outcome
}

pub async fn requests(ctx: &Context, command: RequestCommand) -> Result<()> {
    let mut events = ctx.store.subscribe_events();
    let outcome = async {
        match command {
            RequestCommand::List { query, statuses } => {
                ctx.store.refresh(ListKind::Requests).await?;
                let requests = ctx.store.requests().await;
                let filter = SearchFilter {
                    query: query.unwrap_or_default(),
                    tags: Vec::new(),
                    statuses,
                };
                for request in filter_records(requests.items(), &filter) {
                    let attachment = request.attachment_url.as_deref().unwrap_or("-");
                    println!(
                        "{:>6}  {:<9}  partner {:<5}  {}  {attachment}",
                        request.id.0,
                        request.status.as_str(),
                        request.partner_id.0,
                        request.title
                    );
                }
            }
            RequestCommand::Create { fields, attachment } => {
                let mut form = ProgramRequestForm::new();
                apply_fields(&mut form, &fields)?;
                if let Some(path) = attachment {
                    form.select_attachment(read_selection(&path).await?, ctx.store.as_ref())
                        .await?;
                }
                let handler = RequestSave {
                    store: ctx.store.clone(),
                };
                submit(&form, &handler).await?;
            }
        }
        anyhow::Ok(())
    }
    .await;
    report(&mut events);
    outcome
}
