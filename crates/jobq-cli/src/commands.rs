//! Command handlers. Each returns the text to print and whether the command
//! counts as failed (exit status 1).

use anyhow::{Context, Result, bail};
use chrono::Utc;
use jobq_core::app::{
    AppBuilder, EntrySelector, MutationOutcome, PendingBatch, QueueApp, RegisterOutcome,
};
use jobq_core::domain::{
    ExecParams, ExternalSubmission, NewEntry, QueueError, Status, StatusReport,
};
use jobq_core::impls::{
    PbsScriptRenderer, QstatSource, QsubSubmitter, TracingEventSink, parse_notification_email,
};
use jobq_core::ports::{EntryFilter, StatusSource};
use jobq_sqlite::SqliteEntryStore;
use tokio::io::AsyncReadExt;

use crate::cli::{AddArgs, AlterArgs, Command, ListArgs, ResetArgs, UpdateSource};
use crate::config::{PY_VENV_ENV, Settings};
use crate::confirm::Confirm;
use crate::output::{self, ListStyle, MutationLine, PathRewrite};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub text: String,
    pub failed: bool,
}

impl Report {
    fn ok(text: String) -> Self {
        Self {
            text,
            failed: false,
        }
    }
}

/// Everything a handler needs besides its own arguments.
pub struct Session<'a> {
    pub settings: Settings,
    pub json: bool,
    pub confirm: &'a mut dyn Confirm,
}

pub async fn open_app(settings: &Settings) -> Result<QueueApp> {
    let database = settings.database()?;
    let store = SqliteEntryStore::open(database)
        .await
        .with_context(|| format!("failed to open queue database {}", database.display()))?;
    AppBuilder::new()
        .store(store)
        .events(TracingEventSink)
        .renderer(PbsScriptRenderer)
        .submitter(QsubSubmitter::new(&settings.qsub_program))
        .dispatch_config(settings.dispatch.clone())
        .reconcile_config(settings.reconcile)
        .build()
        .context("invalid queue configuration")
}

pub async fn run(command: Command, mut ctx: Session<'_>) -> Result<Report> {
    if let Command::Submit { test_job: true, .. } = &command {
        ctx.settings.dispatch.test_job = true;
    }
    let app = open_app(&ctx.settings).await?;
    execute(&app, command, &mut ctx).await
}

pub async fn execute(app: &QueueApp, command: Command, ctx: &mut Session<'_>) -> Result<Report> {
    match command {
        Command::Add(args) => add(app, args, ctx).await,
        Command::List(args) => list(app, args, ctx.json).await,
        Command::Summary { input_filepath } => {
            let counts = app.summarize(input_filepath.as_deref()).await?;
            let text = if ctx.json {
                output::to_json(&counts)?
            } else {
                output::render_counts(&counts)
            };
            Ok(Report::ok(text))
        }
        Command::Script {
            input_filepath,
            test_job,
        } => {
            let script = app
                .script_for(&EntrySelector::PathEquals(input_filepath), test_job)
                .await?;
            Ok(Report::ok(script))
        }
        Command::Hold { input_filepath } => {
            let selector = EntrySelector::PathContains(input_filepath);
            let batch = app.hold(&selector).await?;
            confirm_and_apply(app, &selector, batch, ctx).await
        }
        Command::Unhold { input_filepath } => {
            let selector = EntrySelector::PathContains(input_filepath);
            let batch = app.unhold(&selector).await?;
            confirm_and_apply(app, &selector, batch, ctx).await
        }
        Command::Reset(args) => reset(app, args, ctx).await,
        Command::Alter(args) => alter(app, args, ctx.json).await,
        Command::Submit { number, .. } => {
            let outcomes = app.dispatch(number).await?;
            let text = if ctx.json {
                output::to_json(&outcomes)?
            } else {
                output::render_dispatch(&outcomes)
            };
            Ok(Report {
                text,
                failed: outcomes.iter().any(|o| o.is_failure()),
            })
        }
        Command::Update(source) => {
            let reports = match source {
                UpdateSource::Qstat => qstat_reports(app, &ctx.settings).await?,
                UpdateSource::Email => vec![email_report().await?],
            };
            let outcomes = app.reconcile(reports).await?;
            let text = if ctx.json {
                output::to_json(&outcomes)?
            } else {
                output::render_reconcile(&outcomes)
            };
            Ok(Report {
                text,
                failed: outcomes.iter().any(|o| o.is_failure()),
            })
        }
    }
}

async fn add(app: &QueueApp, args: AddArgs, ctx: &Session<'_>) -> Result<Report> {
    let Some(py_venv) = args.params.py_venv.clone().or_else(|| ctx.settings.py_venv.clone())
    else {
        bail!("no Python virtual env given: pass --py-venv or set {PY_VENV_ENV}");
    };
    let base = ExecParams::new(py_venv, args.output_directory.clone());
    let params = args.params.patch(None).apply_to(&base)?;
    let mut request = NewEntry::new(args.input_filepath, params);
    if let Some(submission) = ExternalSubmission::from_parts(args.submitted, args.job_id)? {
        request = request.submitted_externally(submission);
    }

    let outcome = app.register(request, args.force).await?;
    if ctx.json {
        return Ok(Report::ok(output::to_json(&outcome)?));
    }
    let text = match &outcome {
        RegisterOutcome::Added(entry) => format!("added {} ({})\n", entry.input_path, entry.id),
        RegisterOutcome::Skipped { existing } => format!(
            "{} is already in the queue ({}, {}); use --force to add it again\n",
            existing.input_path, existing.id, existing.status
        ),
    };
    Ok(Report::ok(text))
}

async fn list(app: &QueueApp, args: ListArgs, json: bool) -> Result<Report> {
    let mut filter = EntryFilter::all();
    if let Some(path) = args.input_filepath {
        filter = filter.path_contains(path);
    }
    if let Some(job_id) = args.job_id {
        filter = filter.job_id_contains(job_id);
    }
    if let Some(status) = args.status {
        filter = filter.status(status);
    }
    let entries = app.list(&filter).await?;
    if json {
        return Ok(Report::ok(output::to_json(&entries)?));
    }

    let rewrite = match args.filepath_replace.as_deref() {
        Some([search, replace]) => Some(PathRewrite::new(search, replace)?),
        Some(_) => bail!("--filepath-replace takes a search pattern and a replacement"),
        None => None,
    };
    let style = if args.compact {
        ListStyle::Compact
    } else if args.full {
        ListStyle::Full
    } else {
        ListStyle::Table
    };
    Ok(Report::ok(output::render_entries(
        &entries,
        style,
        rewrite.as_ref(),
    )))
}

async fn reset(app: &QueueApp, args: ResetArgs, ctx: &mut Session<'_>) -> Result<Report> {
    let selector = EntrySelector::PathEquals(args.input_filepath);
    let batch = app.reset(&selector, args.status).await?;
    if batch.len() > 1 && !args.all {
        return Err(QueueError::AmbiguousMatch {
            selector: selector.to_string(),
            count: batch.len(),
        }
        .into());
    }
    confirm_and_apply(app, &selector, batch, ctx).await
}

async fn alter(app: &QueueApp, args: AlterArgs, json: bool) -> Result<Report> {
    let selector = EntrySelector::PathContains(args.input_filepath);
    let patch = args.params.patch(args.output_directory);
    let outcomes = app.alter_params(&selector, patch).await?;
    if outcomes.is_empty() {
        return Err(QueueError::NotFound(format!("NEW or HOLD entry with {selector}")).into());
    }
    mutation_report(&outcomes, json)
}

/// Ask about each pending mutation and apply the confirmed ones.
async fn confirm_and_apply(
    app: &QueueApp,
    selector: &EntrySelector,
    batch: PendingBatch,
    ctx: &mut Session<'_>,
) -> Result<Report> {
    if batch.len() == 0 {
        return Err(QueueError::NotFound(selector.to_string()).into());
    }

    let mut outcomes = Vec::with_capacity(batch.len());
    for pending in batch {
        let entry = pending.entry().clone();
        let change = pending.change().clone();
        // entries the change cannot apply to are reported without asking
        let preview = match pending.preview() {
            Ok(preview) => preview,
            Err(error) => {
                outcomes.push(MutationOutcome {
                    entry_id: entry.id,
                    input_path: entry.input_path,
                    change,
                    result: Err(error),
                });
                continue;
            }
        };
        let question = format!(
            "{} {} ({} -> {})?",
            change.describe(),
            entry.input_path,
            entry.status,
            preview.status
        );
        if !ctx.confirm.confirm(&question)? {
            tracing::info!(input_path = %entry.input_path, "declined; left unchanged");
            continue;
        }
        let result = app.apply(pending).await;
        outcomes.push(MutationOutcome {
            entry_id: entry.id,
            input_path: entry.input_path,
            change,
            result,
        });
    }
    mutation_report(&outcomes, ctx.json)
}

fn mutation_report(outcomes: &[MutationOutcome], json: bool) -> Result<Report> {
    let lines: Vec<MutationLine> = outcomes.iter().map(MutationLine::from).collect();
    let text = if json {
        output::to_json(&lines)?
    } else {
        output::render_mutations(&lines)
    };
    Ok(Report {
        text,
        failed: outcomes.iter().any(MutationOutcome::is_failure),
    })
}

async fn qstat_reports(app: &QueueApp, settings: &Settings) -> Result<Vec<StatusReport>> {
    let in_flight = app
        .list(&EntryFilter::all().statuses([Status::Submitted, Status::Running]))
        .await?;
    let mut job_ids: Vec<String> = in_flight
        .into_iter()
        .filter_map(|e| e.external_job_id)
        .collect();
    job_ids.sort();
    job_ids.dedup();
    if job_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(QstatSource::new(&settings.qstat_program)
        .fetch(&job_ids)
        .await?)
}

async fn email_report() -> Result<StatusReport> {
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("failed to read email from stdin")?;
    Ok(parse_notification_email(&text, Utc::now())?)
}
