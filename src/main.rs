use chrono::Utc;
use clap::Parser;
use mining_erp::config::{
    ApprovalCommand, Command, DeviceCommand, IncidentArgs, IncidentCommand, LinkCommand,
    OutboxCommand, ReceiptCommand, RequisitionCommand,
};
use mining_erp::core::csv_io;
use mining_erp::core::deep_link;
use mining_erp::core::incident_queue::IncidentSubmission;
use mining_erp::core::receipt_queue::ReceiptSubmission;
use mining_erp::core::simulation;
use mining_erp::domain::model::{IncidentDraft, LocalAttachment, QueueItem};
use mining_erp::domain::policy::Capabilities;
use mining_erp::domain::requisition::{NewRequisition, RequisitionItem};
use mining_erp::utils::error::ErrorSeverity;
use mining_erp::utils::logger;
use mining_erp::{AppConfig, AppContext, CliConfig, ErpError, FlushReport, Result};
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    match &cli.command {
        Command::Watch { json_logs: true } => logger::init_json_logger(),
        _ => logger::init_cli_logger(cli.verbose),
    }
    tracing::debug!("config file: {}", cli.config);

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn load_config(path: &str) -> Result<AppConfig> {
    if Path::new(path).exists() {
        tracing::info!("📁 Loading configuration from: {}", path);
        AppConfig::from_file(path)
    } else {
        tracing::info!("No config file at {}, using defaults", path);
        Ok(AppConfig::default())
    }
}

async fn run(cli: CliConfig) -> Result<()> {
    // commands that need neither config nor network
    match &cli.command {
        Command::Link(LinkCommand::Resolve { link }) => {
            match deep_link::resolve(link) {
                Some(screen) => println!("{}", serde_json::to_string_pretty(&screen)?),
                None => {
                    println!("No screen for {}", link);
                    println!("Known routes: {}", deep_link::ROUTES.join(", "));
                }
            }
            return Ok(());
        }
        Command::Capabilities { role } => {
            let caps = Capabilities::for_role(*role);
            println!("{}", serde_json::to_string_pretty(&caps)?);
            return Ok(());
        }
        Command::Requisition(RequisitionCommand::Simulate {
            title,
            items,
            reject_at,
        }) => {
            let config = load_config(&cli.config)?;
            return simulate(&config, title, items.as_deref(), *reject_at).await;
        }
        _ => {}
    }

    let config = load_config(&cli.config)?;
    let mut ctx = AppContext::init(config).await?;

    match cli.command {
        Command::Login { email, password } => {
            let response = ctx.api().client().login(&email, &password).await?;
            println!(
                "✅ Signed in as {} ({})",
                response.user.email, response.user.role
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&Capabilities::for_role(response.user.role))?
            );
        }
        Command::Logout => {
            ctx.api().client().logout().await?;
            println!("Signed out");
        }
        Command::Incident(IncidentCommand::Report(args)) => report_incident(&ctx, args).await?,
        Command::Receipt(ReceiptCommand::Attach { expense_id, file }) => {
            let submission = ReceiptSubmission::new(expense_id, LocalAttachment::from_path(file))?;
            let item = ctx.receipts().enqueue(submission).await?;
            println!("📥 Receipt queued as {}", item.id);
            print_flush("receipts", &ctx.receipts().flush(false).await?);
        }
        Command::Outbox(command) => outbox(&ctx, command).await?,
        Command::Requisition(command) => requisition(&ctx, command).await?,
        Command::Approvals(ApprovalCommand::Pending) => {
            let approvals = ctx.actionable_approvals().await?;
            if approvals.is_empty() {
                println!("Nothing waiting for your decision");
            }
            for a in approvals {
                println!(
                    "{}  {:?}  {}  requested by {}",
                    a.id, a.kind, a.title, a.requested_by
                );
            }
        }
        Command::Approvals(ApprovalCommand::Decide {
            id,
            decision,
            comment,
        }) => {
            let approval = ctx.decide_approval(&id, decision, comment).await?;
            println!("✅ {} is now {:?}", approval.id, approval.status);
        }
        Command::Device(DeviceCommand::Register { push_token }) => {
            let registration = ctx.register_device(&push_token).await?;
            println!(
                "✅ Registered {} ({:?})",
                registration.device_id, registration.platform
            );
        }
        Command::Watch { .. } => {
            ctx.start_worker();
            println!("Outbox worker running, press Ctrl+C to stop");
            tokio::signal::ctrl_c().await?;
            tracing::info!("interrupt received");
        }
        Command::Link(_) | Command::Capabilities { .. } => {}
    }

    ctx.shutdown().await;
    Ok(())
}

async fn report_incident(ctx: &AppContext, args: IncidentArgs) -> Result<()> {
    let draft = IncidentDraft {
        incident_type: args.incident_type,
        location: args.location,
        description: args.description,
        severity: args.severity,
        occurred_at: Utc::now(),
    };
    let photos = args.photos.into_iter().map(LocalAttachment::from_path).collect();
    let submission = IncidentSubmission::new(draft, photos)?;

    let item = ctx.incidents().enqueue(submission).await?;
    println!("📥 Incident queued as {}", item.id);
    print_flush("incidents", &ctx.incidents().flush(false).await?);
    Ok(())
}

async fn outbox(ctx: &AppContext, command: OutboxCommand) -> Result<()> {
    match command {
        OutboxCommand::List => {
            print_items("incidents", &ctx.incidents().items().await);
            print_items("receipts", &ctx.receipts().items().await);
        }
        OutboxCommand::Flush { force } => {
            for (label, report) in ctx.flush_outbox(force).await? {
                print_flush(label, &report);
            }
        }
        OutboxCommand::Retry { id } => {
            let report = match ctx.incidents().retry_item(&id).await? {
                Some(report) => report,
                None => ctx
                    .receipts()
                    .retry_item(&id)
                    .await?
                    .ok_or_else(|| ErpError::not_found("queue item", &id))?,
            };
            print_flush("outbox", &report);
        }
        OutboxCommand::Remove { id } => {
            let removed = ctx.incidents().remove_item(&id).await?
                || ctx.receipts().remove_item(&id).await?;
            if !removed {
                return Err(ErpError::not_found("queue item", &id));
            }
            println!("🗑️  Removed {}", id);
        }
    }
    Ok(())
}

async fn requisition(ctx: &AppContext, command: RequisitionCommand) -> Result<()> {
    let api = ctx.api();
    match command {
        RequisitionCommand::Create {
            title,
            department,
            items,
            submit,
        } => {
            let items = match items {
                Some(path) => csv_io::import_requisition_items(std::fs::File::open(&path)?)?,
                None => Vec::new(),
            };
            let mut requisition = api
                .create_requisition(&NewRequisition {
                    title,
                    department,
                    items,
                })
                .await?;
            if submit {
                requisition = api.submit_requisition(&requisition.id).await?;
            }
            println!(
                "✅ Requisition {} is {} ({} items, total {:.2})",
                requisition.id,
                requisition.status,
                requisition.items.len(),
                requisition.total_amount()
            );
        }
        RequisitionCommand::Export { output } => {
            let requisitions = api.list_requisitions().await?;
            let csv = csv_io::export_requisitions(&requisitions)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    println!("📁 {} requisitions written to {}", requisitions.len(), path);
                }
                None => print!("{}", csv),
            }
        }
        RequisitionCommand::Approve { id, comment } => {
            let r = api.approve_requisition(&id, comment.as_deref()).await?;
            println!("✅ {} is {}", r.id, r.status);
        }
        RequisitionCommand::Reject { id, reason } => {
            let r = api.reject_requisition(&id, &reason).await?;
            println!("✅ {} is {}", r.id, r.status);
        }
        RequisitionCommand::Cancel { id } => {
            let r = api.cancel_requisition(&id).await?;
            println!("✅ {} is {}", r.id, r.status);
        }
        RequisitionCommand::Simulate { .. } => {}
    }
    Ok(())
}

async fn simulate(
    config: &AppConfig,
    title: &str,
    items: Option<&str>,
    reject_at: Option<u32>,
) -> Result<()> {
    let items = match items {
        Some(path) => csv_io::import_requisition_items(std::fs::File::open(path)?)?,
        None => vec![RequisitionItem::new("Sample item", 1, 100.0)],
    };
    let new = NewRequisition {
        title: title.to_string(),
        department: "Simulation".to_string(),
        items,
    };

    let run = simulation::simulate_requisition(config.workflow_policy()?, new, reject_at).await?;
    for entry in &run.audit {
        println!(
            "{:<14} {:<22} {} -> {}",
            entry.action,
            entry.actor_id,
            entry.from_status.as_deref().unwrap_or("-"),
            entry.to_status
        );
    }
    println!(
        "✅ Finished as {} after {} decision(s)",
        run.requisition.status,
        run.requisition.decisions.len()
    );
    Ok(())
}

fn print_items<P>(label: &str, items: &[QueueItem<P>]) {
    let now = Utc::now();
    println!("{} ({})", label, items.len());
    for item in items {
        let stale = if item.is_stale(now, chrono::Duration::hours(24)) {
            "  [older than 24h]"
        } else {
            ""
        };
        let error = item
            .last_error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or("-");
        println!(
            "  {}  {:?}  attempts={}  next={}  error={}{}",
            item.id,
            item.status,
            item.attempts,
            item.next_attempt_at.to_rfc3339(),
            error,
            stale
        );
    }
}

fn print_flush(label: &str, report: &FlushReport) {
    if report.already_running {
        println!("{}: flush already in progress", label);
    } else if report.offline {
        println!("{}: offline, kept for later", label);
    } else {
        println!(
            "{}: {} delivered, {} failed, {} waiting",
            label, report.delivered, report.failed, report.not_due
        );
    }
}
