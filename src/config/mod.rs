pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::*;

#[cfg(feature = "cli")]
mod cli {
    use crate::domain::approval::Decision;
    use crate::domain::model::{IncidentSeverity, IncidentType};
    use crate::domain::policy::Role;
    use clap::{Args, Parser, Subcommand};

    #[derive(Debug, Parser)]
    #[command(name = "mining-erp")]
    #[command(about = "Field client for the mining ERP: offline outbox, workflows and device setup")]
    pub struct CliConfig {
        /// Path to TOML configuration file
        #[arg(short, long, default_value = "mining-erp.toml")]
        pub config: String,

        /// Enable verbose output
        #[arg(short, long, global = true)]
        pub verbose: bool,

        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(Debug, Subcommand)]
    pub enum Command {
        /// Sign in and store the session token
        Login {
            email: String,
            #[arg(long)]
            password: String,
        },
        /// Forget the stored session token
        Logout,
        #[command(subcommand)]
        Incident(IncidentCommand),
        #[command(subcommand)]
        Receipt(ReceiptCommand),
        #[command(subcommand)]
        Outbox(OutboxCommand),
        #[command(subcommand)]
        Requisition(RequisitionCommand),
        #[command(subcommand)]
        Approvals(ApprovalCommand),
        #[command(subcommand)]
        Device(DeviceCommand),
        #[command(subcommand)]
        Link(LinkCommand),
        /// Print what a role may do
        Capabilities { role: Role },
        /// Run the outbox worker until interrupted
        Watch {
            /// Emit logs as JSON lines
            #[arg(long)]
            json_logs: bool,
        },
    }

    #[derive(Debug, Subcommand)]
    pub enum IncidentCommand {
        /// Queue a safety incident report for delivery
        Report(IncidentArgs),
    }

    #[derive(Debug, Args)]
    pub struct IncidentArgs {
        #[arg(long = "type", value_enum)]
        pub incident_type: IncidentType,
        #[arg(long)]
        pub location: String,
        #[arg(long)]
        pub description: String,
        #[arg(long, value_enum, default_value = "medium")]
        pub severity: IncidentSeverity,
        /// Photo files to attach
        #[arg(long = "photo")]
        pub photos: Vec<String>,
    }

    #[derive(Debug, Subcommand)]
    pub enum ReceiptCommand {
        /// Queue a receipt upload for an expense
        Attach { expense_id: String, file: String },
    }

    #[derive(Debug, Subcommand)]
    pub enum OutboxCommand {
        /// Show queued submissions
        List,
        /// Deliver queued submissions now
        Flush {
            /// Ignore retry back-off
            #[arg(long)]
            force: bool,
        },
        /// Retry one submission immediately
        Retry { id: String },
        /// Drop one submission without delivering it
        Remove { id: String },
    }

    #[derive(Debug, Subcommand)]
    pub enum RequisitionCommand {
        /// Create a requisition with line items read from CSV
        Create {
            #[arg(long)]
            title: String,
            #[arg(long)]
            department: String,
            /// CSV with description,quantity,unit_price
            #[arg(long)]
            items: Option<String>,
            /// Submit for approval right away
            #[arg(long)]
            submit: bool,
        },
        /// Write all requisitions as CSV
        Export {
            #[arg(short, long)]
            output: Option<String>,
        },
        Approve {
            id: String,
            #[arg(long)]
            comment: Option<String>,
        },
        Reject {
            id: String,
            #[arg(long)]
            reason: String,
        },
        Cancel { id: String },
        /// Dry-run the configured approval chain locally, without the backend
        Simulate {
            #[arg(long, default_value = "Workflow check")]
            title: String,
            /// CSV with description,quantity,unit_price
            #[arg(long)]
            items: Option<String>,
            /// Reject at this 0-based stage instead of approving
            #[arg(long)]
            reject_at: Option<u32>,
        },
    }

    #[derive(Debug, Subcommand)]
    pub enum ApprovalCommand {
        /// List approvals waiting for a decision
        Pending,
        Decide {
            id: String,
            #[arg(long, value_parser = parse_decision)]
            decision: Decision,
            #[arg(long)]
            comment: Option<String>,
        },
    }

    #[derive(Debug, Subcommand)]
    pub enum DeviceCommand {
        /// Register this device for push notifications
        Register { push_token: String },
    }

    #[derive(Debug, Subcommand)]
    pub enum LinkCommand {
        /// Show which screen a miningerp:// link opens
        Resolve { link: String },
    }

    fn parse_decision(s: &str) -> Result<Decision, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(format!("expected approve or reject, got '{}'", other)),
        }
    }

}
