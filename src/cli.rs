use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::model::BusinessMode;

#[derive(Parser, Debug)]
#[command(
    name = "spoolgen",
    version,
    about = "Invoice-to-spool interchange record tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract header fields and line items from invoice documents
    Extract(ExtractArgs),
    /// Run integrity validation against invoice documents
    Check(CheckArgs),
    /// Reconcile invoices against a delivery schedule and write spool files
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long = "invoice", required = true)]
    pub invoices: Vec<PathBuf>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    #[arg(long = "invoice", required = true)]
    pub invoices: Vec<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(long = "invoice", required = true)]
    pub invoices: Vec<PathBuf>,

    #[arg(long)]
    pub schedule: PathBuf,

    #[arg(long, value_enum)]
    pub mode: BusinessMode,

    /// DD-MM-YYYY; selects the date-labelled schedule sheet (defaults to today)
    #[arg(long)]
    pub dispatch_date: Option<String>,

    #[arg(long, default_value = "spool-output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long)]
    pub vendor_code: Option<String>,

    #[arg(long)]
    pub challan_no: Option<String>,

    #[arg(long)]
    pub challan_date: Option<String>,

    #[arg(long)]
    pub po_number: Option<String>,
}
