pub mod app;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tabkeeper")]
#[command(about = "Shared expenses, events and counters kept in a partitioned JSON store")]
pub struct Cli {
    /// Directory holding one JSON file per partition
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Seconds between autosave passes
    #[arg(long, default_value_t = 30)]
    pub flush_interval: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Expense {
        #[command(subcommand)]
        action: ExpenseCommand,
    },
    Beneficiary {
        #[command(subcommand)]
        action: BeneficiaryCommand,
    },
    /// Turn all unsettled expenses into debts
    Settle,
    /// Unpaid debts, optionally only those involving one user
    Debts {
        #[arg(long)]
        user: Option<u64>,
    },
    /// Mark a debt paid; only its creditor may do this
    Pay {
        #[arg(long)]
        debt: u64,
        #[arg(long = "as")]
        caller: u64,
    },
    Counter {
        #[command(subcommand)]
        action: CounterCommand,
    },
    Event {
        #[command(subcommand)]
        action: EventCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExpenseCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        payer: u64,
        /// Beneficiaries besides the payer
        #[arg(long = "with", num_args = 0..)]
        beneficiaries: Vec<u64>,
    },
    List {
        #[arg(long)]
        unsettled: bool,
    },
    Rename {
        id: u64,
        name: String,
    },
    Amount {
        id: u64,
        amount: f64,
    },
    Rm {
        id: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum BeneficiaryCommand {
    Add { expense: u64, user: u64 },
    Rm { expense: u64, user: u64 },
}

#[derive(Subcommand, Debug)]
pub enum CounterCommand {
    Incr {
        name: String,
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        by: i64,
    },
    Get {
        name: String,
    },
    Reset {
        name: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    Add {
        title: String,
        /// Start time, RFC 3339 (e.g. 2026-11-02T19:00:00Z)
        #[arg(long)]
        at: DateTime<Utc>,
        #[arg(long)]
        organizer: u64,
    },
    Join {
        id: u64,
        user: u64,
    },
    Leave {
        id: u64,
        user: u64,
    },
    Cancel {
        id: u64,
        #[arg(long = "as")]
        caller: u64,
    },
    List,
}
