use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use commission_core::{
    load_settings, CommissionSession, ExistingChoice, HttpCommissionBackend,
    LocaleCurrencyFormatter, MatrixView, SessionEvent,
};
use rust_decimal::Decimal;
use shared::domain::{LineItemId, OpportunityId, UserId};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExistingMode {
    Edit,
    Delete,
}

/// Load an opportunity's commission matrix, apply edits and optionally submit.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    opportunity: String,
    /// Settings file; defaults to ./commission.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    backend_url: Option<String>,
    /// What to do when commissions already exist for the opportunity.
    #[arg(long, value_enum, default_value_t = ExistingMode::Edit)]
    existing: ExistingMode,
    /// Select every line item for a team member (resets rates to default).
    #[arg(long = "select-member")]
    select_members: Vec<String>,
    /// Select every team member for a line item.
    #[arg(long = "select-line-item")]
    select_line_items: Vec<String>,
    /// LINE_ITEM:USER to select a single cell.
    #[arg(long = "toggle")]
    toggles: Vec<String>,
    /// LINE_ITEM:USER=PERCENT to set a cell's rate.
    #[arg(long = "rate")]
    rates: Vec<String>,
    #[arg(long)]
    submit: bool,
}

fn parse_cell(raw: &str) -> Result<(LineItemId, UserId)> {
    let (line_item, user) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("expected LINE_ITEM:USER, got '{raw}'"))?;
    Ok((LineItemId::from(line_item.trim()), UserId::from(user.trim())))
}

fn parse_rate(raw: &str) -> Result<(LineItemId, UserId, Decimal)> {
    let (cell, rate) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected LINE_ITEM:USER=PERCENT, got '{raw}'"))?;
    let (line_item, user) = parse_cell(cell)?;
    let rate: Decimal = rate
        .trim()
        .parse()
        .with_context(|| format!("invalid percentage in '{raw}'"))?;
    Ok((line_item, user, rate))
}

fn print_events(rx: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = rx.try_recv() {
        match event {
            SessionEvent::Notification(note) => {
                println!("[{:?}] {}: {}", note.severity, note.title, note.message)
            }
            SessionEvent::ExistingRecordsFound { count } => {
                println!("{count} existing commission record(s) found")
            }
            SessionEvent::NavigateToRecord { opportunity_id } => {
                println!("done; return to opportunity {opportunity_id}")
            }
            SessionEvent::BusyChanged(_) => {}
        }
    }
}

fn print_matrix(view: &MatrixView) {
    let header: Vec<String> = view
        .columns
        .iter()
        .map(|column| format!("{} ({}%)", column.name, column.default_rate))
        .collect();
    println!("{:<28} {:>14} | {}", "Line item", "Margin", header.join(" | "));
    for row in &view.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|cell| {
                let mark = if cell.selected { "x" } else { " " };
                format!("[{mark}] {:>6}% {:>12}", cell.percentage, cell.formatted_amount)
            })
            .collect();
        println!(
            "{:<28} {:>14} | {}",
            row.name,
            row.formatted_margin,
            cells.join(" | ")
        );
    }
    println!(
        "Selected: {}  Total commission: {}",
        view.selected_count, view.formatted_total
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(url) = args.backend_url {
        settings.backend_url = url;
    }

    let backend = HttpCommissionBackend::new(&settings.backend_url, settings.request_timeout())?;
    let mut session = CommissionSession::new_with_dependencies(
        OpportunityId::new(args.opportunity),
        Arc::new(backend),
        Arc::new(LocaleCurrencyFormatter::new(settings.default_currency.clone())),
        &settings,
    );
    let mut events = session.subscribe_events();

    let loaded = session.load().await;
    print_events(&mut events);
    let outcome = loaded?;

    if outcome.existing_records > 0 {
        let choice = match args.existing {
            ExistingMode::Edit => ExistingChoice::EditInPlace,
            ExistingMode::Delete => ExistingChoice::DeleteAndRecreate,
        };
        let resolved = session.resolve_existing(choice).await;
        print_events(&mut events);
        resolved?;
    }

    for user in &args.select_members {
        if !session.select_all_for_team_member(&UserId::from(user.as_str()), true) {
            tracing::warn!(user = %user, "no cells for team member");
        }
    }
    for line_item in &args.select_line_items {
        if !session.select_all_for_line_item(&LineItemId::from(line_item.as_str()), true) {
            tracing::warn!(line_item = %line_item, "no cells for line item");
        }
    }
    for raw in &args.toggles {
        let (line_item, user) = parse_cell(raw)?;
        if !session.toggle_cell(&line_item, &user, true) {
            tracing::warn!(cell = %raw, "no such cell");
        }
    }
    for raw in &args.rates {
        let (line_item, user, rate) = parse_rate(raw)?;
        if !session.set_percentage(&line_item, &user, rate) {
            tracing::warn!(cell = %raw, "rate not applied (unknown cell or amount out of range)");
        }
    }

    if let Some(opportunity) = session.opportunity() {
        println!(
            "{} ({})",
            opportunity.name,
            session.format_amount(opportunity.amount)
        );
    }
    print_matrix(&session.view());

    if args.submit {
        let submitted = session.submit().await;
        print_events(&mut events);
        submitted?;
        // Let the delayed navigate signal land before exiting.
        tokio::time::sleep(settings.navigate_delay() + Duration::from_millis(50)).await;
        print_events(&mut events);
    }

    Ok(())
}
