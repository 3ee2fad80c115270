use crate::infra::parse_amount;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use rust_decimal::Decimal;
use std::fs::File;
use std::path::PathBuf;
use taskmarket::config::MarketConfig;
use taskmarket::error::AppError;
use taskmarket::marketplace::{
    export_csv, AccountId, Actor, JobDraft, LedgerAudit, MarketError, Marketplace, OrderStatus,
    SweepReport,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of slots on the demo job.
    #[arg(long, default_value_t = 1)]
    pub(crate) slots: u32,
    /// Number of workers racing for the slots.
    #[arg(long, default_value_t = 3)]
    pub(crate) applicants: usize,
    /// Payout per completed order.
    #[arg(long, value_parser = parse_amount, default_value = "50")]
    pub(crate) amount: Decimal,
    /// Write the winning worker's transactions to this CSV file.
    #[arg(long)]
    pub(crate) transactions_csv: Option<PathBuf>,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            slots: 1,
            applicants: 3,
            amount: Decimal::from(50),
            transactions_csv: None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ApplicantOutcome {
    pub(crate) account_id: AccountId,
    pub(crate) result: Result<String, String>,
}

#[derive(Debug)]
pub(crate) struct DemoSummary {
    pub(crate) applicants: Vec<ApplicantOutcome>,
    pub(crate) completed_orders: usize,
    pub(crate) cancelled_by_owner: Option<(AccountId, u8)>,
    pub(crate) audits: Vec<LedgerAudit>,
    pub(crate) sweep: SweepReport,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let summary = run_scenario(&args, Utc::now())?;
    render_summary(&summary);
    Ok(())
}

pub(crate) fn run_scenario(args: &DemoArgs, start: DateTime<Utc>) -> Result<DemoSummary, AppError> {
    let (market, _notifications) = Marketplace::in_memory(&MarketConfig::default());
    let admin = Actor::admin(AccountId::new("demo-admin"));

    let job = market.jobs.create(
        &admin,
        demo_job("Storefront photo check", args.slots, args.amount, start),
        start,
    )?;

    let mut workers = Vec::with_capacity(args.applicants);
    for n in 1..=args.applicants {
        let account = market.accounts.register(
            AccountId::new(format!("worker-{n:02}")),
            format!("Worker {n}"),
            start,
        )?;
        workers.push(Actor::user(account.id));
    }

    let mut applicants = Vec::new();
    let mut accepted = Vec::new();
    for worker in &workers {
        match market.orders.apply(&job.id, worker, None, start) {
            Ok(order) => {
                applicants.push(ApplicantOutcome {
                    account_id: worker.account_id.clone(),
                    result: Ok(order.order_number.clone()),
                });
                accepted.push((worker.clone(), order));
            }
            Err(MarketError::Denied(reason)) => applicants.push(ApplicantOutcome {
                account_id: worker.account_id.clone(),
                result: Err(reason.to_string()),
            }),
            Err(other) => return Err(other.into()),
        }
    }

    let mut completed_orders = 0;
    for (offset, (worker, order)) in accepted.iter().enumerate() {
        let submitted_at = start + Duration::minutes(5 + offset as i64);
        market.orders.submit(
            &order.id,
            worker,
            Some("Photos uploaded from the storefront".to_string()),
            vec![format!("uploads/{}/front.jpg", order.order_number)],
            submitted_at,
        )?;
        market.orders.set_status(
            &order.id,
            OrderStatus::Completed,
            &admin,
            submitted_at + Duration::minutes(30),
        )?;
        completed_orders += 1;
    }

    // A second job shows the owner-cancel penalty on the first worker.
    let mut cancelled_by_owner = None;
    if let Some(worker) = workers.first() {
        let side_job = market.jobs.create(
            &admin,
            demo_job("Shelf restock survey", 1, args.amount, start),
            start,
        )?;
        let order = market.orders.apply(&side_job.id, worker, None, start)?;
        market.orders.cancel(&order.id, worker, start + Duration::minutes(1))?;
        let account = market.accounts.get(&worker.account_id)?;
        cancelled_by_owner = Some((account.id, account.credit_score));
    }

    let sweep = market.sweeper.sweep(start + Duration::days(2))?;

    let mut audits = Vec::with_capacity(workers.len());
    for worker in &workers {
        audits.push(market.ledger.audit(&worker.account_id)?);
    }

    if let (Some(path), Some((worker, _))) = (&args.transactions_csv, accepted.first()) {
        let transactions = market.ledger.transactions(&worker.account_id)?;
        let file = File::create(path)?;
        export_csv(file, &transactions)?;
    }

    Ok(DemoSummary {
        applicants,
        completed_orders,
        cancelled_by_owner,
        audits,
        sweep,
    })
}

fn demo_job(title: &str, total_slots: u32, amount: Decimal, start: DateTime<Utc>) -> JobDraft {
    JobDraft {
        title: title.to_string(),
        description: "Visit the listed store and photograph the entrance".to_string(),
        categories: vec!["field".to_string(), "photo".to_string()],
        total_slots,
        amount,
        amount_levels: Vec::new(),
        publish: true,
        scheduled_at: None,
        end_at: None,
        deadline: Some(start + Duration::days(1)),
        is_limited_time: false,
        auto_freeze: true,
        is_repeatable: false,
        deposit_requirement: Decimal::ZERO,
        kyc_required: false,
    }
}

fn render_summary(summary: &DemoSummary) {
    println!("Task marketplace demo");
    println!("\nApplications");
    for outcome in &summary.applicants {
        match &outcome.result {
            Ok(order_number) => println!("  {:<10} accepted as {order_number}", outcome.account_id),
            Err(reason) => println!("  {:<10} denied: {reason}", outcome.account_id),
        }
    }

    println!("\nCompleted orders: {}", summary.completed_orders);
    if let Some((account_id, score)) = &summary.cancelled_by_owner {
        println!("Owner cancellation left {account_id} with credit score {score}");
    }

    println!(
        "\nSweep: {} published, {} frozen, {} orders expired",
        summary.sweep.published.len(),
        summary.sweep.frozen.len(),
        summary.sweep.expired_orders.len()
    );

    println!("\nLedger audit");
    for audit in &summary.audits {
        let verdict = if audit.is_consistent() {
            "consistent"
        } else {
            "DRIFT"
        };
        println!(
            "  {:<10} balance {:>8} over {} entries ({verdict})",
            audit.account_id, audit.balance, audit.entries
        );
    }
}
