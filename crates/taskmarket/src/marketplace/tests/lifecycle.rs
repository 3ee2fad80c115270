use super::common::*;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use crate::marketplace::catalog::JobDraft;
use crate::marketplace::domain::{AccountId, Actor, OrderId, OrderStatus, TransactionKind};
use crate::marketplace::eligibility::DenialReason;
use crate::marketplace::error::{ErrorKind, MarketError};
use crate::marketplace::memory::{MemoryNotifications, MemoryTransactionLog};
use crate::marketplace::repository::JobCatalog;
use crate::marketplace::Marketplace;

#[test]
fn apply_creates_order_with_snapshot_and_claims_slot() {
    let (market, notifications) = market();
    let job = open_job(&market, 3, dec!(50));
    let applicant = worker(&market, "acct-apply-1");

    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("application accepted");

    assert_eq!(order.status, OrderStatus::Applied);
    assert_eq!(order.account_id, applicant.account_id);
    assert_eq!(order.snapshot.title, "Storefront check");
    assert_eq!(order.snapshot.amount, dec!(50));
    assert_eq!(order.snapshot.tier_label, "standard");
    assert!(order.order_number.starts_with("TK20250602100000"));
    assert_eq!(order.stamped_at(OrderStatus::Applied), Some(now()));
    assert_eq!(market.jobs.get(&job.id).expect("job").applied_count, 1);

    let events = notifications.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].template, "order_accepted");
    assert_eq!(events[0].order_id, order.id);
}

#[test]
fn apply_with_tier_records_tier_amount() {
    let (market, _) = market();
    let mut tiered = draft("Tiered review", 2, dec!(10));
    tiered.amount_levels = vec![
        crate::marketplace::domain::AmountLevel {
            label: "short".to_string(),
            amount: dec!(10),
        },
        crate::marketplace::domain::AmountLevel {
            label: "long".to_string(),
            amount: dec!(25),
        },
    ];
    let job = market.jobs.create(&admin(), tiered, now()).expect("job");
    let applicant = worker(&market, "acct-apply-tier");

    let order = market
        .orders
        .apply(&job.id, &applicant, Some(1), now())
        .expect("application accepted");

    assert_eq!(order.snapshot.amount, dec!(25));
    assert_eq!(order.snapshot.tier_label, "long");
}

#[test]
fn apply_to_missing_job_is_not_found() {
    let (market, _) = market();
    let applicant = worker(&market, "acct-apply-2");

    let error = market
        .orders
        .apply(&crate::marketplace::domain::JobId::new("job-missing"), &applicant, None, now())
        .expect_err("missing job");
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[test]
fn apply_from_unknown_account_is_not_found() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(5));

    let error = market
        .orders
        .apply(&job.id, &Actor::user(AccountId::new("ghost")), None, now())
        .expect_err("unknown account");
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(market.jobs.get(&job.id).expect("job").applied_count, 0);
}

#[test]
fn disabled_or_banned_accounts_are_forbidden() {
    let (market, _) = market();
    let job = open_job(&market, 5, dec!(5));

    let disabled = worker(&market, "acct-disabled");
    market
        .accounts
        .set_active(&admin(), &disabled.account_id, false)
        .expect("deactivated");
    let error = market
        .orders
        .apply(&job.id, &disabled, None, now())
        .expect_err("disabled account");
    assert_eq!(error.kind(), ErrorKind::Forbidden);

    let banned = worker(&market, "acct-banned");
    market
        .accounts
        .modify(&banned.account_id, |account| {
            account.credit_ban_until = Some(now() + Duration::hours(2));
            Ok(())
        })
        .expect("ban recorded");
    let error = market
        .orders
        .apply(&job.id, &banned, None, now())
        .expect_err("banned account");
    assert_eq!(error.kind(), ErrorKind::Forbidden);

    assert_eq!(market.jobs.get(&job.id).expect("job").applied_count, 0);
}

#[test]
fn denied_application_leaves_slot_count_untouched() {
    let (market, _) = market();
    let job = open_job(&market, 5, dec!(5));
    let applicant = worker(&market, "acct-twice");

    market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("first application");
    let error = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect_err("second application");

    assert!(matches!(
        error,
        MarketError::Denied(DenialReason::ActiveOrderExists { .. })
    ));
    assert_eq!(error.kind(), ErrorKind::BadRequest);
    assert_eq!(market.jobs.get(&job.id).expect("job").applied_count, 1);
}

#[test]
fn failed_order_insert_releases_the_reserved_slot() {
    let orders = Arc::new(FlakyOrderRepository::default());
    let market = market_with(
        orders.clone(),
        Arc::new(MemoryTransactionLog::default()),
        Arc::new(MemoryNotifications::default()),
    );
    let job = open_job(&market, 1, dec!(5));
    let applicant = worker(&market, "acct-insert-fail");

    orders.fail_insert(true);
    let error = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect_err("insert fails");
    assert_eq!(error.kind(), ErrorKind::Internal);
    assert_eq!(market.jobs.get(&job.id).expect("job").applied_count, 0);

    orders.fail_insert(false);
    market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("slot still available");
}

#[test]
fn notification_failure_does_not_undo_application() {
    let market = market_with(
        Arc::new(FlakyOrderRepository::default()),
        Arc::new(MemoryTransactionLog::default()),
        Arc::new(FailingNotifications),
    );
    let job = open_job(&market, 1, dec!(5));
    let applicant = worker(&market, "acct-notify-fail");

    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("application accepted despite notifier");
    assert_eq!(order.status, OrderStatus::Applied);
}

#[test]
fn full_submission_moves_straight_to_reviewing() {
    let (market, notifications) = market();
    let job = open_job(&market, 1, dec!(5));
    let applicant = worker(&market, "acct-submit-1");

    let order = reviewing_order(&market, &job, &applicant);

    assert_eq!(order.status, OrderStatus::Reviewing);
    assert_eq!(order.description.as_deref(), Some("Done, photos attached"));
    assert_eq!(order.evidence, vec!["uploads/photo-1.jpg".to_string()]);
    let last = notifications.events().pop().expect("status notification");
    assert_eq!(last.template, "order_status_changed");
    assert_eq!(
        last.details.get("previous_status").map(String::as_str),
        Some("applied")
    );
}

#[test]
fn partial_submission_waits_in_submitted() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(5));
    let applicant = worker(&market, "acct-submit-2");
    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("applied");

    let submitted = market
        .orders
        .submit(&order.id, &applicant, Some("  done ".to_string()), Vec::new(), now())
        .expect("submitted");

    assert_eq!(submitted.status, OrderStatus::Submitted);
    assert_eq!(submitted.description.as_deref(), Some("done"));
}

#[test]
fn submit_is_restricted_to_owner_and_applied_orders() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(5));
    let owner = worker(&market, "acct-submit-owner");
    let stranger = worker(&market, "acct-submit-stranger");
    let order = market
        .orders
        .apply(&job.id, &owner, None, now())
        .expect("applied");

    let error = market
        .orders
        .submit(&order.id, &stranger, None, Vec::new(), now())
        .expect_err("stranger");
    assert_eq!(error.kind(), ErrorKind::Forbidden);

    market
        .orders
        .submit(&order.id, &owner, None, Vec::new(), now())
        .expect("first submission");
    let error = market
        .orders
        .submit(
            &order.id,
            &owner,
            None,
            Vec::new(),
            now() + Duration::minutes(5),
        )
        .expect_err("already submitted");
    assert_eq!(error.kind(), ErrorKind::BadRequest);
}

#[test]
fn submissions_are_throttled_per_account() {
    let (market, _) = market();
    let first_job = open_job(&market, 1, dec!(5));
    let second_job = open_job(&market, 1, dec!(5));
    let applicant = worker(&market, "acct-cooldown");
    let first = market
        .orders
        .apply(&first_job.id, &applicant, None, now())
        .expect("first applied");
    let second = market
        .orders
        .apply(&second_job.id, &applicant, None, now())
        .expect("second applied");

    market
        .orders
        .submit(&first.id, &applicant, None, Vec::new(), now())
        .expect("first submission");

    let error = market
        .orders
        .submit(
            &second.id,
            &applicant,
            None,
            Vec::new(),
            now() + Duration::seconds(20),
        )
        .expect_err("inside cooldown");
    match error {
        MarketError::TooManyRequests {
            retry_after_secs,
            window_secs,
        } => {
            assert_eq!(retry_after_secs, 40);
            assert_eq!(window_secs, 60);
        }
        other => panic!("expected throttle, got {other:?}"),
    }

    let resubmitted = market
        .orders
        .submit(
            &second.id,
            &applicant,
            None,
            Vec::new(),
            now() + Duration::seconds(61),
        )
        .expect("window elapsed");
    assert_eq!(resubmitted.status, OrderStatus::Submitted);
}

#[test]
fn failed_submission_write_does_not_consume_cooldown() {
    let orders = Arc::new(FlakyOrderRepository::default());
    let market = market_with(
        orders.clone(),
        Arc::new(MemoryTransactionLog::default()),
        Arc::new(MemoryNotifications::default()),
    );
    let job = open_job(&market, 1, dec!(5));
    let applicant = worker(&market, "acct-cooldown-restore");
    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("applied");

    orders.fail_replace(true);
    market
        .orders
        .submit(&order.id, &applicant, None, Vec::new(), now())
        .expect_err("write fails");

    orders.fail_replace(false);
    market
        .orders
        .submit(&order.id, &applicant, None, Vec::new(), now())
        .expect("cooldown restored");
}

#[test]
fn completion_requires_prior_submission() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-skip");
    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("applied");

    let error = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect_err("cannot skip submission");
    assert_eq!(error.kind(), ErrorKind::BadRequest);
    assert_eq!(account(&market, &applicant).balance, Decimal::ZERO);
}

#[test]
fn completion_pays_snapshot_and_grants_rewards() {
    let market = market_with_credit(80);
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-complete");
    let order = reviewing_order(&market, &job, &applicant);

    market
        .orders
        .set_status(&order.id, OrderStatus::PendingPayment, &admin(), now())
        .expect("pending payment");
    let completed = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect("completed");

    assert_eq!(completed.status, OrderStatus::Completed);
    let member = account(&market, &applicant);
    assert_eq!(member.balance, dec!(50));
    assert_eq!(member.credit_score, 81);
    assert_eq!(member.experience, 52);

    let transactions = market
        .ledger
        .transactions(&applicant.account_id)
        .expect("transactions");
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, TransactionKind::Income);
    assert_eq!(transactions[0].amount, dec!(50));
    assert_eq!(transactions[0].balance_snapshot, dec!(50));
    assert_eq!(transactions[0].order_id.as_ref(), Some(&order.id));
}

#[test]
fn completion_credit_is_capped() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-capped");
    let order = reviewing_order(&market, &job, &applicant);

    market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect("completed");
    assert_eq!(account(&market, &applicant).credit_score, 100);
}

#[test]
fn second_completion_is_rejected_and_pays_nothing() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-double");
    let order = reviewing_order(&market, &job, &applicant);

    market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect("completed");
    let error = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect_err("already completed");

    assert_eq!(error.kind(), ErrorKind::BadRequest);
    assert_eq!(account(&market, &applicant).balance, dec!(50));
    assert_eq!(
        market
            .ledger
            .transactions(&applicant.account_id)
            .expect("transactions")
            .len(),
        1
    );
}

fn income_entries_for(market: &Marketplace, actor: &Actor, order_id: &OrderId) -> usize {
    market
        .ledger
        .transactions(&actor.account_id)
        .expect("transactions")
        .iter()
        .filter(|entry| {
            entry.kind == TransactionKind::Income && entry.order_id.as_ref() == Some(order_id)
        })
        .count()
}

#[test]
fn failed_completion_write_leaves_account_untouched() {
    let orders = Arc::new(FlakyOrderRepository::default());
    let market = market_with(
        orders.clone(),
        Arc::new(MemoryTransactionLog::default()),
        Arc::new(MemoryNotifications::default()),
    );
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-reverse");
    market
        .accounts
        .modify(&applicant.account_id, |account| {
            account.credit_score = 70;
            Ok(())
        })
        .expect("score lowered");
    let order = reviewing_order(&market, &job, &applicant);

    orders.fail_replace(true);
    let error = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect_err("write fails");
    assert_eq!(error.kind(), ErrorKind::Internal);

    let member = account(&market, &applicant);
    assert_eq!(member.balance, Decimal::ZERO);
    assert_eq!(member.experience, 0);
    assert_eq!(member.credit_score, 70);
    assert_eq!(income_entries_for(&market, &applicant, &order.id), 0);
    assert!(market
        .ledger
        .transactions(&applicant.account_id)
        .expect("transactions")
        .is_empty());

    orders.fail_replace(false);
    let stored = market.orders.get(&order.id, &admin()).expect("order");
    assert_eq!(stored.status, OrderStatus::Reviewing);
}

#[test]
fn retried_completion_after_withdrawal_pays_exactly_once() {
    let orders = Arc::new(FlakyOrderRepository::default());
    let market = market_with(
        orders.clone(),
        Arc::new(MemoryTransactionLog::default()),
        Arc::new(MemoryNotifications::default()),
    );
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-retry-payout");
    market
        .ledger
        .recharge(&applicant.account_id, dec!(50), "card top up", now())
        .expect("recharged");
    let order = reviewing_order(&market, &job, &applicant);

    orders.fail_replace(true);
    market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect_err("write fails");
    market
        .ledger
        .debit(&applicant.account_id, dec!(50), "cash out", now())
        .expect("withdrawal of the pre-existing balance");

    orders.fail_replace(false);
    let completed = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect("retry succeeds");
    assert_eq!(completed.status, OrderStatus::Completed);

    assert_eq!(income_entries_for(&market, &applicant, &order.id), 1);
    assert_eq!(account(&market, &applicant).balance, dec!(50));
    assert!(market
        .ledger
        .audit(&applicant.account_id)
        .expect("audit")
        .is_consistent());

    let again = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect_err("already completed");
    assert_eq!(again.kind(), ErrorKind::BadRequest);
    assert_eq!(income_entries_for(&market, &applicant, &order.id), 1);
}

#[test]
fn failed_payout_append_reopens_the_order() {
    let log = Arc::new(FlakyTransactionLog::default());
    let market = market_with(
        Arc::new(FlakyOrderRepository::default()),
        log.clone(),
        Arc::new(MemoryNotifications::default()),
    );
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-append-payout");
    let order = reviewing_order(&market, &job, &applicant);

    log.fail_append(true);
    let error = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect_err("append fails");
    assert_eq!(error.kind(), ErrorKind::Internal);

    let stored = market.orders.get(&order.id, &admin()).expect("order");
    assert_eq!(stored.status, OrderStatus::Reviewing);
    assert_eq!(account(&market, &applicant).balance, Decimal::ZERO);

    log.fail_append(false);
    market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect("retry succeeds");
    assert_eq!(income_entries_for(&market, &applicant, &order.id), 1);
    assert_eq!(account(&market, &applicant).balance, dec!(50));
}

#[test]
fn rejected_orders_are_terminal() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-rejected");
    let order = reviewing_order(&market, &job, &applicant);

    market
        .orders
        .set_status(&order.id, OrderStatus::Rejected, &admin(), now())
        .expect("rejected");
    let error = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect_err("terminal");
    assert_eq!(error.kind(), ErrorKind::BadRequest);
    assert_eq!(account(&market, &applicant).balance, Decimal::ZERO);
}

#[test]
fn status_changes_require_admin() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-self-complete");
    let order = reviewing_order(&market, &job, &applicant);

    let error = market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &applicant, now())
        .expect_err("owner cannot complete");
    assert_eq!(error.kind(), ErrorKind::Forbidden);
}

#[test]
fn owner_cancel_before_submission_costs_one_credit_point() {
    let market = market_with_credit(65);
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-owner-cancel");
    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("applied");

    let cancelled = market
        .orders
        .cancel(&order.id, &applicant, now())
        .expect("cancelled");

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let member = account(&market, &applicant);
    assert_eq!(member.credit_score, 64);
    assert_eq!(member.credit_ban_until, None);
    assert_eq!(market.jobs.get(&job.id).expect("job").applied_count, 1);
}

#[test]
fn owner_cancel_is_refused_when_the_penalty_cannot_be_stored() {
    let accounts = Arc::new(FlakyAccountStore::default());
    let market = market_with_accounts(accounts.clone());
    let job = open_job(&market, 1, dec!(20));
    let applicant = worker(&market, "acct-penalty-store");
    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("applied");

    accounts.fail_update(true);
    let error = market
        .orders
        .cancel(&order.id, &applicant, now())
        .expect_err("penalty write fails");
    assert_eq!(error.kind(), ErrorKind::Internal);
    let stored = market.orders.get(&order.id, &applicant).expect("order");
    assert_eq!(stored.status, OrderStatus::Applied);
    assert_eq!(account(&market, &applicant).credit_score, 100);

    accounts.fail_update(false);
    let cancelled = market
        .orders
        .cancel(&order.id, &applicant, now())
        .expect("cancelled");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(account(&market, &applicant).credit_score, 99);
}

#[test]
fn owner_cannot_cancel_after_submission_but_admin_can() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-late-cancel");
    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("applied");
    market
        .orders
        .submit(&order.id, &applicant, None, Vec::new(), now())
        .expect("submitted");

    let error = market
        .orders
        .cancel(&order.id, &applicant, now())
        .expect_err("owner too late");
    assert_eq!(error.kind(), ErrorKind::BadRequest);

    let cancelled = market
        .orders
        .cancel(&order.id, &admin(), now())
        .expect("admin cancel");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(account(&market, &applicant).credit_score, 100);
}

#[test]
fn set_status_cancelled_uses_admin_cancel() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(50));
    let applicant = worker(&market, "acct-status-cancel");
    let order = reviewing_order(&market, &job, &applicant);

    let cancelled = market
        .orders
        .set_status(&order.id, OrderStatus::Cancelled, &admin(), now())
        .expect("cancelled");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(account(&market, &applicant).credit_score, 100);
}

#[test]
fn cancelled_order_allows_reapplication() {
    let (market, _) = market();
    let job = open_job(&market, 2, dec!(50));
    let applicant = worker(&market, "acct-reapply");
    let order = market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("applied");
    market
        .orders
        .cancel(&order.id, &admin(), now())
        .expect("cancelled");

    market
        .orders
        .apply(&job.id, &applicant, None, now())
        .expect("reapplied");
    assert_eq!(market.jobs.get(&job.id).expect("job").applied_count, 2);
}

#[test]
fn snapshot_survives_job_edits() {
    let (market, _) = market();
    let job = open_job(&market, 2, dec!(50));
    let applicant = worker(&market, "acct-snapshot");
    let order = reviewing_order(&market, &job, &applicant);

    let edited = JobDraft {
        title: "Renamed task".to_string(),
        amount: dec!(5),
        ..draft("Storefront check", 2, dec!(50))
    };
    market
        .jobs
        .update(&admin(), &job.id, edited)
        .expect("job edited");

    market
        .orders
        .set_status(&order.id, OrderStatus::Completed, &admin(), now())
        .expect("completed");
    let stored = market.orders.get(&order.id, &applicant).expect("order");
    assert_eq!(stored.snapshot.title, "Storefront check");
    assert_eq!(account(&market, &applicant).balance, dec!(50));
}

#[test]
fn orders_are_visible_to_owner_and_admin_only() {
    let (market, _) = market();
    let job = open_job(&market, 1, dec!(5));
    let owner = worker(&market, "acct-visible-owner");
    let stranger = worker(&market, "acct-visible-stranger");
    let order = market
        .orders
        .apply(&job.id, &owner, None, now())
        .expect("applied");

    assert!(market.orders.get(&order.id, &owner).is_ok());
    assert!(market.orders.get(&order.id, &admin()).is_ok());
    assert_eq!(
        market
            .orders
            .get(&order.id, &stranger)
            .expect_err("hidden")
            .kind(),
        ErrorKind::Forbidden
    );
    assert_eq!(
        market
            .orders
            .list_for_account(&owner.account_id, &owner)
            .expect("own list")
            .len(),
        1
    );
    assert_eq!(
        market
            .orders
            .list_for_account(&owner.account_id, &stranger)
            .expect_err("foreign list")
            .kind(),
        ErrorKind::Forbidden
    );
}

#[test]
fn expire_overdue_cancels_applied_orders_without_penalty() {
    let (market, _) = market();
    let mut timed = draft("Timed task", 2, dec!(5));
    timed.deadline = Some(now() + Duration::hours(1));
    let job = market.jobs.create(&admin(), timed, now()).expect("job");
    let idle = worker(&market, "acct-idle");
    let busy = worker(&market, "acct-busy");
    let idle_order = market
        .orders
        .apply(&job.id, &idle, None, now())
        .expect("applied");
    reviewing_order(&market, &job, &busy);

    let expired = market
        .orders
        .expire_overdue(now() + Duration::hours(2), 100)
        .expect("expiry pass");

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, idle_order.id);
    assert_eq!(expired[0].status, OrderStatus::Cancelled);
    assert_eq!(account(&market, &idle).credit_score, 100);
    assert_eq!(
        expired[0].timeline.last().map(|change| change.actor.as_str()),
        Some("system")
    );
}

#[test]
fn flag_edits_through_catalog_do_not_touch_counters() {
    let catalog = crate::marketplace::memory::MemoryJobCatalog::default();
    let job = catalog.insert(listed_job("job-counter")).expect("inserted");
    catalog.reserve_slot(&job.id).expect("reserved");

    let mut edited = job.clone();
    edited.title = "Edited".to_string();
    edited.applied_count = 0;
    edited.is_published = false;
    let stored = catalog.update_details(edited).expect("updated");

    assert_eq!(stored.title, "Edited");
    assert_eq!(stored.applied_count, 1);
    assert!(stored.is_published);
}
