use super::super::domain::OrderStatus;

/// Submissions carrying both a description and at least one evidence file skip straight to
/// review; anything less waits in `Submitted`.
pub fn submission_target(description: Option<&str>, evidence: &[String]) -> OrderStatus {
    let described = description.is_some_and(|text| !text.trim().is_empty());
    let evidenced = evidence.iter().any(|file| !file.trim().is_empty());
    if described && evidenced {
        OrderStatus::Reviewing
    } else {
        OrderStatus::Submitted
    }
}

/// Moves an administrator may make through `set_status`. Completion requires the order to have
/// passed through submission first.
pub fn admin_transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    if from.is_terminal() {
        return false;
    }

    match to {
        Reviewing => from == Submitted,
        PendingPayment => matches!(from, Submitted | Reviewing),
        Completed => matches!(from, Submitted | Reviewing | PendingPayment),
        Rejected | Cancelled => true,
        Applied | Submitted => false,
    }
}
