use std::io::Write;

use serde::Serialize;

use super::super::domain::Transaction;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write transaction csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush transaction csv: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct TransactionRow<'a> {
    #[serde(rename = "Transaction ID")]
    id: &'a str,
    #[serde(rename = "Account ID")]
    account_id: &'a str,
    #[serde(rename = "Order ID")]
    order_id: &'a str,
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Balance After")]
    balance_snapshot: String,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Created At")]
    created_at: String,
    #[serde(rename = "Description")]
    description: &'a str,
}

/// Write the audit trail as CSV, one row per transaction in the order given.
pub fn export_csv<W: Write>(writer: W, transactions: &[Transaction]) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for transaction in transactions {
        csv_writer.serialize(TransactionRow {
            id: transaction.id.as_str(),
            account_id: transaction.account_id.as_str(),
            order_id: transaction
                .order_id
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or(""),
            kind: transaction.kind.label(),
            amount: transaction.signed_amount().to_string(),
            balance_snapshot: transaction.balance_snapshot.to_string(),
            status: transaction.status.label(),
            created_at: transaction.created_at.to_rfc3339(),
            description: &transaction.description,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}
