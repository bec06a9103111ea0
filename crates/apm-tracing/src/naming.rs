//! Deterministic metric-name derivation for datastore operations.
//!
//! Every datastore call produces the operation-specific metric, product and
//! global rollups picked by transaction kind, and an instance metric.
//! Transaction finalization adds the total-time pair and the caller-unknown
//! rollups.

use crate::transaction::TransactionKind;

pub const DATASTORE_ALL: &str = "Datastore/all";
const DURATION_BY_CALLER_UNKNOWN: &str = "DurationByCaller/Unknown/Unknown/Unknown/Unknown";

/// `allWeb` for web transactions, `allOther` for background and other work.
pub fn rollup_suffix(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Web => "allWeb",
        TransactionKind::Background | TransactionKind::Other => "allOther",
    }
}

/// e.g. `Datastore/operation/Redis/get`
pub fn datastore_operation(product: &str, operation: &str) -> String {
    format!("Datastore/operation/{}/{}", product, operation)
}

/// e.g. `Datastore/instance/Redis/myhost/6379`
pub fn datastore_instance(product: &str, host: &str, port_path_or_id: &str) -> String {
    format!("Datastore/instance/{}/{}/{}", product, host, port_path_or_id)
}

/// Product and global rollups for one operation, kind-qualified.
pub fn datastore_rollups(product: &str, kind: TransactionKind) -> [String; 4] {
    let suffix = rollup_suffix(kind);
    [
        format!("Datastore/{}/all", product),
        format!("Datastore/{}/{}", product, suffix),
        DATASTORE_ALL.to_string(),
        format!("Datastore/{}", suffix),
    ]
}

/// Caller rollups recorded once per transaction when the cross-process
/// caller is unknown.
pub fn duration_by_caller_unknown(kind: TransactionKind) -> [String; 2] {
    [
        format!("{}/all", DURATION_BY_CALLER_UNKNOWN),
        format!("{}/{}", DURATION_BY_CALLER_UNKNOWN, rollup_suffix(kind)),
    ]
}

/// `WebTransactionTotalTime` or `OtherTransactionTotalTime`.
pub fn transaction_total_time(kind: TransactionKind) -> &'static str {
    match kind {
        TransactionKind::Web => "WebTransactionTotalTime",
        TransactionKind::Background | TransactionKind::Other => "OtherTransactionTotalTime",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_and_instance_names() {
        assert_eq!(
            datastore_operation("Redis", "get"),
            "Datastore/operation/Redis/get"
        );
        assert_eq!(
            datastore_instance("Redis", "myhost", "6379"),
            "Datastore/instance/Redis/myhost/6379"
        );
    }

    #[test]
    fn test_rollups_for_background_kind() {
        let rollups = datastore_rollups("Redis", TransactionKind::Background);
        assert_eq!(
            rollups,
            [
                "Datastore/Redis/all".to_string(),
                "Datastore/Redis/allOther".to_string(),
                "Datastore/all".to_string(),
                "Datastore/allOther".to_string(),
            ]
        );
    }

    #[test]
    fn test_rollups_for_web_kind() {
        let rollups = datastore_rollups("Redis", TransactionKind::Web);
        assert_eq!(rollups[1], "Datastore/Redis/allWeb");
        assert_eq!(rollups[3], "Datastore/allWeb");
    }

    #[test]
    fn test_duration_by_caller_unknown() {
        assert_eq!(
            duration_by_caller_unknown(TransactionKind::Other),
            [
                "DurationByCaller/Unknown/Unknown/Unknown/Unknown/all".to_string(),
                "DurationByCaller/Unknown/Unknown/Unknown/Unknown/allOther".to_string(),
            ]
        );
    }

    #[test]
    fn test_transaction_total_time() {
        assert_eq!(
            transaction_total_time(TransactionKind::Web),
            "WebTransactionTotalTime"
        );
        assert_eq!(
            transaction_total_time(TransactionKind::Background),
            "OtherTransactionTotalTime"
        );
    }
}
