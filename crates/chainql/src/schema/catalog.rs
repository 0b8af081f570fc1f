//! Built-in Irys and Arweave query descriptors.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value, json};

use super::{PagingInfo, QueryDescriptor};
use crate::remap::RemapPatch;

const ARWEAVE_ENDPOINT: &str = "https://arweave.net/graphql";

/// Every built-in descriptor with its registry name.
pub(super) fn builtin() -> Vec<(&'static str, QueryDescriptor)> {
    vec![
        ("irys:transactions", irys_transactions()),
        ("irys:paymentApprovals", irys_payment_approvals()),
        ("irys:paymentApprovals@v1", irys_payment_approvals_v1()),
        ("arweave:transactions", arweave_transactions()),
        ("arweave:transaction", arweave_transaction()),
        ("arweave:block", arweave_block()),
        ("arweave:blocks", arweave_blocks()),
    ]
}

/// Parse a timestamp variable into Unix milliseconds.
///
/// Accepts integer milliseconds, RFC 3339 date-times and `YYYY-MM-DD` dates
/// (midnight UTC).
pub fn parse_timestamp(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or_else(|| format!("timestamp {number} is out of range")),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(millis) = text.parse::<i64>() {
                return Ok(millis);
            }
            if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
                return Ok(datetime.timestamp_millis());
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|datetime| datetime.and_utc().timestamp_millis())
                .ok_or_else(|| format!("unrecognised timestamp {text:?}"))
        }
        other => Err(format!("unrecognised timestamp {other}")),
    }
}

fn timestamp_bound(
    bound: &'static str,
) -> impl Fn(&str, &Value, &Map<String, Value>) -> Result<RemapPatch, String> + Send + Sync + 'static
{
    move |_, value, _| {
        let millis = parse_timestamp(value).map_err(|_| format!("invalid {bound} timestamp"))?;
        Ok(RemapPatch::new().merge("timestamp", bound, millis))
    }
}

fn height_bound(
    bound: &'static str,
) -> impl Fn(&str, &Value, &Map<String, Value>) -> Result<RemapPatch, String> + Send + Sync + 'static
{
    move |_, value, _| Ok(RemapPatch::new().merge("height", bound, value.clone()))
}

fn height_sort(key: &str, value: &Value, _: &Map<String, Value>) -> Result<RemapPatch, String> {
    let sort = if value == "ASC" {
        "HEIGHT_ASC"
    } else {
        "HEIGHT_DESC"
    };
    Ok(RemapPatch::new().assign(key, sort))
}

fn paged() -> PagingInfo {
    PagingInfo::default().with_limit_variable("pageSize")
}

fn irys_transactions() -> QueryDescriptor {
    QueryDescriptor::builder("transactions")
        .fields(&json!({
            "id": "",
            "receipt": {
                "deadlineHeight": 0,
                "signature": "",
                "timestamp": 0,
                "version": "",
            },
            "tags": [{"name": "", "value": ""}],
            "address": "",
            "token": "",
            "signature": "",
            "timestamp": 0,
        }))
        .optional("ids")
        .optional("after")
        .optional("token")
        .optional("from")
        .variable("pageSize", 100)
        .variable("sort", "ASC")
        .optional("tags")
        .optional("fromTimestamp")
        .optional("toTimestamp")
        .enum_variable("order")
        .rename("pageSize", "first")
        .rename("sort", "order")
        .rename("from", "owners")
        .transform("fromTimestamp", timestamp_bound("from"))
        .transform("toTimestamp", timestamp_bound("to"))
        .paging(paged())
        .build()
}

fn irys_payment_approvals() -> QueryDescriptor {
    QueryDescriptor::builder("paymentApprovals")
        .version(2)
        .fields(&json!({
            "amount": "",
            "payingAddress": "",
            "approvedAddress": "",
            "expiresBy": 0,
            "timestamp": 0,
            "token": "",
        }))
        .optional("tokens")
        .optional("payingAddresses")
        .optional("approvedAddresses")
        .variable("pageSize", 100)
        .variable("order", "ASC")
        .optional("after")
        .enum_variable("order")
        .rename("pageSize", "limit")
        .paging(paged())
        .build()
}

fn irys_payment_approvals_v1() -> QueryDescriptor {
    QueryDescriptor::builder("paymentApprovals")
        .version(1)
        .fields(&json!({
            "amount": "",
            "creator": "",
            "receiver": "",
            "expiresBy": 0,
            "timestamp": 0,
            "token": "",
        }))
        .optional("token")
        .optional("creator")
        .optional("receiver")
        .variable("pageSize", 100)
        .variable("order", "ASC")
        .optional("after")
        .enum_variable("order")
        .rename("pageSize", "limit")
        .paging(paged())
        .build()
}

fn arweave_transaction_fields() -> Value {
    json!({
        "id": "",
        "anchor": "",
        "signature": "",
        "recipient": "",
        "owner": {"address": "", "key": ""},
        "fee": {"winston": "", "ar": ""},
        "quantity": {"winston": "", "ar": ""},
        "data": {"size": "", "type": ""},
        "tags": [{"name": "", "value": ""}],
        "block": {"id": "", "timestamp": 0, "height": 0, "previous": ""},
        "bundledIn": {"id": ""},
    })
}

fn arweave_block_fields() -> Value {
    json!({"id": "", "timestamp": 0, "height": 0, "previous": ""})
}

fn arweave_transactions() -> QueryDescriptor {
    QueryDescriptor::builder("transactions")
        .fields(&arweave_transaction_fields())
        .optional("ids")
        .optional("from")
        .optional("recipients")
        .optional("tags")
        .optional("bundledIn")
        .optional("block")
        .variable("pageSize", 10)
        .optional("after")
        .variable("sort", "DESC")
        .enum_variable("sort")
        .rename("pageSize", "first")
        .rename("from", "owners")
        .transform("sort", height_sort)
        .paging(paged())
        .endpoint_override(ARWEAVE_ENDPOINT)
        .build()
}

fn arweave_transaction() -> QueryDescriptor {
    QueryDescriptor::builder("transaction")
        .fields(&arweave_transaction_fields())
        .optional("id")
        .endpoint_override(ARWEAVE_ENDPOINT)
        .build()
}

fn arweave_block() -> QueryDescriptor {
    QueryDescriptor::builder("block")
        .fields(&arweave_block_fields())
        .optional("id")
        .endpoint_override(ARWEAVE_ENDPOINT)
        .build()
}

fn arweave_blocks() -> QueryDescriptor {
    QueryDescriptor::builder("blocks")
        .fields(&arweave_block_fields())
        .optional("ids")
        .optional("minHeight")
        .optional("maxHeight")
        .variable("pageSize", 10)
        .optional("after")
        .variable("sort", "DESC")
        .enum_variable("sort")
        .rename("pageSize", "first")
        .transform("sort", height_sort)
        .transform("minHeight", height_bound("min"))
        .transform("maxHeight", height_bound("max"))
        .paging(paged())
        .endpoint_override(ARWEAVE_ENDPOINT)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_query_text;
    use crate::error::QueryError;
    use crate::selection::FieldSelection;
    use crate::variables::VariableSet;

    fn text(descriptor: &QueryDescriptor, vars: &VariableSet) -> Result<String, QueryError> {
        let selection = FieldSelection::from_shape(descriptor.fields());
        build_query_text(descriptor, &selection, vars)
    }

    #[test]
    fn timestamps_parse_from_several_formats() {
        assert_eq!(parse_timestamp(&json!(1_700_000_000_000_i64)), Ok(1_700_000_000_000));
        assert_eq!(
            parse_timestamp(&json!("2024-01-02T00:00:00Z")),
            Ok(1_704_153_600_000)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-01-02T01:00:00+01:00")),
            Ok(1_704_153_600_000)
        );
        assert_eq!(parse_timestamp(&json!("2024-01-02")), Ok(1_704_153_600_000));
        assert!(parse_timestamp(&json!("yesterday")).is_err());
        assert!(parse_timestamp(&json!(true)).is_err());
    }

    #[test]
    fn irys_transactions_fold_timestamps() {
        let mut vars = VariableSet::new();
        vars.set("from", json!(["addr"]));
        vars.set("fromTimestamp", "2024-01-02");
        vars.set("toTimestamp", 1_704_240_000_000_i64);
        let text = text(&irys_transactions(), &vars).expect("build");
        assert!(
            text.contains(
                "transactions(first: 100, order: ASC, owners: [\"addr\"], \
                 timestamp: {from: 1704153600000, to: 1704240000000})"
            ),
            "{text}"
        );
    }

    #[test]
    fn irys_transactions_reject_bad_timestamps() {
        let mut vars = VariableSet::new();
        vars.set("toTimestamp", "not a date");
        let err = text(&irys_transactions(), &vars).expect_err("invalid");
        assert!(matches!(
            err,
            QueryError::Transform { ref variable, ref message }
                if variable == "toTimestamp" && message == "invalid to timestamp"
        ));
    }

    #[test]
    fn arweave_blocks_fold_heights_and_sort() {
        let mut vars = VariableSet::new();
        vars.set("minHeight", 100);
        vars.set("maxHeight", 200);
        vars.set("sort", "ASC");
        let text = text(&arweave_blocks(), &vars).expect("build");
        assert!(
            text.contains("blocks(sort: HEIGHT_ASC, first: 10, height: {min: 100, max: 200})"),
            "{text}"
        );
    }

    #[test]
    fn arweave_transaction_is_not_paged() {
        let descriptor = arweave_transaction();
        assert!(descriptor.paging().is_none());
        assert_eq!(descriptor.endpoint_override(), Some(ARWEAVE_ENDPOINT));
        let mut vars = VariableSet::new();
        vars.set("id", "tx-1");
        let text = text(&descriptor, &vars).expect("build");
        assert!(text.starts_with("query {\n  transaction(id: \"tx-1\") {\n    id\n"));
        assert!(text.contains("    tags {\n      name\n      value\n    }\n"));
    }

    #[test]
    fn payment_approvals_rename_page_size_to_limit() {
        let text = text(&irys_payment_approvals(), &VariableSet::new()).expect("build");
        assert!(text.contains("paymentApprovals(order: ASC, limit: 100)"), "{text}");
        assert!(text.contains("approvedAddress"));
    }
}
