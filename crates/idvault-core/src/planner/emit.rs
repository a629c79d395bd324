//! Lowering of plans to store requests.
//!
//! Each emitted request gets a fresh [`ExpressionBuilder`], so placeholder
//! numbering restarts per request and equal plans produce byte-identical
//! expressions.

use idvault_model::{QueryRequest, ScanRequest};

use crate::expression::ExpressionBuilder;
use crate::schema::attribute::AttributeDescriptor;
use crate::schema::table::TableDescriptor;

use super::{Dnf, PlannedQuery};

/// Lowers one planned query to a store query request.
#[must_use]
pub fn emit_query(table: &'static TableDescriptor, query: &PlannedQuery) -> QueryRequest {
    let mut builder = ExpressionBuilder::new();
    let key_condition_expression = builder.key_condition(table, &query.key);
    let filter_expression = builder.disjunction(&query.residuals);
    let (expression_attribute_names, expression_attribute_values) = builder.into_parts();

    QueryRequest {
        table_name: table.physical_name().to_owned(),
        index_name: query.key.index().name().map(str::to_owned),
        key_condition_expression,
        filter_expression,
        expression_attribute_names,
        expression_attribute_values,
        limit: None,
        exclusive_start_key: None,
    }
}

/// Lowers a scan plan to a store scan request.
///
/// For fan-out tables the caller passes `pk_prefix` so the scan only sees
/// one namespace (`begins_with(#pk, "ai#")` keeps secondary-item
/// duplicates out of account scans).
#[must_use]
pub fn emit_scan(
    table: &'static TableDescriptor,
    expression: &Dnf,
    pk_prefix: Option<(&'static AttributeDescriptor, &str)>,
) -> ScanRequest {
    let mut builder = ExpressionBuilder::new();
    let dnf_filter = builder.disjunction(&expression.products);
    let prefix_filter = pk_prefix.map(|(attr, prefix)| builder.begins_with(attr, prefix));

    let filter_expression = match (dnf_filter, prefix_filter) {
        (Some(filter), Some(prefix)) => Some(format!("({filter}) AND {prefix}")),
        (Some(filter), None) => Some(filter),
        (None, Some(prefix)) => Some(prefix),
        (None, None) => None,
    };

    let (expression_attribute_names, expression_attribute_values) = builder.into_parts();

    ScanRequest {
        table_name: table.physical_name().to_owned(),
        filter_expression,
        expression_attribute_names,
        expression_attribute_values,
        exclusive_start_key: None,
    }
}

#[cfg(test)]
mod tests {
    use idvault_model::NativeValue;

    use super::*;
    use crate::planner::{plan, QueryPlan};
    use crate::schema::{accounts, delegations};
    use crate::scim::filter::Filter;

    #[test]
    fn test_should_emit_key_condition_and_residual_filter() {
        let filter =
            Filter::parse(r#"owner eq "u1" and status eq "issued" and expires gt 99"#).unwrap();
        let QueryPlan::UsingQueries(queries) = plan(&filter, &delegations::TABLE).unwrap()
        else {
            panic!("expected queries");
        };

        let request = emit_query(&delegations::TABLE, &queries[0]);
        assert_eq!(request.table_name, "curity-delegations");
        assert_eq!(request.index_name.as_deref(), Some("owner-status-index"));
        assert_eq!(
            request.key_condition_expression,
            "#owner = :owner_1 AND #status = :status_1"
        );
        assert_eq!(
            request.filter_expression.as_deref(),
            Some("#expires > :expires_1")
        );
        assert_eq!(
            request.expression_attribute_values.get(":owner_1"),
            Some(&NativeValue::string("u1"))
        );
        assert_eq!(
            request.expression_attribute_names.get("#expires"),
            Some(&"expires".to_owned())
        );
    }

    #[test]
    fn test_should_emit_prefix_tagged_primary_key_lookup() {
        let filter = Filter::parse(r#"userName eq "alice""#).unwrap();
        let QueryPlan::UsingQueries(queries) = plan(&filter, &accounts::TABLE).unwrap() else {
            panic!("expected queries");
        };

        let request = emit_query(&accounts::TABLE, &queries[0]);
        assert!(request.index_name.is_none());
        assert_eq!(request.key_condition_expression, "#pk = :pk_1");
        assert_eq!(
            request.expression_attribute_values.get(":pk_1"),
            Some(&NativeValue::string("un#alice"))
        );
    }

    #[test]
    fn test_should_emit_scan_with_namespace_prefix_conjunct() {
        let filter = Filter::parse(r#"active eq true"#).unwrap();
        let QueryPlan::UsingScan(dnf) = plan(&filter, &accounts::TABLE).unwrap() else {
            panic!("expected scan");
        };

        let request = emit_scan(&accounts::TABLE, &dnf, Some((&accounts::PK, "ai#")));
        assert_eq!(
            request.filter_expression.as_deref(),
            Some("(#active = :active_1) AND begins_with(#pk, :pk_1)")
        );
        assert_eq!(
            request.expression_attribute_values.get(":pk_1"),
            Some(&NativeValue::string("ai#"))
        );
    }

    #[test]
    fn test_should_restart_placeholder_numbering_per_request() {
        let filter = Filter::parse(r#"owner eq "u1" or owner eq "u2""#).unwrap();
        let QueryPlan::UsingQueries(queries) = plan(&filter, &delegations::TABLE).unwrap()
        else {
            panic!("expected queries");
        };
        assert_eq!(queries.len(), 2);

        for query in &queries {
            let request = emit_query(&delegations::TABLE, query);
            assert_eq!(request.key_condition_expression, "#owner = :owner_1");
        }
    }
}
