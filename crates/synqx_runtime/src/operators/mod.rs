//! Built-in operator classes. Each submodule owns one
//! `operator_class`, its config struct, and its own unit tests; this module
//! only wires them into an [`OperatorRegistry`](crate::operator::OperatorRegistry).

pub mod aggregate;
pub mod code;
pub mod dbt;
pub mod dedupe;
pub mod drop_columns;
pub mod fill_nulls;
pub mod filter;
pub mod join;
pub mod map;
pub mod merge;
pub mod noop;
pub mod pii_mask;
pub mod regex_replace;
pub mod rename_columns;
pub mod scd_type_2;
pub mod sort;
pub mod type_cast;
pub mod union;
pub mod util;
pub mod validate;

use std::sync::Arc;

use crate::operator::OperatorRegistry;

/// Registers every built-in operator class under its spec-defined name.
pub fn register_all(registry: &mut OperatorRegistry) {
    registry.register(Arc::new(filter::FilterOperator));
    registry.register(Arc::new(map::MapOperator));
    registry.register(Arc::new(rename_columns::RenameColumnsOperator));
    registry.register(Arc::new(drop_columns::DropColumnsOperator));
    registry.register(Arc::new(type_cast::TypeCastOperator));
    registry.register(Arc::new(regex_replace::RegexReplaceOperator));
    registry.register(Arc::new(fill_nulls::FillNullsOperator));
    registry.register(Arc::new(dedupe::DeduplicateOperator));
    registry.register(Arc::new(sort::SortOperator));
    registry.register(Arc::new(aggregate::AggregateOperator));
    registry.register(Arc::new(union::UnionOperator));
    registry.register(Arc::new(join::JoinOperator));
    registry.register(Arc::new(merge::MergeOperator));
    registry.register(Arc::new(scd_type_2::ScdType2Operator));
    registry.register(Arc::new(code::CodeOperator::polars()));
    registry.register(Arc::new(code::CodeOperator::python_compat()));
    registry.register(Arc::new(validate::ValidateOperator::new()));
    registry.register(Arc::new(pii_mask::PiiMaskOperator));
    registry.register(Arc::new(dbt::DbtOperator));
    registry.register(Arc::new(noop::NoopOperator));
    registry.register(Arc::new(noop::PassThroughOperator));
}
