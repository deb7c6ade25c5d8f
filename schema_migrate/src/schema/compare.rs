//! Column and index comparison between a declared model and a live table

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dialect::SpecificMigrator;
use crate::error::Result;
use crate::models::DeclaredModel;
use crate::schema::types::{Column, ColumnChange, IndexChange, IndexInfo, LiveTable, MigrationPlan};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Build the plan that brings `live` in line with `model`.
///
/// Columns are matched by resolved column name. There is no rename
/// detection: a renamed column shows up as one addition and one drop.
pub fn compare_schema<M: SpecificMigrator + ?Sized>(
    migrator: &M,
    live: &LiveTable,
    model: &DeclaredModel,
) -> Result<MigrationPlan> {
    let mut plan = MigrationPlan::default();
    let table_name = &live.name;

    let live_columns: IndexMap<&str, &Column> =
        live.columns.iter().map(|c| (c.name.as_str(), c)).collect();

    for field in &model.fields {
        let desired = migrator.convert_field_to_column_info(field);

        match live_columns.get(desired.name.as_str()) {
            None => plan.add_columns.push(ColumnChange {
                table_name: table_name.clone(),
                column_name: desired.name.clone(),
                old_column: None,
                new_column: Some(desired),
            }),
            Some(current) => {
                if column_needs_modification(current, &desired) {
                    plan.modify_columns.push(ColumnChange {
                        table_name: table_name.clone(),
                        column_name: desired.name.clone(),
                        old_column: Some((*current).clone()),
                        new_column: Some(desired),
                    });
                }
            }
        }
    }

    for column in &live.columns {
        let declared = model.fields.iter().any(|f| f.column_name() == column.name);
        if !declared {
            plan.drop_columns.push(ColumnChange {
                table_name: table_name.clone(),
                column_name: column.name.clone(),
                old_column: Some(column.clone()),
                new_column: None,
            });
        }
    }

    compare_indexes(live, model, &mut plan);

    Ok(plan)
}

fn compare_indexes(live: &LiveTable, model: &DeclaredModel, plan: &mut MigrationPlan) {
    let live_indexes: IndexMap<&str, &IndexInfo> =
        live.indexes.iter().map(|i| (i.name.as_str(), i)).collect();

    for index in &model.indexes {
        let desired = IndexInfo::new(
            &index.name,
            model.resolve_columns(&index.fields),
            index.unique,
        );

        match live_indexes.get(desired.name.as_str()) {
            Some(current) if index_matches(current, &desired) => {}
            Some(current) => {
                plan.drop_indexes.push(IndexChange {
                    table_name: live.name.clone(),
                    index_name: current.name.clone(),
                    old_index: Some((*current).clone()),
                    new_index: None,
                });
                plan.add_indexes.push(IndexChange {
                    table_name: live.name.clone(),
                    index_name: desired.name.clone(),
                    old_index: None,
                    new_index: Some(desired),
                });
            }
            None => plan.add_indexes.push(IndexChange {
                table_name: live.name.clone(),
                index_name: desired.name.clone(),
                old_index: None,
                new_index: Some(desired),
            }),
        }
    }

    for index in &live.indexes {
        if !model.indexes.iter().any(|i| i.name == index.name) {
            plan.drop_indexes.push(IndexChange {
                table_name: live.name.clone(),
                index_name: index.name.clone(),
                old_index: Some(index.clone()),
                new_index: None,
            });
        }
    }
}

fn index_matches(current: &IndexInfo, desired: &IndexInfo) -> bool {
    current.unique == desired.unique && current.columns == desired.columns
}

/// Trim, collapse inner whitespace and uppercase a type string
pub fn normalize_type(data_type: &str) -> String {
    WHITESPACE
        .replace_all(data_type.trim(), " ")
        .to_uppercase()
}

/// Check whether a live column differs from its desired definition
pub fn column_needs_modification(current: &Column, desired: &Column) -> bool {
    if normalize_type(&current.data_type) != normalize_type(&desired.data_type) {
        return true;
    }

    if current.nullable != desired.nullable
        || current.primary_key != desired.primary_key
        || current.auto_increment != desired.auto_increment
        || current.unique != desired.unique
    {
        return true;
    }

    match (&current.default, &desired.default) {
        (None, None) => false,
        (Some(a), Some(b)) => a.trim() != b.trim(),
        _ => true,
    }
}
