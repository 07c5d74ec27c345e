//! Column type translation between dialects.
//!
//! A source column is classified into a [`TypeFamily`] by the source
//! dialect, named by the target dialect, given a length spec from its
//! catalog metadata, and then passed through the correction rules
//! registered for the `(source, target)` pair. Rules are plain functions
//! in a table, so a new pair needs a table entry and no new branches.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::config::DbKind;
use crate::core::{ColumnDescriptor, Dialect};
use crate::drivers::DialectImpl;

use super::canonical::{LengthSpec, TypeFamily};

/// A target type while it is being corrected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetType {
    pub family: TypeFamily,
    pub name: String,
    pub spec: LengthSpec,
}

impl TargetType {
    /// Switch family, taking the target dialect's name for it.
    fn retype(&mut self, family: TypeFamily, target: &dyn Dialect) {
        self.family = family;
        self.name = target.type_name(family).to_string();
    }

    /// Render as DDL.
    fn compose(&self, target: &dyn Dialect) -> String {
        let bare = self.name.contains('(')
            || target
                .bare_types()
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&self.name))
            || matches!(self.spec, LengthSpec::Empty | LengthSpec::Unresolved);
        if bare {
            self.name.clone()
        } else {
            format!("{}({})", self.name, self.spec)
        }
    }
}

/// A correction applied after the base mapping.
pub type CorrectionRule = fn(&mut TargetType, &dyn Dialect);

/// Exact numerics from dialects that report integers as scale-0 decimals.
///
/// Scale 0 buckets into the narrowest integer family; wider values keep
/// precision only. A decimal with no precision at all becomes a double.
fn narrow_exact_numeric(ty: &mut TargetType, target: &dyn Dialect) {
    if ty.family != TypeFamily::Decimal {
        return;
    }
    match ty.spec {
        LengthSpec::Unresolved => {
            ty.retype(TypeFamily::Double, target);
            ty.spec = LengthSpec::Empty;
        }
        LengthSpec::Numeric {
            precision,
            scale: Some(0),
        } => match TypeFamily::integer_for_precision(precision) {
            Some(family) => {
                ty.retype(family, target);
                ty.spec = LengthSpec::Empty;
            }
            None => {
                ty.spec = LengthSpec::Numeric {
                    precision,
                    scale: None,
                }
            }
        },
        _ => {}
    }
}

/// Unbounded character/binary columns take the target's `max` marker, or
/// its unbounded type when it has none.
fn widen_unbounded_lengths(ty: &mut TargetType, target: &dyn Dialect) {
    if ty.spec != LengthSpec::Unresolved {
        return;
    }
    let unbounded = match ty.family {
        TypeFamily::Varchar => TypeFamily::Text,
        TypeFamily::Binary => TypeFamily::Blob,
        _ => return,
    };
    if target.supports_max_length() {
        ty.spec = LengthSpec::Max;
    } else {
        ty.retype(unbounded, target);
        ty.spec = LengthSpec::Empty;
    }
}

/// A decimal without precision is written without a qualifier.
fn bare_unbounded_number(ty: &mut TargetType, _target: &dyn Dialect) {
    if ty.family == TypeFamily::Decimal && ty.spec == LengthSpec::Unresolved {
        ty.spec = LengthSpec::Empty;
    }
}

static RULES: LazyLock<HashMap<(DbKind, DbKind), Vec<CorrectionRule>>> = LazyLock::new(|| {
    let mut rules: HashMap<(DbKind, DbKind), Vec<CorrectionRule>> = HashMap::new();
    for source in DbKind::ALL {
        for target in DbKind::ALL.into_iter().filter(|t| *t != source) {
            let set: Vec<CorrectionRule> = match source {
                DbKind::Oracle | DbKind::Postgres | DbKind::Db2 | DbKind::Firebird => {
                    vec![narrow_exact_numeric, widen_unbounded_lengths]
                }
                DbKind::Mssql | DbKind::Mysql => {
                    vec![bare_unbounded_number, widen_unbounded_lengths]
                }
            };
            rules.insert((source, target), set);
        }
    }
    // varchar(max) is reported with an unresolved length
    rules.insert((DbKind::Mssql, DbKind::Mssql), vec![widen_unbounded_lengths]);
    rules
});

/// Translates column metadata from one dialect into another's DDL types.
///
/// Pure and deterministic: the same descriptor always yields the same
/// string, and every native type yields one.
#[derive(Clone)]
pub struct TypeTranslator {
    source: DialectImpl,
    target: DialectImpl,
    rules: &'static [CorrectionRule],
}

impl std::fmt::Debug for TypeTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeTranslator")
            .field("source", &self.source.kind())
            .field("target", &self.target.kind())
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl TypeTranslator {
    pub fn new(source: DbKind, target: DbKind) -> Self {
        let rules = RULES
            .get(&(source, target))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        Self {
            source: DialectImpl::for_kind(source),
            target: DialectImpl::for_kind(target),
            rules,
        }
    }

    /// Base mapping before corrections.
    pub fn base_type(&self, column: &ColumnDescriptor) -> TargetType {
        let family = self.source.family_of(&column.native_type);
        let name = if self.source.kind() == self.target.kind() {
            column.native_type.clone()
        } else {
            self.target.type_name(family).to_string()
        };
        let spec = if family.uses_data_length() {
            match column.length {
                Some(n) if n >= 0 => LengthSpec::Length(n),
                _ => LengthSpec::Unresolved,
            }
        } else {
            match column.precision {
                Some(precision) => LengthSpec::Numeric {
                    precision,
                    scale: column.scale,
                },
                None if column.scale == Some(0) && family == TypeFamily::Decimal => {
                    // NUMBER(*, 0): integer of unspecified width
                    LengthSpec::Numeric {
                        precision: 38,
                        scale: Some(0),
                    }
                }
                None => LengthSpec::Unresolved,
            }
        };
        TargetType { family, name, spec }
    }

    /// DDL type string for one column.
    pub fn translate(&self, column: &ColumnDescriptor) -> String {
        let mut ty = self.base_type(column);
        for rule in self.rules {
            rule(&mut ty, &self.target);
        }
        ty.compose(&self.target)
    }

    /// Ordered column → DDL type pairs for table creation.
    pub fn type_map(&self, columns: &[ColumnDescriptor]) -> Vec<(String, String)> {
        columns
            .iter()
            .map(|c| (c.column.clone(), self.translate(c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(precision: Option<i64>, scale: Option<i64>) -> ColumnDescriptor {
        ColumnDescriptor::new("AMOUNT", "NUMBER").with_numeric(precision, scale)
    }

    #[test]
    fn test_oracle_number_buckets_into_mssql_integers() {
        let t = TypeTranslator::new(DbKind::Oracle, DbKind::Mssql);
        assert_eq!(t.translate(&number(Some(2), Some(0))), "TINYINT");
        assert_eq!(t.translate(&number(Some(4), Some(0))), "SMALLINT");
        assert_eq!(t.translate(&number(Some(8), Some(0))), "INT");
        assert_eq!(t.translate(&number(Some(18), Some(0))), "BIGINT");
        assert_eq!(t.translate(&number(Some(20), Some(0))), "DECIMAL(20)");
    }

    #[test]
    fn test_unqualified_number_becomes_float() {
        let t = TypeTranslator::new(DbKind::Oracle, DbKind::Mssql);
        assert_eq!(t.translate(&number(None, None)), "FLOAT");
        assert_eq!(t.translate(&number(Some(10), Some(2))), "DECIMAL(10, 2)");
        assert_eq!(t.translate(&number(None, Some(0))), "DECIMAL(38)");
    }

    #[test]
    fn test_unbounded_varchar_uses_max_marker() {
        let t = TypeTranslator::new(DbKind::Postgres, DbKind::Mssql);
        let col = ColumnDescriptor::new("NOTES", "character varying");
        assert_eq!(t.translate(&col), "VARCHAR(max)");
        assert_eq!(t.translate(&col.clone().with_length(80)), "VARCHAR(80)");

        let t = TypeTranslator::new(DbKind::Postgres, DbKind::Oracle);
        assert_eq!(t.translate(&col), "CLOB");
    }

    #[test]
    fn test_reverse_direction_number_is_bare() {
        let t = TypeTranslator::new(DbKind::Mssql, DbKind::Oracle);
        let col = ColumnDescriptor::new("AMOUNT", "decimal");
        assert_eq!(t.translate(&col), "NUMBER");
        let col = col.with_numeric(Some(12), Some(4));
        assert_eq!(t.translate(&col), "NUMBER(12, 4)");
    }

    #[test]
    fn test_same_kind_keeps_native_name() {
        let t = TypeTranslator::new(DbKind::Oracle, DbKind::Oracle);
        assert_eq!(t.translate(&number(Some(10), Some(2))), "NUMBER(10, 2)");
        assert_eq!(
            t.translate(&ColumnDescriptor::new("NAME", "VARCHAR2").with_length(50)),
            "VARCHAR2(50)"
        );
        assert_eq!(
            t.translate(&ColumnDescriptor::new("CREATED", "TIMESTAMP(6)").with_length(11)),
            "TIMESTAMP(6)"
        );
    }

    #[test]
    fn test_bare_target_types_drop_qualifier() {
        let t = TypeTranslator::new(DbKind::Oracle, DbKind::Postgres);
        let col = ColumnDescriptor::new("CREATED", "DATE").with_length(7);
        assert_eq!(t.translate(&col), "TIMESTAMP");

        let t = TypeTranslator::new(DbKind::Mysql, DbKind::Mssql);
        let col = ColumnDescriptor::new("ID", "int").with_numeric(Some(10), Some(0));
        assert_eq!(t.translate(&col), "INT");
    }

    #[test]
    fn test_translation_is_total_and_deterministic() {
        let natives = [
            "NUMBER",
            "VARCHAR2",
            "int",
            "nvarchar",
            "character varying",
            "DOUBLE PRECISION",
            "BLOB SUB_TYPE TEXT",
            "geometry",
            "",
        ];
        for source in DbKind::ALL {
            for target in DbKind::ALL {
                let t = TypeTranslator::new(source, target);
                for native in natives {
                    let col = ColumnDescriptor::new("C", native).with_length(-1);
                    let first = t.translate(&col);
                    assert_eq!(first, t.translate(&col));
                    assert!(!first.contains("None"), "{source}->{target}: {first}");
                    if source != target {
                        assert!(!first.is_empty(), "{source}->{target} for {native:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_type_map_preserves_column_order() {
        let t = TypeTranslator::new(DbKind::Oracle, DbKind::Mysql);
        let cols = vec![
            number(Some(9), Some(0)),
            ColumnDescriptor::new("NAME", "VARCHAR2").with_length(40),
        ];
        assert_eq!(
            t.type_map(&cols),
            vec![
                ("AMOUNT".to_string(), "BIGINT".to_string()),
                ("NAME".to_string(), "VARCHAR(40)".to_string()),
            ]
        );
    }
}
