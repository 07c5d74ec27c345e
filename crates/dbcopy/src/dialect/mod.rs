//! Dialect-neutral type vocabulary and cross-dialect type translation.
//!
//! - [`TypeFamily`] / [`LengthSpec`]: the canonical hub every dialect maps
//!   its native types through
//! - [`TypeTranslator`]: source column metadata to target DDL type strings
//!
//! ```rust,ignore
//! let translator = TypeTranslator::new(DbKind::Oracle, DbKind::Mssql);
//! let ddl = translator.type_map(&columns);
//! ```

mod canonical;
mod typemap;

pub use canonical::{LengthSpec, TypeFamily};
pub use typemap::{CorrectionRule, TargetType, TypeTranslator};
