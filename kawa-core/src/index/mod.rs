//! Search Indexes
//!
//! Typed query descriptors used by Read/Update/Delete to locate data.
//! Each variant is bound to the data kind it searches for; backends accept
//! only the variants they understand and return a typed error otherwise.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SearchIndex                          │
//! ├──────────────┬──────────────┬──────────────┬─────────────┤
//! │ Params       │ Path         │ Query        │ Vector      │
//! │ key/value    │ one address  │ native query │ similarity  │
//! │ filters      │ (object key) │ descriptor   │ search      │
//! └──────────────┴──────────────┴──────────────┴─────────────┘
//! ```

mod params;
mod path;
mod query;
mod vector;

pub use params::ParamIndex;
pub use path::PathIndex;
pub use query::{NativeQuery, QueryIndex};
pub use vector::VectorIndex;

use crate::value::DataKind;

/// A typed search descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchIndex {
    /// Key/value filters interpreted by the backend
    Params(ParamIndex),
    /// Single backend-native address
    Path(PathIndex),
    /// Opaque native query descriptor
    Query(QueryIndex),
    /// Free-text similarity search
    Vector(VectorIndex),
}

impl SearchIndex {
    /// Data kind this index searches for.
    ///
    /// `None` for `Query`: a native query's kind is resolved lazily by the
    /// backend from the query's target table, not stored on the index.
    #[must_use]
    pub fn data_kind(&self) -> Option<&DataKind> {
        match self {
            Self::Params(index) => Some(index.data_kind()),
            Self::Path(index) => Some(index.data_kind()),
            Self::Query(_) => None,
            Self::Vector(index) => Some(index.data_kind()),
        }
    }

    /// Variant name, for error messages.
    #[must_use]
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Params(_) => "params",
            Self::Path(_) => "path",
            Self::Query(_) => "query",
            Self::Vector(_) => "vector",
        }
    }
}

impl From<ParamIndex> for SearchIndex {
    fn from(index: ParamIndex) -> Self {
        Self::Params(index)
    }
}

impl From<PathIndex> for SearchIndex {
    fn from(index: PathIndex) -> Self {
        Self::Path(index)
    }
}

impl From<QueryIndex> for SearchIndex {
    fn from(index: QueryIndex) -> Self {
        Self::Query(index)
    }
}

impl From<VectorIndex> for SearchIndex {
    fn from(index: VectorIndex) -> Self {
        Self::Vector(index)
    }
}
