//! Metadata filter expressions
//!
//! A filter is split in two before a collection is queried: the part the
//! backend's `where` language can evaluate natively (equality, membership and
//! boolean combinations of those) and a residue evaluated client-side over the
//! returned chunks (substring matches, and any `Or` with a non-native branch).

use sdk::types::ChunkMetadata;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    /// `key == value`
    Eq { key: String, value: String },

    /// `key` is one of `values`
    In { key: String, values: Vec<String> },

    /// `key` contains `needle`, case-insensitively
    Contains { key: String, needle: String },

    And(Vec<MetadataFilter>),
    Or(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Membership filter. A single value collapses to `Eq`.
    pub fn one_of(key: impl Into<String>, values: Vec<String>) -> Self {
        let key = key.into();
        if values.len() == 1 {
            Self::Eq {
                key,
                value: values.into_iter().next().unwrap_or_default(),
            }
        } else {
            Self::In { key, values }
        }
    }

    pub fn contains(key: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains {
            key: key.into(),
            needle: needle.into(),
        }
    }

    /// Conjunction of the given filters, flattening the trivial cases.
    pub fn all(filters: Vec<MetadataFilter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.into_iter().next(),
            _ => Some(Self::And(filters)),
        }
    }

    /// Whether the backend query language can evaluate this filter.
    pub fn is_native(&self) -> bool {
        match self {
            Self::Eq { .. } | Self::In { .. } => true,
            Self::Contains { .. } => false,
            Self::And(children) | Self::Or(children) => children.iter().all(Self::is_native),
        }
    }

    /// Split into `(native, residue)`.
    ///
    /// A conjunction is split child by child; anything else goes wholesale to
    /// one side. `native AND residue` is equivalent to the original filter.
    pub fn split_native(self) -> (Option<Self>, Option<Self>) {
        match self {
            Self::And(children) => {
                let (native, residue): (Vec<_>, Vec<_>) =
                    children.into_iter().partition(Self::is_native);
                (Self::all(native), Self::all(residue))
            }
            other if other.is_native() => (Some(other), None),
            other => (None, Some(other)),
        }
    }

    /// Evaluate the filter against chunk metadata.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match self {
            Self::Eq { key, value } => metadata.field(key).is_some_and(|v| &v == value),
            Self::In { key, values } => metadata.field(key).is_some_and(|v| values.contains(&v)),
            Self::Contains { key, needle } => metadata
                .field(key)
                .is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase())),
            Self::And(children) => children.iter().all(|c| c.matches(metadata)),
            Self::Or(children) => children.iter().any(|c| c.matches(metadata)),
        }
    }

    /// Render as a Chroma `where` clause. Only meaningful for native filters;
    /// a `Contains` node renders as `null`.
    pub fn to_chroma_where(&self) -> Value {
        match self {
            Self::Eq { key, value } => json!({ key.as_str(): { "$eq": value } }),
            Self::In { key, values } => json!({ key.as_str(): { "$in": values } }),
            Self::Contains { .. } => Value::Null,
            Self::And(children) => combine("$and", children),
            Self::Or(children) => combine("$or", children),
        }
    }
}

// Chroma rejects `$and` / `$or` with fewer than two operands
fn combine(op: &str, children: &[MetadataFilter]) -> Value {
    match children {
        [] => json!({}),
        [only] => only.to_chroma_where(),
        many => json!({ op: many.iter().map(MetadataFilter::to_chroma_where).collect::<Vec<_>>() }),
    }
}

/// Filter over a semantic search: which collections to ask, and which chunks
/// to keep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Restrict the search to these collections; `None` means all
    pub collections: Option<Vec<String>>,

    pub metadata: Option<MetadataFilter>,
}

impl SearchFilter {
    pub fn includes_collection(&self, name: &str) -> bool {
        self.collections
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == name))
    }
}

/// `path ∈ paths`, or nothing for an empty list.
pub fn path_filter(paths: &[String]) -> Option<MetadataFilter> {
    if paths.is_empty() {
        None
    } else {
        Some(MetadataFilter::one_of("path", paths.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str, class: Option<&str>, method: Option<&str>) -> ChunkMetadata {
        ChunkMetadata {
            path: path.into(),
            class_name: class.map(Into::into),
            method_name: method.map(Into::into),
            language: Some("python".into()),
            start_line: 1,
            end_line: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_matches() {
        let m = meta("src/foo.py", Some("FooService"), Some("run"));

        assert!(MetadataFilter::eq("path", "src/foo.py").matches(&m));
        assert!(!MetadataFilter::eq("path", "src/bar.py").matches(&m));
        assert!(MetadataFilter::one_of("language", vec!["rust".into(), "python".into()])
            .matches(&m));
        assert!(MetadataFilter::contains("class_name", "fooserv").matches(&m));
        assert!(!MetadataFilter::contains("symbol_name", "foo").matches(&m));
        assert!(MetadataFilter::Or(vec![
            MetadataFilter::eq("path", "nope"),
            MetadataFilter::contains("method_name", "RU"),
        ])
        .matches(&m));
    }

    #[test]
    fn test_split_conjunction() {
        let filter = MetadataFilter::And(vec![
            MetadataFilter::eq("path", "a.py"),
            MetadataFilter::contains("class_name", "Foo"),
            MetadataFilter::one_of("language", vec!["python".into(), "go".into()]),
        ]);

        let (native, residue) = filter.split_native();
        assert_eq!(
            native,
            Some(MetadataFilter::And(vec![
                MetadataFilter::eq("path", "a.py"),
                MetadataFilter::In {
                    key: "language".into(),
                    values: vec!["python".into(), "go".into()]
                },
            ]))
        );
        assert_eq!(residue, Some(MetadataFilter::contains("class_name", "Foo")));
    }

    #[test]
    fn test_or_with_non_native_child_is_residue() {
        let filter = MetadataFilter::Or(vec![
            MetadataFilter::eq("path", "a.py"),
            MetadataFilter::contains("symbol_name", "Foo"),
        ]);
        let (native, residue) = filter.clone().split_native();
        assert_eq!(native, None);
        assert_eq!(residue, Some(filter));
    }

    #[test]
    fn test_chroma_where_rendering() {
        assert_eq!(
            MetadataFilter::eq("path", "a.py").to_chroma_where(),
            json!({"path": {"$eq": "a.py"}})
        );

        let filter = MetadataFilter::And(vec![
            MetadataFilter::eq("path", "a.py"),
            MetadataFilter::one_of("chunk_type", vec!["class".into(), "method".into()]),
        ]);
        assert_eq!(
            filter.to_chroma_where(),
            json!({"$and": [
                {"path": {"$eq": "a.py"}},
                {"chunk_type": {"$in": ["class", "method"]}}
            ]})
        );
    }

    #[test]
    fn test_path_filter() {
        assert_eq!(path_filter(&[]), None);
        assert_eq!(
            path_filter(&["a.py".to_string()]),
            Some(MetadataFilter::eq("path", "a.py"))
        );
    }

    #[test]
    fn test_search_filter_collections() {
        let all = SearchFilter::default();
        assert!(all.includes_collection("backend"));

        let some = SearchFilter {
            collections: Some(vec!["frontend".into()]),
            metadata: None,
        };
        assert!(some.includes_collection("frontend"));
        assert!(!some.includes_collection("backend"));
    }
}
