//! Canonical query-filter primitives handed to storage

use crate::core::value::Value;

/// Comparison applied by a field filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals any of the values
    Equal,
    /// Field is null; values are ignored
    IsNull,
    /// Field equals none of the values
    NotEqual,
    Contains,
    StartsWith,
    EndsWith,
    /// Field is at least every value
    AtLeast,
    /// Field is at most every value
    AtMost,
    /// Field matches the regular expression
    Matches,
    /// Field does not match the regular expression
    NotMatches,
    /// Field lies within `[lat, lng, maxDistance]`
    Distance,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Equal => "=",
            FilterOp::IsNull => "is null",
            FilterOp::NotEqual => "!=",
            FilterOp::Contains => "contains",
            FilterOp::StartsWith => "startsWith",
            FilterOp::EndsWith => "endsWith",
            FilterOp::AtLeast => ">=",
            FilterOp::AtMost => "<=",
            FilterOp::Matches => "~",
            FilterOp::NotMatches => "!~",
            FilterOp::Distance => "@",
        }
    }
}

/// One sort key of a `sort`/`multisort`/`aftersort` instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Parse a signed key: `>field` sorts descending, `<field` or a bare field
    /// ascending
    pub fn parse_signed(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let key = if let Some(field) = raw.strip_prefix('>') {
            Self::descending(field.trim())
        } else if let Some(field) = raw.strip_prefix('<') {
            Self::ascending(field.trim())
        } else {
            Self::ascending(raw)
        };
        (!key.field.is_empty()).then_some(key)
    }

    /// Parse a comma separated list of signed keys
    pub fn parse_list<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<Self> {
        values
            .into_iter()
            .flat_map(|v| v.split(','))
            .filter_map(Self::parse_signed)
            .collect()
    }
}

/// A canonical filter understood by storage collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field {
        field: String,
        op: FilterOp,
        values: Vec<Value>,
    },
    /// Ordered sort instruction
    Sort(Vec<SortKey>),
    MaxRowCount(usize),
    RowOffset(usize),
}

impl Filter {
    pub fn field(field: impl Into<String>, op: FilterOp, values: Vec<Value>) -> Self {
        Filter::Field {
            field: field.into(),
            op,
            values,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, FilterOp::Equal, vec![value.into()])
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::field(field, FilterOp::IsNull, Vec::new())
    }

    /// Field this filter constrains, if any
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Filter::Field { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn is_on(&self, name: &str) -> bool {
        self.field_name() == Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signed_keys() {
        assert_eq!(SortKey::parse_signed(">age"), Some(SortKey::descending("age")));
        assert_eq!(SortKey::parse_signed("<age"), Some(SortKey::ascending("age")));
        assert_eq!(SortKey::parse_signed("name"), Some(SortKey::ascending("name")));
        assert_eq!(SortKey::parse_signed(">"), None);
    }

    #[test]
    fn test_parse_list_splits_commas() {
        let keys = SortKey::parse_list([">score,name", "<id"]);
        assert_eq!(
            keys,
            vec![
                SortKey::descending("score"),
                SortKey::ascending("name"),
                SortKey::ascending("id"),
            ]
        );
    }

    #[test]
    fn test_filter_field_name() {
        assert!(Filter::equals("state", 1_i64).is_on("state"));
        assert!(!Filter::MaxRowCount(10).is_on("state"));
        assert_eq!(Filter::is_null("email").field_name(), Some("email"));
    }
}
