//! Query-string grammar: filters, reserved parameters and pagination

use crate::core::error::RequestError;
use crate::core::value::Value;
use indexmap::IndexMap;

/// Query parameters with a meaning of their own; never treated as filters
pub const RESERVED_PARAMETERS: &[&str] =
    &["fields", "expand", "limit", "offset", "returnTrueAsNull"];

/// Operator glyph trailing a filter field name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterGlyph {
    /// No glyph, or the `-` escape
    Equal,
    /// `!`
    NotEqual,
    /// `~`
    Regex,
    /// `^`
    StartsWith,
    /// `$`
    EndsWith,
    /// `*`
    Contains,
    /// `>`
    AtLeast,
    /// `<`
    AtMost,
    /// `@`
    Distance,
}

impl FilterGlyph {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            '-' => FilterGlyph::Equal,
            '!' => FilterGlyph::NotEqual,
            '~' => FilterGlyph::Regex,
            '^' => FilterGlyph::StartsWith,
            '$' => FilterGlyph::EndsWith,
            '*' => FilterGlyph::Contains,
            '>' => FilterGlyph::AtLeast,
            '<' => FilterGlyph::AtMost,
            '@' => FilterGlyph::Distance,
            _ => return None,
        })
    }
}

/// A filter as written in the query string
///
/// Equality filters on the same field are already coalesced: `values` holds the
/// OR-set. Other filters carry their raw value as a single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub field: String,
    pub glyph: FilterGlyph,
    pub values: Vec<String>,
}

/// Decode a raw query string into ordered pairs
///
/// A `+` stays a literal plus instead of decoding to a space.
pub fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.replace('+', "%2B").as_bytes())
        .into_owned()
        .collect()
}

/// Strip a `(n)` disambiguator, then split off the operator glyph
///
/// `name(1)` → (`Equal`, `name`), `age>` → (`AtLeast`, `age`),
/// `code-` → (`Equal`, `code`)
pub fn normalize_filter_name(name: &str) -> (FilterGlyph, String) {
    let name = strip_disambiguator(name);
    match name.chars().last().and_then(FilterGlyph::from_char) {
        Some(glyph) => (glyph, name[..name.len() - 1].to_string()),
        None => (FilterGlyph::Equal, name.to_string()),
    }
}

fn strip_disambiguator(name: &str) -> &str {
    if let Some(inner) = name.strip_suffix(')') {
        if let Some(open) = inner.rfind('(') {
            let digits = &inner[open + 1..];
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return &name[..open];
            }
        }
    }
    name
}

/// Build filters from non-reserved query pairs, coalescing equality filters
pub fn collect_filters(pairs: &[(String, String)]) -> Vec<QueryFilter> {
    let mut equal: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut others = Vec::new();

    for (name, value) in pairs {
        if RESERVED_PARAMETERS.contains(&name.as_str()) {
            continue;
        }
        let (glyph, field) = normalize_filter_name(name);
        if glyph == FilterGlyph::Equal {
            let values = equal.entry(field).or_default();
            match bracketed_list(value) {
                Some(items) => values.extend(items),
                None => values.push(value.clone()),
            }
        } else {
            others.push(QueryFilter {
                field,
                glyph,
                values: vec![value.clone()],
            });
        }
    }

    others.extend(equal.into_iter().map(|(field, values)| QueryFilter {
        field,
        glyph: FilterGlyph::Equal,
        values,
    }));
    others
}

/// `[a,b,c]` → `["a", "b", "c"]`
fn bracketed_list(value: &str) -> Option<Vec<String>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() {
        return None;
    }
    Some(inner.split(',').map(str::to_string).collect())
}

/// Query string value as an operation argument: `true`, `false` and `null`
/// become typed, anything else stays text
pub fn parameter_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        other => Value::Str(other.to_string()),
    }
}

/// Pagination requested by the client
///
/// `limit` is clamped to `0..=max_limit`, `offset` to non-negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Pagination {
    pub fn from_pairs(pairs: &[(String, String)], max_limit: usize) -> Result<Self, RequestError> {
        let mut pagination = Pagination::default();
        for (name, value) in pairs {
            match name.as_str() {
                "limit" => {
                    let limit = parse_bound("limit", value)?.clamp(0, max_limit as i64);
                    pagination.limit = Some(limit as usize);
                }
                "offset" => {
                    let offset = parse_bound("offset", value)?.max(0);
                    pagination.offset = Some(offset as usize);
                }
                _ => {}
            }
        }
        Ok(pagination)
    }

    /// Get limit, falling back to `default`
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }

    /// Get offset, defaulting to 0
    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

fn parse_bound(name: &str, value: &str) -> Result<i64, RequestError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| RequestError::InvalidArgument {
            argument: name.to_string(),
            message: format!("'{}' is not an integer", value),
        })
}
