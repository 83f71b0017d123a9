//! Translation of query-string filters into canonical storage filters

use crate::core::error::RequestError;
use crate::core::filter::{Filter, FilterOp, SortKey};
use crate::core::value::Value;
use crate::request::{FilterGlyph, QueryFilter};

/// Canonical filters plus the in-memory sort to apply after fetching
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub filters: Vec<Filter>,
    pub after_sort: Vec<SortKey>,
}

pub struct FilterTranslator;

impl FilterTranslator {
    pub fn translate(filters: &[QueryFilter]) -> Result<Translation, RequestError> {
        let mut translation = Translation::default();
        for filter in filters {
            if filter.glyph == FilterGlyph::Equal && filter.field == "aftersort" {
                translation
                    .after_sort
                    .extend(SortKey::parse_list(filter.values.iter().map(String::as_str)));
                continue;
            }
            if let Some(canonical) = Self::translate_one(filter)? {
                translation.filters.push(canonical);
            }
        }
        Ok(translation)
    }

    fn translate_one(filter: &QueryFilter) -> Result<Option<Filter>, RequestError> {
        let field = filter.field.as_str();
        let raw = filter.values.last().map(String::as_str).unwrap_or_default();

        let op = match filter.glyph {
            FilterGlyph::Equal => return Ok(Self::translate_equal(field, &filter.values)),
            FilterGlyph::Regex => {
                let (op, pattern) = match raw.strip_prefix('!') {
                    Some(pattern) => (FilterOp::NotMatches, pattern),
                    None => (FilterOp::Matches, raw),
                };
                regex::Regex::new(pattern).map_err(|e| RequestError::InvalidFilter {
                    field: field.to_string(),
                    message: e.to_string(),
                })?;
                return Ok(Some(Filter::field(field, op, vec![Value::from(pattern)])));
            }
            FilterGlyph::Distance => {
                return Ok(Some(Filter::field(
                    field,
                    FilterOp::Distance,
                    Self::parse_distance(field, raw)?,
                )));
            }
            FilterGlyph::NotEqual => FilterOp::NotEqual,
            FilterGlyph::Contains => FilterOp::Contains,
            FilterGlyph::StartsWith => FilterOp::StartsWith,
            FilterGlyph::EndsWith => FilterOp::EndsWith,
            FilterGlyph::AtLeast => FilterOp::AtLeast,
            FilterGlyph::AtMost => FilterOp::AtMost,
        };

        let values = filter
            .values
            .iter()
            .flat_map(|v| v.split(','))
            .map(Value::from)
            .collect();
        Ok(Some(Filter::field(field, op, values)))
    }

    fn translate_equal(field: &str, values: &[String]) -> Option<Filter> {
        let last = values.last()?;
        Some(match field {
            "sort" => Filter::Sort(vec![SortKey::ascending(last.as_str())]),
            "sortDesc" => Filter::Sort(vec![SortKey::descending(last.as_str())]),
            "multisort" => Filter::Sort(SortKey::parse_list([last.as_str()])),
            _ if values.len() == 1 && last == "null" => Filter::is_null(field),
            _ => Filter::field(
                field,
                FilterOp::Equal,
                values.iter().map(|v| Value::from(v.as_str())).collect(),
            ),
        })
    }

    /// `lat,lng,maxDistance`
    fn parse_distance(field: &str, raw: &str) -> Result<Vec<Value>, RequestError> {
        let parts = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .ok()
            .filter(|parts| parts.len() == 3)
            .ok_or_else(|| RequestError::InvalidFilter {
                field: field.to_string(),
                message: format!("expected 'lat,lng,maxDistance', got '{}'", raw),
            })?;
        Ok(parts.into_iter().map(Value::Float).collect())
    }
}
