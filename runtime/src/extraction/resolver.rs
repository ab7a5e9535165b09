//! First-match-wins resolution of logical attributes over raw product data.
//!
//! Upstream templates disagree on field names and shapes, so each attribute
//! is described as an ordered list of [`FieldRule`]s: a key path into the raw
//! mapping plus an [`Unwrap`] strategy for the value found there. The first
//! rule yielding a non-empty value wins.

use serde_json::Value;

use crate::product::RawProduct;

/// How a value found at a rule's path becomes the attribute value.
#[derive(Debug, Clone, Copy)]
pub enum Unwrap {
    /// Non-empty string.
    Text,
    /// Non-empty string, or a number rendered as text.
    TextOrNumber,
    /// Non-empty string, or the first non-empty string under `keys` of an object.
    TextOrObject(&'static [&'static str]),
    /// Number, or a string that parses as one.
    Number,
    /// As [`Unwrap::Number`], or the first numeric value under `keys` of an object.
    NumberOrObject(&'static [&'static str]),
    /// First usable element of an array: a non-empty string, or the first
    /// non-empty string under `keys` of an object element.
    FirstInArray(&'static [&'static str]),
}

/// One candidate location for an attribute.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub path: &'static [&'static str],
    pub unwrap: Unwrap,
}

pub const fn rule(path: &'static [&'static str], unwrap: Unwrap) -> FieldRule {
    FieldRule { path, unwrap }
}

const NAME: &[&str] = &["name"];

pub const NATIVE_ID: &[FieldRule] = &[
    rule(&["id"], Unwrap::TextOrNumber),
    rule(&["code"], Unwrap::TextOrNumber),
];

pub const BRAND: &[FieldRule] = &[
    rule(&["manufacturer"], Unwrap::TextOrObject(NAME)),
    rule(&["brand"], Unwrap::TextOrObject(NAME)),
    rule(&["brand_name"], Unwrap::TextOrObject(NAME)),
];

pub const TITLE: &[FieldRule] = &[
    rule(&["name"], Unwrap::TextOrNumber),
    rule(&["title"], Unwrap::TextOrNumber),
    rule(&["product_name"], Unwrap::TextOrNumber),
];

pub const CATEGORY: &[FieldRule] = &[
    rule(&["category"], Unwrap::Text),
    rule(&["main_category"], Unwrap::TextOrObject(&["name_en", "name"])),
];

pub const COLOR: &[FieldRule] = &[rule(&["color_en"], Unwrap::Text), rule(&["color"], Unwrap::Text)];

pub const PRICE: &[FieldRule] = &[rule(
    &["price"],
    Unwrap::NumberOrObject(&["value", "amount", "price"]),
)];

pub const CURRENCY: &[FieldRule] = &[
    rule(&["price", "currency_code"], Unwrap::Text),
    rule(&["price", "currency"], Unwrap::Text),
    rule(&["price", "code"], Unwrap::Text),
];

pub const DESCRIPTION: &[FieldRule] = &[rule(&["description"], Unwrap::Text)];

pub const GENDER: &[FieldRule] = &[rule(&["gender"], Unwrap::Text)];

pub const COUNTRY: &[FieldRule] = &[rule(&["country"], Unwrap::Text)];

pub const SOURCE: &[FieldRule] = &[rule(&["source"], Unwrap::Text)];

/// Used only when the pipeline supplies no image URL of its own.
pub const MAIN_IMAGE: &[FieldRule] = &[
    rule(&["image"], Unwrap::Text),
    rule(&["main_image"], Unwrap::Text),
    rule(&["primary_image"], Unwrap::Text),
    rule(&["images"], Unwrap::FirstInArray(&[])),
    rule(&["variants"], Unwrap::FirstInArray(&["image"])),
];

/// Follow `path` from the root of `raw`.
pub fn lookup<'a>(raw: &'a RawProduct, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter().try_fold(raw.get(first)?, |v, key| v.get(*key))
}

/// First non-empty text produced by `rules`.
pub fn resolve_text(raw: &RawProduct, rules: &[FieldRule]) -> Option<String> {
    rules
        .iter()
        .find_map(|r| lookup(raw, r.path).and_then(|v| unwrap_text(v, r.unwrap)))
}

/// First finite number produced by `rules`.
pub fn resolve_number(raw: &RawProduct, rules: &[FieldRule]) -> Option<f64> {
    rules
        .iter()
        .find_map(|r| lookup(raw, r.path).and_then(|v| unwrap_number(v, r.unwrap)))
}

fn non_empty(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_text_under(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| v.get(*k).and_then(non_empty))
}

fn unwrap_text(v: &Value, how: Unwrap) -> Option<String> {
    match how {
        Unwrap::Text => non_empty(v),
        Unwrap::TextOrNumber => match v {
            Value::Number(n) => Some(n.to_string()),
            other => non_empty(other),
        },
        Unwrap::TextOrObject(keys) => match v {
            Value::Object(_) => first_text_under(v, keys),
            other => non_empty(other),
        },
        Unwrap::FirstInArray(keys) => v.as_array()?.iter().find_map(|item| match item {
            Value::Object(_) => first_text_under(item, keys),
            other => non_empty(other),
        }),
        Unwrap::Number | Unwrap::NumberOrObject(_) => unwrap_number(v, how).map(|n| n.to_string()),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn unwrap_number(v: &Value, how: Unwrap) -> Option<f64> {
    match how {
        Unwrap::NumberOrObject(keys) => match v {
            Value::Object(_) => keys.iter().find_map(|k| v.get(*k).and_then(as_number)),
            other => as_number(other),
        },
        _ => as_number(v),
    }
}
