//! Best-effort extraction of food items from a model reply.
//!
//! Models are asked for a bare JSON array but routinely wrap it in prose,
//! markdown fences or reasoning blocks. This module finds the JSON, then
//! decodes each element strictly against `{name, calories, protein?, serving?}`.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::FoodEstimate;
use crate::log::model::MAX_FOOD_CALORIES;

/// Upper bound on candidate brackets tried before giving up.
const MAX_CANDIDATES: usize = 32;

const WRAPPER_KEYS: [&str; 4] = ["foods", "items", "food_items", "results"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("reply was empty")]
    Empty,
    #[error("reply contains no JSON")]
    NoJson,
    #[error("reply JSON is neither a list of foods nor a food object")]
    UnexpectedShape,
    #[error("item {index}: {reason}")]
    InvalidItem { index: usize, reason: String },
}

lazy_static! {
    static ref THINK_RE: Regex = Regex::new(r"(?is)<think>.*?(?:</think>|$)").unwrap();
    static ref FENCE_RE: Regex = Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"-?\d+(?:[.,]\d+)*").unwrap();
    static ref THOUSANDS_RE: Regex = Regex::new(r"^-?\d{1,3}(?:,\d{3})+(?:\.\d+)?$").unwrap();
}

pub fn parse_food_reply(reply: &str) -> Result<Vec<FoodEstimate>, ParseError> {
    let cleaned = clean(reply);
    if cleaned.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let value = locate_json(&cleaned).ok_or(ParseError::NoJson)?;
    let elements = elements_of(value)?;
    elements
        .iter()
        .enumerate()
        .map(|(index, v)| decode_item(index, v))
        .collect()
}

fn clean(reply: &str) -> String {
    let without_think = THINK_RE.replace_all(reply, "");
    match FENCE_RE
        .captures_iter(&without_think)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .find(|body| body.starts_with('[') || body.starts_with('{'))
    {
        Some(body) => body.to_string(),
        None => without_think.replace("```", ""),
    }
}

fn locate_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v @ (Value::Array(_) | Value::Object(_))) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    ['[', '{'].iter().find_map(|&open| {
        text.match_indices(open)
            .take(MAX_CANDIDATES)
            .filter_map(|(start, _)| {
                let end = balanced_end(text, start)?;
                serde_json::from_str::<Value>(&text[start..end]).ok()
            })
            .next()
    })
}

/// Byte offset one past the bracket closing the one at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn elements_of(value: Value) -> Result<Vec<Value>, ParseError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(items)) = obj.remove(key) {
                    return Ok(items);
                }
            }
            if obj.contains_key("name") {
                Ok(vec![Value::Object(obj)])
            } else {
                Err(ParseError::UnexpectedShape)
            }
        }
        _ => Err(ParseError::UnexpectedShape),
    }
}

fn decode_item(index: usize, value: &Value) -> Result<FoodEstimate, ParseError> {
    let invalid = |reason: &str| ParseError::InvalidItem {
        index,
        reason: reason.to_string(),
    };
    let obj = value.as_object().ok_or_else(|| invalid("not an object"))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("missing name"))?;

    let calories = field(obj, &["calories", "kcal", "calorie"])
        .ok_or_else(|| invalid("missing calories"))?;
    let calories = coerce_number(calories).ok_or_else(|| invalid("calories is not a number"))?;
    if calories < 0.0 {
        return Err(invalid("calories is negative"));
    }
    if calories.round() > f64::from(MAX_FOOD_CALORIES) {
        return Err(invalid("calories out of range"));
    }

    let protein = field(obj, &["protein", "protein_g"])
        .and_then(coerce_number)
        .filter(|p| *p >= 0.0)
        .map(|p| (p * 10.0).round() / 10.0);

    let serving = field(obj, &["serving", "serving_size", "portion"]).and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Ok(FoodEstimate {
        name: name.to_string(),
        calories: calories.round() as u32,
        protein,
        serving,
    })
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .filter(|v| !v.is_null())
}

/// Numbers pass through; strings like `"95"`, `"1,200 kcal"` or `"12,5g"`
/// yield their first numeric run.
fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => NUMBER_RE.find(s).and_then(|m| parse_numeric_run(m.as_str())),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// `1,200` and `2,000.5` are grouped thousands; otherwise a single `,` is a
/// decimal comma and anything after a second separator is dropped.
fn parse_numeric_run(run: &str) -> Option<f64> {
    if THOUSANDS_RE.is_match(run) {
        return run.replace(',', "").parse().ok();
    }
    let end = run
        .match_indices(|c: char| c == '.' || c == ',')
        .nth(1)
        .map_or(run.len(), |(i, _)| i);
    run[..end].replace(',', ".").parse().ok()
}
