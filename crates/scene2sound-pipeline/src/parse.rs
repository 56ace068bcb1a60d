//! Turning raw vision-model text into a [`SoundSourceDescription`].
//!
//! Models wrap JSON in prose or code fences, or ignore the format and answer
//! with a bullet list. Recovery is attempted in this order:
//!
//! 1. the whole response as JSON;
//! 2. the body of a fenced code block;
//! 3. the outermost `{ ... }` span;
//! 4. bullet or numbered lines, one label each.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use scene2sound_types::{SoundSource, SoundSourceDescription, SoundVariant};

use crate::error::{PipelineError, Result};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex"));
static OBJECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));
static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").expect("valid regex"));

/// Keys accepted for the source list, in preference order.
const SOURCE_LIST_KEYS: [&str; 3] = ["sources", "sound_sources", "objects"];
/// Keys accepted for a source's label, in preference order.
const LABEL_KEYS: [&str; 3] = ["label", "name", "source"];

/// Parse a raw model response for `image_id`.
pub fn parse_response(image_id: &str, raw: &str) -> Result<SoundSourceDescription> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PipelineError::Parse("empty response".into()));
    }

    let mut last_error = None;
    for candidate in json_candidates(raw) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => match normalize_value(image_id, value) {
                Ok(desc) => return Ok(desc),
                Err(e) => last_error = Some(e),
            },
            Err(e) => last_error = Some(PipelineError::Parse(format!("invalid JSON: {e}"))),
        }
    }

    let labels = bullet_labels(raw);
    if !labels.is_empty() {
        tracing::debug!(image_id, count = labels.len(), "Recovered sources from list lines");
        let sources = labels.into_iter().map(SoundSource::labelled).collect();
        return Ok(SoundSourceDescription::new(image_id, sources));
    }

    Err(last_error
        .unwrap_or_else(|| PipelineError::Parse("no JSON object or list found in response".into())))
}

fn json_candidates(raw: &str) -> Vec<&str> {
    let mut candidates = vec![raw];
    if let Some(body) = FENCE_RE.captures(raw).and_then(|c| c.get(1)) {
        candidates.push(body.as_str().trim());
    }
    if let Some(object) = OBJECT_RE.find(raw) {
        candidates.push(object.as_str());
    }
    candidates.dedup();
    candidates
}

fn bullet_labels(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| BULLET_RE.captures(line))
        .filter_map(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
                .trim_end_matches(['.', ',', ';'])
                .trim()
                .to_string()
        })
        .filter(|label| !label.is_empty())
        .collect()
}

/// Normalise a JSON value into the artifact schema.
///
/// Accepts the canonical shape as well as `sound_sources`/`objects` for the
/// list and `name` for a label. The description's `image_id` is always
/// `image_id`. Sources without a label are dropped.
pub fn normalize_value(image_id: &str, value: Value) -> Result<SoundSourceDescription> {
    let mut map = match value {
        Value::Object(map) => map,
        Value::Array(items) => {
            let mut map = Map::new();
            map.insert("sources".into(), Value::Array(items));
            map
        }
        other => {
            return Err(PipelineError::Parse(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            )));
        }
    };

    let list = SOURCE_LIST_KEYS
        .iter()
        .find_map(|key| map.remove(*key))
        .ok_or_else(|| PipelineError::Parse("JSON object has no sound source list".into()))?;
    let items = match list {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(PipelineError::Parse(format!(
                "sound source list is {}, not an array",
                type_name(&other)
            )));
        }
    };

    let sources = items
        .into_iter()
        .filter_map(normalize_source)
        .collect();

    Ok(SoundSourceDescription {
        image_id: image_id.to_string(),
        scene_description: take_string(&mut map, "scene_description"),
        mood_description: take_string(&mut map, "mood_description"),
        sources,
    })
}

fn normalize_source(value: Value) -> Option<SoundSource> {
    let mut map = match value {
        Value::String(label) => {
            let label = label.trim();
            return (!label.is_empty()).then(|| SoundSource::labelled(label));
        }
        Value::Object(map) => map,
        _ => return None,
    };

    let label = LABEL_KEYS
        .iter()
        .find_map(|key| take_string(&mut map, key))?;
    for key in LABEL_KEYS {
        map.remove(key);
    }

    let material = take_string(&mut map, "material");
    let variants = match map.remove("variants") {
        Some(Value::Array(items)) => items.into_iter().filter_map(normalize_variant).collect(),
        _ => Vec::new(),
    };

    Some(SoundSource {
        label,
        material,
        variants,
        extra: map,
    })
}

fn normalize_variant(value: Value) -> Option<SoundVariant> {
    let mut map = match value {
        Value::String(method) => {
            return Some(SoundVariant {
                play_method: Some(method),
                ..Default::default()
            });
        }
        Value::Object(map) => map,
        _ => return None,
    };

    let play_method =
        take_string(&mut map, "play_method").or_else(|| take_string(&mut map, "action"));
    let timbre = match map.remove("timbre") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };
    let confidence = match map.remove("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    Some(SoundVariant {
        play_method,
        timbre,
        mapping_to_music_instrument: take_string(&mut map, "mapping_to_music_instrument"),
        confidence,
    })
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let s = s.trim().to_string();
            map.remove(key);
            Some(s)
        }
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
