//! Home discovery in an arbitrary JSON tree
//!
//! `/api/homesdata` has been seen returning the home object at the root,
//! under `home`, under `body.home`, inside `homes[]`, or wrapped in generic
//! `data` / `result` / `body` envelopes. Rather than trusting one shape, the
//! whole tree is walked breadth first and every object carrying an id is
//! scored on how much it looks like a home.

use std::collections::{HashSet, VecDeque};

use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::client::{truncate, HOMESDATA_PATH};
use crate::error::{ApiResult, IntuisApiError};

/// Keys that hint at a home object, with their weight
const HINTS: &[(&str, i32)] = &[
    ("rooms", 4),
    ("modules", 3),
    ("therm_schedules", 3),
    ("schedules", 3),
    ("modules_bridged", 2),
    ("capabilities", 2),
    ("timezone", 1),
    ("city", 1),
    ("name", 1),
];

/// Bonus for an explicit `rooms` array
const ROOMS_ARRAY_BONUS: i32 = 5;

/// Envelope keys explored before anything else
const WRAPPER_KEYS: &[&str] = &["home", "body", "data", "result", "homes"];

/// Keys that may carry the home id, in order of preference
const ID_KEYS: &[&str] = &["id", "_id", "home_id"];

/// The id of an object, normalised to a non-empty string
///
/// The first of `id`, `_id`, `home_id` holding a truthy string or number is
/// used. Strings are trimmed and numbers stringified.
pub fn home_id_of(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    ID_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .filter(|v| is_truthy(v))
        .find_map(|raw| match raw {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|id| !id.is_empty())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// How much an object looks like a home
pub fn score_candidate(obj: &Map<String, Value>) -> i32 {
    let mut score = 0;
    for (key, weight) in HINTS {
        let counts = match obj.get(*key) {
            None | Some(Value::Null) => false,
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if counts {
            score += weight;
        }
    }
    if matches!(obj.get("rooms"), Some(Value::Array(_))) {
        score += ROOMS_ARRAY_BONUS;
    }
    score
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

/// Locate the most credible home object in `payload`
///
/// Ties keep the earliest candidate, unless the newcomer has `rooms` and the
/// current best does not.
pub fn extract_home(payload: &Value) -> ApiResult<&Value> {
    match payload {
        Value::Object(obj) => {
            debug!(keys = ?obj.keys().take(20).collect::<Vec<_>>(), "homesdata keys");
        }
        Value::Array(items) => debug!(len = items.len(), "homesdata is an array"),
        _ => {}
    }

    let mut queue: VecDeque<&Value> = VecDeque::from([payload]);
    let mut seen: HashSet<*const Value> = HashSet::new();
    let mut best: Option<(&Value, i32)> = None;

    while let Some(current) = queue.pop_front() {
        if !seen.insert(current as *const Value) {
            continue;
        }

        match current {
            Value::Object(obj) => {
                if home_id_of(current).is_some() {
                    let score = score_candidate(obj);
                    let better = match best {
                        None => true,
                        Some((best_value, best_score)) => {
                            score > best_score
                                || (score == best_score
                                    && obj.contains_key("rooms")
                                    && best_value.get("rooms").is_none())
                        }
                    };
                    if better {
                        best = Some((current, score));
                    }
                }

                for key in WRAPPER_KEYS {
                    if let Some(value) = obj.get(*key).filter(|v| is_container(v)) {
                        queue.push_front(value);
                    }
                }
                queue.extend(obj.values().filter(|v| is_container(v)));
            }
            Value::Array(items) => {
                queue.extend(items.iter().filter(|v| is_container(v)));
            }
            _ => {}
        }
    }

    match best {
        Some((home, score)) => {
            debug!(score, home_id = ?home_id_of(home), "Selected home candidate");
            Ok(home)
        }
        None => {
            error!(
                "homesdata without a detectable 'id'. Sample: {}",
                truncate(&payload.to_string(), 1000)
            );
            Err(IntuisApiError::schema(HOMESDATA_PATH, "key 'id' not found"))
        }
    }
}
