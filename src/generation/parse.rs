//! Parsing structured model output.
//!
//! Models are asked for JSON but sometimes wrap it in prose or code fences, so
//! every parser first isolates the outermost object with [`extract_json`].

use std::collections::BTreeMap;

use serde::Deserialize;

use super::types::Level;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing or empty field: {0}")]
    Missing(&'static str),
    #[error("unexpected curriculum key: {0}")]
    UnknownLevel(String),
    #[error("curriculum level {0} has no sub-topics")]
    EmptyLevel(Level),
    #[error("curriculum level {0} appears more than once")]
    DuplicateLevel(Level),
    #[error("curriculum level {level} has {found} sub-topics, expected {expected}")]
    WrongCount {
        level: Level,
        expected: usize,
        found: usize,
    },
    #[error("card {index} is malformed")]
    MalformedCard { index: usize },
}

/// Extract the first balanced JSON object from raw model text.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return &trimmed[..end];
        }
    }

    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        if let Some(end) = find_matching_brace(remainder) {
            return &remainder[..end];
        }
    }

    trimmed
}

/// Byte offset just past the brace closing the first `{`, ignoring braces inside strings.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct TopicPayload {
    topic: Option<String>,
}

/// The `topic` field of an intent response, trimmed. Blank topics are an error.
pub fn parse_topic(raw: &str) -> Result<String, ParseError> {
    let payload: TopicPayload = serde_json::from_str(extract_json(raw))?;
    payload
        .topic
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::Missing("topic"))
}

/// Level name to sub-topics.
///
/// Keys must be exactly the fixed level names, each once (case-insensitive).
/// Every level needs exactly `per_level` non-blank sub-topics.
pub fn parse_curriculum(
    raw: &str,
    per_level: usize,
) -> Result<BTreeMap<Level, Vec<String>>, ParseError> {
    let payload: BTreeMap<String, Vec<String>> = serde_json::from_str(extract_json(raw))?;

    let mut out = BTreeMap::new();
    for (key, subs) in payload {
        let level: Level = key
            .parse()
            .map_err(|_| ParseError::UnknownLevel(key.clone()))?;
        if out.contains_key(&level) {
            return Err(ParseError::DuplicateLevel(level));
        }
        let subs: Vec<String> = subs
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if subs.is_empty() {
            return Err(ParseError::EmptyLevel(level));
        }
        if subs.len() != per_level {
            return Err(ParseError::WrongCount {
                level,
                expected: per_level,
                found: subs.len(),
            });
        }
        out.insert(level, subs);
    }

    if let Some(missing) = Level::ALL.into_iter().find(|l| !out.contains_key(l)) {
        return Err(ParseError::EmptyLevel(missing));
    }
    Ok(out)
}

/// Front/back text of one generated card, before stamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCard {
    pub front: String,
    pub back: String,
}

#[derive(Deserialize)]
struct CardsPayload {
    cards: Option<Vec<CardPayload>>,
}

#[derive(Deserialize)]
struct CardPayload {
    front: Option<String>,
    back: Option<String>,
}

/// The `cards` array of a builder response, at most `max_cards` long.
///
/// All-or-nothing: one card without a non-blank front and back rejects the
/// whole batch. An empty array is valid and yields no cards. Cards past
/// `max_cards` are dropped unchecked.
pub fn parse_cards(raw: &str, max_cards: usize) -> Result<Vec<RawCard>, ParseError> {
    let payload: CardsPayload = serde_json::from_str(extract_json(raw))?;
    let cards = payload.cards.ok_or(ParseError::Missing("cards"))?;

    cards
        .into_iter()
        .take(max_cards)
        .enumerate()
        .map(|(index, card)| {
            let front = card.front.map(|s| s.trim().to_string()).unwrap_or_default();
            let back = card.back.map(|s| s.trim().to_string()).unwrap_or_default();
            if front.is_empty() || back.is_empty() {
                return Err(ParseError::MalformedCard { index });
            }
            Ok(RawCard { front, back })
        })
        .collect()
}
