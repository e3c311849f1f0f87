//! Value types flowing through deck generation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Difficulty tier. Declaration order is the fixed deck ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
    /// Highest tier; the only one whose model depends on the daily quota.
    Expert,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Beginner,
        Level::Intermediate,
        Level::Advanced,
        Level::Expert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
            Level::Expert => "expert",
        }
    }

    pub fn names() -> [&'static str; 4] {
        Self::ALL.map(Level::as_str)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for Level {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Level::ALL
            .into_iter()
            .find(|level| level.as_str() == key)
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

/// Planned sub-topics per level, always in [`Level::ALL`] order with every level present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Curriculum {
    levels: Vec<(Level, Vec<String>)>,
}

impl Curriculum {
    /// Build from a per-level lookup. Returns `None` when any level has no sub-topics.
    pub fn from_levels<F>(mut sub_topics_for: F) -> Option<Self>
    where
        F: FnMut(Level) -> Vec<String>,
    {
        let mut levels = Vec::with_capacity(Level::ALL.len());
        for level in Level::ALL {
            let subs = sub_topics_for(level);
            if subs.is_empty() {
                return None;
            }
            levels.push((level, subs));
        }
        Some(Self { levels })
    }

    /// One synthetic sub-topic per level, used when planning fails.
    pub fn fallback(topic: &str) -> Self {
        Self {
            levels: Level::ALL
                .into_iter()
                .map(|level| (level, vec![format!("{topic} {level} concept")]))
                .collect(),
        }
    }

    pub fn levels(&self) -> &[(Level, Vec<String>)] {
        &self.levels
    }

    pub fn sub_topics(&self, level: Level) -> &[String] {
        self.levels
            .iter()
            .find(|(l, _)| *l == level)
            .map(|(_, subs)| subs.as_slice())
            .unwrap_or(&[])
    }

    /// One task per (level, sub-topic), in level order.
    pub fn tasks(&self, language: &str) -> Vec<GenerationTask> {
        self.levels
            .iter()
            .flat_map(|(level, subs)| {
                subs.iter().map(move |sub| GenerationTask {
                    level: *level,
                    sub_topic: sub.clone(),
                    language: language.to_string(),
                })
            })
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.levels.iter().map(|(_, subs)| subs.len()).sum()
    }
}

/// One unit of concurrent work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub level: Level,
    pub sub_topic: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Ok,
    /// Produced by the last-resort fallback model.
    NeedsReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
    pub generated_by_model: String,
    pub quality_flag: QualityFlag,
    pub level: Level,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGroup {
    pub level: Level,
    pub cards: Vec<Flashcard>,
}

/// Final leveled output of one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub topic: String,
    pub original_input: String,
    pub language: String,
    pub total_cards: usize,
    pub cards: Vec<LevelGroup>,
}

impl Deck {
    /// Group cards by level. Every level appears, in fixed order, even when empty.
    pub fn assemble(
        topic: impl Into<String>,
        original_input: impl Into<String>,
        language: impl Into<String>,
        cards: Vec<Flashcard>,
    ) -> Self {
        let total_cards = cards.len();
        let mut groups: Vec<LevelGroup> = Level::ALL
            .into_iter()
            .map(|level| LevelGroup {
                level,
                cards: Vec::new(),
            })
            .collect();
        for card in cards {
            if let Some(group) = groups.iter_mut().find(|g| g.level == card.level) {
                group.cards.push(card);
            }
        }
        Self {
            topic: topic.into(),
            original_input: original_input.into(),
            language: language.into(),
            total_cards,
            cards: groups,
        }
    }

    /// Copy without empty level groups, for display.
    pub fn without_empty_levels(&self) -> Self {
        Self {
            cards: self
                .cards
                .iter()
                .filter(|g| !g.cards.is_empty())
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    pub fn cards_in(&self, level: Level) -> &[Flashcard] {
        self.cards
            .iter()
            .find(|g| g.level == level)
            .map(|g| g.cards.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter_cards(&self) -> impl Iterator<Item = &Flashcard> {
        self.cards.iter().flat_map(|g| g.cards.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(level: Level, front: &str) -> Flashcard {
        Flashcard {
            front: front.to_string(),
            back: "b".to_string(),
            generated_by_model: "m".to_string(),
            quality_flag: QualityFlag::Ok,
            level,
        }
    }

    #[test]
    fn level_parsing_is_case_insensitive() {
        assert_eq!("Expert".parse::<Level>().unwrap(), Level::Expert);
        assert_eq!(" beginner ".parse::<Level>().unwrap(), Level::Beginner);
        assert!("iniciante".parse::<Level>().is_err());
    }

    #[test]
    fn fallback_curriculum_has_every_level() {
        let c = Curriculum::fallback("Rust");
        assert_eq!(c.levels().len(), 4);
        assert_eq!(c.sub_topics(Level::Advanced), ["Rust advanced concept"]);
        assert_eq!(c.task_count(), 4);
    }

    #[test]
    fn tasks_expand_in_level_order() {
        let c = Curriculum::from_levels(|l| vec![format!("{l}-1"), format!("{l}-2")]).unwrap();
        let tasks = c.tasks("en");
        assert_eq!(tasks.len(), 8);
        assert_eq!(tasks[0].level, Level::Beginner);
        assert_eq!(tasks[7].sub_topic, "expert-2");
        assert!(tasks.iter().all(|t| t.language == "en"));
    }

    #[test]
    fn from_levels_rejects_empty_level() {
        let c = Curriculum::from_levels(|l| {
            if l == Level::Advanced {
                Vec::new()
            } else {
                vec!["x".into()]
            }
        });
        assert!(c.is_none());
    }

    #[test]
    fn assemble_groups_regardless_of_arrival_order() {
        let deck = Deck::assemble(
            "t",
            "raw",
            "en",
            vec![
                card(Level::Expert, "e1"),
                card(Level::Beginner, "b1"),
                card(Level::Expert, "e2"),
            ],
        );
        assert_eq!(deck.total_cards, 3);
        let order: Vec<Level> = deck.cards.iter().map(|g| g.level).collect();
        assert_eq!(order, Level::ALL.to_vec());
        assert_eq!(deck.cards_in(Level::Expert).len(), 2);
        assert!(deck.cards_in(Level::Advanced).is_empty());
        assert_eq!(deck.iter_cards().count(), deck.total_cards);
    }

    #[test]
    fn without_empty_levels_keeps_total() {
        let deck = Deck::assemble("t", "raw", "en", vec![card(Level::Intermediate, "i")]);
        let shown = deck.without_empty_levels();
        assert_eq!(shown.cards.len(), 1);
        assert_eq!(shown.total_cards, 1);
    }

    #[test]
    fn deck_serializes_to_wire_shape() {
        let mut c = card(Level::Beginner, "f");
        c.quality_flag = QualityFlag::NeedsReview;
        let deck = Deck::assemble("Python", "I want Python", "en", vec![c]);
        let json = serde_json::to_value(&deck).unwrap();
        assert_eq!(json["topic"], "Python");
        assert_eq!(json["original_input"], "I want Python");
        assert_eq!(json["total_cards"], 1);
        assert_eq!(json["cards"][0]["level"], "beginner");
        assert_eq!(json["cards"][0]["cards"][0]["quality_flag"], "needs_review");
    }
}
