//! Prompt templates for intent extraction, curriculum planning and card generation.
//!
//! Domain logic only. Rendering is provider-agnostic and produces a
//! [`PromptInstance`] the callers turn into chat messages.

use crate::gateway::Message;

/// Rendered prompt ready for a model.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// Escape XML special characters so user text cannot close the wrapping tags.
fn escape_xml_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A prompt template with `{placeholder}` slots.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    /// Substitute every `(name, value)` pair. Values are escaped; template text is not.
    pub fn render(&self, vars: &[(&str, &str)]) -> PromptInstance {
        let mut system = self.system.to_string();
        let mut user = self.user.to_string();
        for (name, value) in vars {
            let key = format!("{{{name}}}");
            let safe = escape_xml_chars(value.trim());
            system = system.replace(&key, &safe);
            user = user.replace(&key, &safe);
        }
        PromptInstance {
            template_slug: self.slug,
            system: system.trim().to_string(),
            user: user.trim().to_string(),
        }
    }
}

pub const INTENT_PROMPT: PromptTemplate = PromptTemplate {
    slug: "intent_v1",
    system: r#"You extract the main educational subject from what a learner typed.
Remove filler words. Keep it concise (1-5 words).
Output only valid JSON: {"topic": "Extracted Topic"}"#,
    user: r#"<user_input>
{input}
</user_input>

json:"#,
};

pub const CURRICULUM_PROMPT: PromptTemplate = PromptTemplate {
    slug: "curriculum_v1",
    system: r#"You are an expert professor designing a structured flashcard curriculum.
Divide the subject into exactly these levels: {levels}.
For EACH level, list exactly {count} specific sub-topics, written in {language}.
Output only valid JSON whose keys are the level names and whose values are arrays of sub-topic strings."#,
    user: r#"<topic>
{topic}
</topic>

json:"#,
};

pub const FLASHCARD_PROMPT: PromptTemplate = PromptTemplate {
    slug: "flashcards_v1",
    system: r#"You write high-quality study flashcards.
Create exactly {count} flashcards in {language} at {level} difficulty.
Output only valid JSON: {"cards": [{"front": "...", "back": "..."}]}"#,
    user: r#"<sub_topic>
{sub_topic}
</sub_topic>

json:"#,
};

pub fn intent_prompt(raw_input: &str) -> PromptInstance {
    INTENT_PROMPT.render(&[("input", raw_input)])
}

pub fn curriculum_prompt(
    topic: &str,
    language: &str,
    levels: &[&str],
    sub_topics: usize,
) -> PromptInstance {
    let levels = levels.join(", ");
    let count = sub_topics.to_string();
    CURRICULUM_PROMPT.render(&[
        ("topic", topic),
        ("language", language),
        ("levels", &levels),
        ("count", &count),
    ])
}

pub fn flashcard_prompt(
    sub_topic: &str,
    level: &str,
    language: &str,
    cards: usize,
) -> PromptInstance {
    let count = cards.to_string();
    FLASHCARD_PROMPT.render(&[
        ("sub_topic", sub_topic),
        ("level", level),
        ("language", language),
        ("count", &count),
    ])
}
