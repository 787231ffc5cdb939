//! The instruction kinds. Each opcode is written as a single glyph in scripts and in the
//! program json. Glyphs that are not known to the vm parse into [`OpCode::Unknown`], they
//! are kept so plugins can claim them later.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OpCode {
    #[strum(serialize = "📑")]
    Fragment,
    #[strum(serialize = "🧠")]
    Concept,
    #[strum(serialize = "👤")]
    Entity,
    #[strum(serialize = "📦")]
    Collection,
    #[strum(serialize = "📂")]
    Content,
    #[strum(serialize = "🧬")]
    Logic,
    #[strum(serialize = "🔓")]
    Asset,
    #[strum(serialize = "📌")]
    State,
    #[strum(serialize = "🧩")]
    Stance,
    #[strum(serialize = "⌛", serialize = "⏳")]
    Time,
    #[strum(serialize = "🛡️", serialize = "🛡")]
    Shield,
    #[strum(serialize = "🩺")]
    Utility,
    #[strum(serialize = "💉")]
    Function,
    #[strum(serialize = "🚀")]
    Action,
    #[strum(serialize = "🎭")]
    Intent,
    #[strum(serialize = "🔱")]
    Authority,
    #[strum(serialize = "🤝")]
    Alliance,
    #[strum(serialize = "⚔️", serialize = "⚔")]
    Conflict,

    /// starts (or re-enters) a trigger scope
    #[strum(serialize = "➔", serialize = "->")]
    Trigger,
    /// conditional block
    #[strum(serialize = "⚓", serialize = "⚓️")]
    Anchor,
    #[strum(serialize = "🔗")]
    Link,
    #[strum(serialize = "💬")]
    Speech,
    #[strum(serialize = "📡")]
    Signal,

    #[strum(default)]
    Unknown(String),
}

impl OpCode {
    /// the canonical glyph, which is also what the program json contains
    pub fn glyph(&self) -> &str {
        use OpCode::*;
        match self {
            Fragment => "📑",
            Concept => "🧠",
            Entity => "👤",
            Collection => "📦",
            Content => "📂",
            Logic => "🧬",
            Asset => "🔓",
            State => "📌",
            Stance => "🧩",
            Time => "⌛",
            Shield => "🛡️",
            Utility => "🩺",
            Function => "💉",
            Action => "🚀",
            Intent => "🎭",
            Authority => "🔱",
            Alliance => "🤝",
            Conflict => "⚔️",
            Trigger => "➔",
            Anchor => "⚓",
            Link => "🔗",
            Speech => "💬",
            Signal => "📡",
            Unknown(glyph) => glyph,
        }
    }

    /// data kinds, handled by pushing a context frame
    pub fn is_contextual(&self) -> bool {
        use OpCode::*;
        matches!(
            self,
            Fragment
                | Concept
                | Entity
                | Collection
                | Content
                | Logic
                | Asset
                | State
                | Stance
                | Time
                | Shield
                | Utility
                | Function
                | Action
                | Intent
                | Authority
                | Alliance
                | Conflict
        )
    }

    /// unknown glyphs end up in [`OpCode::Unknown`]
    pub fn from_glyph(glyph: &str) -> Self {
        glyph
            .parse()
            .unwrap_or_else(|_| OpCode::Unknown(glyph.to_owned()))
    }

    /// opcodes whose `next` holds `[body-entry, exit]`
    pub fn is_branching(&self) -> bool {
        matches!(self, OpCode::Trigger | OpCode::Anchor)
    }
}

impl From<String> for OpCode {
    fn from(glyph: String) -> Self {
        Self::from_glyph(&glyph)
    }
}

impl From<OpCode> for String {
    fn from(op: OpCode) -> Self {
        op.glyph().into()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion() {
        assert_eq!(OpCode::from_glyph("👤"), OpCode::Entity);
        assert_eq!(OpCode::from_glyph("->"), OpCode::Trigger);
        assert_eq!(OpCode::from_glyph("🛡"), OpCode::Shield);
        assert_eq!(OpCode::from_glyph("🧪"), OpCode::Unknown("🧪".into()));
        assert_eq!(String::from(OpCode::Unknown("🧪".into())), "🧪");
        assert_eq!(OpCode::from(String::from("📡")), OpCode::Signal);
        assert_eq!(OpCode::from_glyph(OpCode::Shield.glyph()), OpCode::Shield);
    }

    #[test]
    fn test_json() {
        let json = serde_json::to_string(&OpCode::Trigger).unwrap();
        assert_eq!(json, "\"➔\"");
        let op: OpCode = serde_json::from_str("\"📡\"").unwrap();
        assert_eq!(op, OpCode::Signal);
    }

    #[test]
    fn test_kinds() {
        assert!(OpCode::Conflict.is_contextual());
        assert!(!OpCode::Link.is_contextual());
        assert!(OpCode::Anchor.is_branching());
        assert!(!OpCode::Unknown("x".into()).is_contextual());
    }
}
