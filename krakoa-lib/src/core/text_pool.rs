use serde::{Deserialize, Serialize};

use std::collections::HashMap;

use super::TextIdx;

/// deduplicated strings in first-seen order. In json it is just the list of strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct TextPool {
    strings: Vec<String>,
    index: HashMap<String, usize>,
}

impl TextPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// returns the index of `s`, adding it first if it's new
    pub fn intern(&mut self, s: &str) -> TextIdx {
        if let Some(idx) = self.index.get(s) {
            return TextIdx(*idx);
        }
        let idx = self.strings.len();
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), idx);
        TextIdx(idx)
    }

    pub fn get(&self, idx: TextIdx) -> Option<&str> {
        self.strings.get(idx.0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for TextPool {
    fn from(strings: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(strings.len());
        for (i, s) in strings.iter().enumerate() {
            // a hand written pool may contain duplicates, the first one is canonical
            index.entry(s.clone()).or_insert(i);
        }
        Self { strings, index }
    }
}

impl From<TextPool> for Vec<String> {
    fn from(pool: TextPool) -> Self {
        pool.strings
    }
}
