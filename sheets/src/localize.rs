use std::collections::HashMap;

/// Localized messages by code. Codes without a message render as themselves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalizationMap {
    messages: HashMap<String, String>,
}

impl LocalizationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<'a>(&'a self, code: &'a str) -> &'a str {
        self.messages.get(code).map(String::as_str).unwrap_or(code)
    }

    pub fn insert(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.messages.insert(code.into(), message.into());
    }

    /// Entries of `other` win over existing ones.
    pub fn merge(&mut self, other: &LocalizationMap) {
        self.messages
            .extend(other.messages.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn localize_all(&self, codes: &[String]) -> Vec<String> {
        codes.iter().map(|code| self.get(code).to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl FromIterator<(String, String)> for LocalizationMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        LocalizationMap {
            messages: iter.into_iter().collect(),
        }
    }
}
