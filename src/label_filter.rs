use std::{collections::BTreeMap, str::FromStr};

use crate::error::VultrLBError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    Equal(String, String),
    NotEqual(String, String),
    Exists(String),
    DoesNotExist(String),
}

/// Node label selector taken from the node-selector annotation,
/// e.g. `role=edge,zone!=b,!maintenance`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    rules: Vec<Rule>,
}

impl LabelFilter {
    #[must_use]
    pub fn check(&self, labels: &BTreeMap<String, String>) -> bool {
        self.rules.iter().all(|rule| match rule {
            Rule::Equal(key, value) => labels.get(key) == Some(value),
            Rule::NotEqual(key, value) => labels.get(key) != Some(value),
            Rule::Exists(key) => labels.contains_key(key),
            Rule::DoesNotExist(key) => !labels.contains_key(key),
        })
    }
}

impl FromStr for LabelFilter {
    type Err = VultrLBError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rules = Vec::new();
        for rule in s.split(',').map(str::trim).filter(|rule| !rule.is_empty()) {
            let invalid = || VultrLBError::InvalidNodeFilter(rule.to_string());
            let parts = rule.split('=').collect::<Vec<_>>();
            match *parts.as_slice() {
                [key] => match key.strip_prefix('!') {
                    Some("") => return Err(invalid()),
                    Some(key) => rules.push(Rule::DoesNotExist(key.to_string())),
                    None => rules.push(Rule::Exists(key.to_string())),
                },
                [key, value] => match key.strip_suffix('!') {
                    Some("") => return Err(invalid()),
                    Some(key) => rules.push(Rule::NotEqual(key.to_string(), value.to_string())),
                    None if key.is_empty() => return Err(invalid()),
                    None => rules.push(Rule::Equal(key.to_string(), value.to_string())),
                },
                _ => return Err(invalid()),
            }
        }
        Ok(Self { rules })
    }
}
