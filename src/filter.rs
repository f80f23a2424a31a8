use regex::Regex;
use std::fmt;
use crate::constraints::GenerationOptions;
use crate::models::{ClusterMetadata, Partition};
use crate::PlanError;

/// Selects which topics of a snapshot are in scope for a plan
#[derive(Debug, Clone)]
pub enum TopicFilter {
    /// Every topic (`*`)
    All,
    /// Topic name contains the literal text
    Substring(String),
    /// Topic name contains any of the literal texts (comma-separated input)
    AnyOf(Vec<String>),
    /// Unanchored regular expression search
    Pattern(Regex),
}

fn is_topic_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

impl TopicFilter {
    /// Parse operator input.
    ///
    /// `*` (or nothing) selects all topics, a comma-separated list of topic names
    /// matches any of its entries as substrings, text made only of legal topic-name
    /// characters is a literal substring, and anything else is compiled as a regular
    /// expression. A comma inside a regex (`{1,3}`, `[a,b]`) keeps the whole input a regex.
    pub fn parse(input: &str) -> Result<Self, PlanError> {
        let input = input.trim();
        if input.is_empty() || input == "*" {
            return Ok(TopicFilter::All);
        }

        if input.contains(',') {
            let tokens: Vec<&str> = input
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            let is_name_list = tokens
                .iter()
                .all(|t| *t == "*" || t.chars().all(is_topic_name_char));
            if is_name_list {
                if tokens.contains(&"*") {
                    return Ok(TopicFilter::All);
                }
                return Ok(TopicFilter::AnyOf(tokens.into_iter().map(str::to_string).collect()));
            }
        }

        if input.chars().all(is_topic_name_char) {
            return Ok(TopicFilter::Substring(input.to_string()));
        }

        Regex::new(input)
            .map(TopicFilter::Pattern)
            .map_err(|source| PlanError::InvalidFilter {
                pattern: input.to_string(),
                source,
            })
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Substring(text) => topic.contains(text.as_str()),
            TopicFilter::AnyOf(tokens) => tokens.iter().any(|t| topic.contains(t.as_str())),
            TopicFilter::Pattern(regex) => regex.is_match(topic),
        }
    }

    /// Names of matching topics, in snapshot order
    pub fn matching_topics<'a>(&self, metadata: &'a ClusterMetadata) -> Vec<&'a str> {
        metadata
            .topics
            .keys()
            .filter(|name| self.matches(name))
            .map(String::as_str)
            .collect()
    }

    /// Partitions of every matching topic, ordered by topic then partition id
    pub fn select<'a>(&self, metadata: &'a ClusterMetadata) -> Result<Vec<&'a Partition>, PlanError> {
        self.select_with(metadata, &GenerationOptions::default())
    }

    /// Like [`TopicFilter::select`], additionally dropping topics the options rule out.
    /// Fails with [`PlanError::NoMatch`] when nothing remains in scope.
    pub fn select_with<'a>(
        &self,
        metadata: &'a ClusterMetadata,
        options: &GenerationOptions,
    ) -> Result<Vec<&'a Partition>, PlanError> {
        let partitions: Vec<&Partition> = metadata
            .topics
            .values()
            .filter(|t| self.matches(&t.name) && options.can_plan_topic(&t.name))
            .flat_map(|t| t.partitions.values())
            .collect();

        if partitions.is_empty() {
            return Err(PlanError::NoMatch {
                pattern: self.to_string(),
            });
        }
        Ok(partitions)
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicFilter::All => write!(f, "*"),
            TopicFilter::Substring(text) => write!(f, "{}", text),
            TopicFilter::AnyOf(tokens) => write!(f, "{}", tokens.join(",")),
            TopicFilter::Pattern(regex) => write!(f, "{}", regex.as_str()),
        }
    }
}
