//! Module for rules.

use crate::{config::Config, status::Status};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{
    de::{self, SeqAccess, Visitor},
    Deserialize, Deserializer,
};
use std::{fmt, fs::File};

/// Vulnerability searching rule.
#[derive(Debug, Deserialize)]
pub struct Rule {
    label: String,
    description: String,
    status: Status,
    score: f32,
    #[serde(default)]
    cwe: Option<String>,
    #[serde(deserialize_with = "deserialize_main_regex")]
    regex: Regex,
    #[serde(deserialize_with = "deserialize_whitelist_regex")]
    #[serde(default)]
    whitelist: Box<[Regex]>,
    #[serde(default)]
    all_of: Box<[String]>,
    #[serde(deserialize_with = "deserialize_file_regex")]
    #[serde(default)]
    include_file_regex: Option<Regex>,
    #[serde(deserialize_with = "deserialize_file_regex")]
    #[serde(default)]
    exclude_file_regex: Option<Regex>,
}

impl Rule {
    /// Gets the regex of the rule.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Gets the label of the rule.
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Gets the description of the rule.
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Gets the status for the findings of the rule.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Gets the severity score for the findings of the rule.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Gets the weakness classification identifier of the rule.
    pub fn cwe(&self) -> Option<&str> {
        self.cwe.as_deref()
    }

    /// Gets the whitelist regex list.
    pub fn whitelist(&self) -> impl Iterator<Item = &Regex> {
        self.whitelist.iter()
    }

    /// Returns `true` if the rule fires for the given file contents.
    ///
    /// This is a pure function of the text: whatever happens inside a
    /// predicate, the worst outcome is "no match".
    pub fn matches(&self, code: &str) -> bool {
        if !self
            .all_of
            .iter()
            .all(|needle| code.contains(needle.as_str()))
        {
            return false;
        }

        'matches: for m in self.regex.find_iter(code) {
            for white in self.whitelist.iter() {
                if white.is_match(m.as_str()) {
                    continue 'matches;
                }
            }
            return true;
        }
        false
    }

    /// Returns if this rule has to be applied to the given filename.
    pub fn has_to_check(&self, filename: &str) -> bool {
        if self.include_file_regex.is_none() && self.exclude_file_regex.is_none() {
            return true;
        }

        let mut has_to_check = false;

        if let Some(ref r) = self.include_file_regex {
            has_to_check = r.is_match(filename)
        }

        if let Some(ref r) = self.exclude_file_regex {
            has_to_check = !r.is_match(filename)
        }

        has_to_check
    }
}

/// API usage matcher.
///
/// Carries no status: findings produced by these matchers are purely
/// informational "this API was used here" observations.
#[derive(Debug, Deserialize)]
pub struct ApiRule {
    description: String,
    #[serde(deserialize_with = "deserialize_main_regex")]
    regex: Regex,
}

impl ApiRule {
    /// Gets the description of the API.
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Returns `true` if the API is used in the given file contents.
    pub fn matches(&self, code: &str) -> bool {
        self.regex.is_match(code)
    }
}

/// The loaded rule file: vulnerability rules plus API matchers.
#[derive(Debug, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
    #[serde(default)]
    apis: Vec<ApiRule>,
}

impl RuleSet {
    /// Gets the vulnerability rules, in file order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Gets the API matchers, in file order.
    pub fn apis(&self) -> &[ApiRule] {
        &self.apis
    }
}

/// Regular expression serde visitor.
struct RegexVisitor;

impl<'de> Visitor<'de> for RegexVisitor {
    type Value = Regex;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a valid regular expression")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Regex::new(value).map_err(E::custom)
    }

    fn visit_borrowed_str<E>(self, value: &'de str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.visit_str(value)
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.visit_str(&value)
    }
}

/// Deserializes the main regular expression of a rule.
fn deserialize_main_regex<'de, D>(deserializer: D) -> Result<Regex, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_str(RegexVisitor)
}

/// Deserializes the list of whitelist regular expressions.
fn deserialize_whitelist_regex<'de, D>(deserializer: D) -> Result<Box<[Regex]>, D::Error>
where
    D: Deserializer<'de>,
{
    /// Visitor that deserializes a sequence of regular expressions.
    struct RegexSeqVisitor;

    impl<'de> Visitor<'de> for RegexSeqVisitor {
        type Value = Box<[Regex]>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a list of valid regular expressions")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            use serde::de::Error as SerdeError;

            let mut list = Vec::with_capacity(seq.size_hint().unwrap_or(0));

            // While there are entries remaining in the input, add them into our vector.
            while let Some(regex_str) = seq.next_element::<String>()? {
                list.push(Regex::new(regex_str.as_str()).map_err(A::Error::custom)?)
            }

            Ok(list.into_boxed_slice())
        }
    }

    deserializer.deserialize_seq(RegexSeqVisitor)
}

/// Deserializes file regular expressions.
fn deserialize_file_regex<'de, D>(deserializer: D) -> Result<Option<Regex>, D::Error>
where
    D: Deserializer<'de>,
{
    /// Optional regular expression serde visitor.
    struct RegexOptionVisitor;

    impl<'de> Visitor<'de> for RegexOptionVisitor {
        type Value = Option<Regex>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a valid regular expression")
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_str(RegexVisitor).map(Some)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_option(RegexOptionVisitor)
}

/// Loads the rule file configured for this scan.
///
/// Rules below the configured minimum status are dropped here, so the
/// engine never evaluates them.
pub fn load_rules(config: &Config) -> Result<RuleSet> {
    let f = File::open(config.rules_json()).with_context(|| {
        format!(
            "could not open the rule file {}",
            config.rules_json().display()
        )
    })?;

    let format_error = || {
        format!(
            "rules must be objects with the following structure:\n{}\nOptional attributes: \
             `cwe` (a CWE identifier for the findings), `whitelist` (an array of regular \
             expressions that discard a match), `all_of` (an array of strings that must all \
             appear in the file) and `include_file_regex`/`exclude_file_regex` (filename \
             filters). The file can also carry an `apis` array of objects with `description` \
             and `regex` attributes.",
            "{\n\t\"label\": \"Label for the rule\",\n\t\"description\": \"Long description \
             for this rule\"\n\t\"status\": \"info|warning|insecure\"\n\t\"score\": 5.0\n\t\
             \"regex\": \"regex_to_find_vulnerability\"\n}"
        )
    };

    let mut ruleset: RuleSet = serde_json::from_reader(f).with_context(format_error)?;
    ruleset
        .rules
        .retain(|rule| rule.status() >= config.min_status());

    Ok(ruleset)
}
