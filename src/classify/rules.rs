//! Field extraction rules
//!
//! A [`RuleSet`] is an ordered list of [`FieldRule`]s. For every field the
//! first rule that matches wins; later rules for the same field are skipped.
//! Rules can be added or removed without touching the classifier.

use super::ContentKind;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// Extracts one field from page text
pub trait FieldRule: Send + Sync + fmt::Debug {
    /// Name of the field the rule fills
    fn field(&self) -> &str;

    /// Returns true if the rule runs for records of `kind`
    fn applies_to(&self, kind: ContentKind) -> bool;

    /// Extracts the raw value, if the text contains one
    fn extract(&self, text: &str) -> Option<String>;
}

/// `label: value` line, with an ASCII or full-width colon
#[derive(Debug, Clone)]
pub struct LabeledField {
    field: String,
    kinds: Vec<ContentKind>,
    pattern: Regex,
}

impl LabeledField {
    /// Builds a rule for `label` (a regex fragment) that captures the rest of the line
    ///
    /// `stop` lists extra characters that end the value early.
    pub fn new(
        field: &str,
        label: &str,
        stop: &str,
        kinds: &[ContentKind],
    ) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"{}\s*[：:]\s*([^\n\r{}]+)",
            label,
            regex::escape(stop)
        ))?;
        Ok(Self {
            field: field.to_string(),
            kinds: kinds.to_vec(),
            pattern,
        })
    }
}

impl FieldRule for LabeledField {
    fn field(&self) -> &str {
        &self.field
    }

    fn applies_to(&self, kind: ContentKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    fn extract(&self, text: &str) -> Option<String> {
        self.pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Arbitrary capture pattern; the first group is the value (the whole match without groups)
#[derive(Debug, Clone)]
pub struct PatternRule {
    field: String,
    kinds: Vec<ContentKind>,
    pattern: Regex,
    max_chars: Option<usize>,
}

impl PatternRule {
    pub fn new(field: &str, pattern: &str, kinds: &[ContentKind]) -> Result<Self, regex::Error> {
        Ok(Self {
            field: field.to_string(),
            kinds: kinds.to_vec(),
            pattern: Regex::new(pattern)?,
            max_chars: None,
        })
    }

    /// Truncates extracted values to `max` characters
    pub fn max_chars(mut self, max: usize) -> Self {
        self.max_chars = Some(max);
        self
    }
}

impl FieldRule for PatternRule {
    fn field(&self) -> &str {
        &self.field
    }

    fn applies_to(&self, kind: ContentKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    fn extract(&self, text: &str) -> Option<String> {
        let caps = self.pattern.captures(text)?;
        let value = caps.get(1).or_else(|| caps.get(0))?.as_str();
        Some(match self.max_chars {
            Some(max) => value.chars().take(max).collect(),
            None => value.to_string(),
        })
    }
}

/// First sentence of reasonable length that contains one of the nouns
#[derive(Debug, Clone)]
pub struct SentenceRule {
    field: String,
    kinds: Vec<ContentKind>,
    nouns: Vec<String>,
    min_chars: usize,
    max_chars: usize,
}

impl SentenceRule {
    pub fn new(field: &str, nouns: &[&str], kinds: &[ContentKind]) -> Self {
        Self {
            field: field.to_string(),
            kinds: kinds.to_vec(),
            nouns: nouns.iter().map(|n| n.to_string()).collect(),
            min_chars: 20,
            max_chars: 200,
        }
    }
}

impl FieldRule for SentenceRule {
    fn field(&self) -> &str {
        &self.field
    }

    fn applies_to(&self, kind: ContentKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    fn extract(&self, text: &str) -> Option<String> {
        text.split(['.', '。', '!', '?', '！', '？', '\n'])
            .map(str::trim)
            .filter(|s| {
                let len = s.chars().count();
                len > self.min_chars && len < self.max_chars
            })
            .find(|s| self.nouns.iter().any(|noun| s.contains(noun.as_str())))
            .map(str::to_string)
    }
}

/// Ordered list of field rules
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn FieldRule>>,
}

impl RuleSet {
    /// Creates an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule; it runs after every rule already present
    pub fn push(&mut self, rule: impl FieldRule + 'static) -> &mut Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Inserts a rule at `index` (clamped to the end)
    pub fn insert(&mut self, index: usize, rule: impl FieldRule + 'static) -> &mut Self {
        let index = index.min(self.rules.len());
        self.rules.insert(index, Box::new(rule));
        self
    }

    /// Removes every rule for `field` and returns how many were removed
    pub fn remove_field(&mut self, field: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.field() != field);
        before - self.rules.len()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs all applicable rules against `text`
    ///
    /// The first match per field wins. Values are trimmed and whitespace
    /// collapsed; empty values count as no match.
    pub fn extract(&self, kind: ContentKind, text: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();

        for rule in self.rules.iter().filter(|rule| rule.applies_to(kind)) {
            if fields.contains_key(rule.field()) {
                continue;
            }
            let Some(raw) = rule.extract(text) else {
                continue;
            };
            let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if !value.is_empty() {
                fields.insert(rule.field().to_string(), value);
            }
        }

        fields
    }

    /// The built-in rules for product, article, document and company pages
    pub fn defaults() -> Self {
        use ContentKind::{Article, Company, Document, Product};

        let mut set = Self::new();

        let labeled: [(&str, &str, &str); 14] = [
            ("英文品名", "英文品名", ""),
            ("中文品名", "中文品名", ""),
            ("制造商", r"制\s*造\s*商", ""),
            ("产地", r"产\s*地", ""),
            ("检测水样", "检测水样", ""),
            ("检测对象", "检测对象", "，"),
            ("检测内容", "检测内容", ""),
            ("检测体积", "检测体积", ""),
            ("检测时间", "检测时间", ""),
            ("货号", "货号", ""),
            ("规格", "规格", ""),
            ("保存条件", "保存条件", ""),
            ("有效期", "有效期", ""),
            ("型号", "型号", ""),
        ];
        for (field, label, stop) in labeled {
            if let Ok(rule) = LabeledField::new(field, label, stop, &[Product]) {
                set.push(rule);
            }
        }

        if let Ok(rule) = PatternRule::new("description", r"原理\s*([^。]*。[^。]*。)", &[Product]) {
            set.push(rule.max_chars(200));
        }
        set.push(SentenceRule::new(
            "description",
            &["生物", "技术", "检测"],
            &[Product, Company],
        ));

        if let Ok(rule) = PatternRule::new("published", r"\d{4}-\d{2}-\d{2}", &[Article, Document]) {
            set.push(rule);
        }

        if let Ok(rule) = LabeledField::new("电话", r"电\s*话", "", &[Company]) {
            set.push(rule);
        }
        if let Ok(rule) = PatternRule::new(
            "电话",
            r"(\+?\d{1,4}[\s-]?)?\(?\d{3,4}\)?[\s-]?\d{3,4}[\s-]?\d{3,4}",
            &[Company],
        ) {
            set.push(rule);
        }
        if let Ok(rule) = LabeledField::new("地址", r"地\s*址", "", &[Company]) {
            set.push(rule);
        }
        if let Ok(rule) = PatternRule::new(
            "邮箱",
            r"([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})",
            &[Company],
        ) {
            set.push(rule);
        }
        if let Ok(rule) = PatternRule::new("成立", r"成立于\s*([12]\d{3})\s*年", &[Company]) {
            set.push(rule);
        }

        set
    }
}
