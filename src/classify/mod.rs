//! Content classification
//!
//! Turns a fetched page into a [`ClassifiedRecord`]: a content kind decided
//! from structural (URL) and lexical (keyword) evidence, plus the fields the
//! [`RuleSet`] extracts for that kind.

mod dedup;
mod rules;

pub use dedup::{dice_similarity, merge_similar};
pub use rules::{FieldRule, LabeledField, PatternRule, RuleSet, SentenceRule};

use crate::config::ClassifierConfig;
use crate::crawler::FetchResult;
use crate::url::UrlHint;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Minimum keyword score for the lexical tier to have an opinion
const LEXICAL_THRESHOLD: u32 = 3;

/// Category of a classified page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Product,
    Article,
    Document,
    Company,
    Page,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Article => "article",
            Self::Document => "document",
            Self::Company => "company",
            Self::Page => "page",
        }
    }

    /// Kind implied by a discovery hint, if any
    pub fn from_hint(hint: UrlHint) -> Option<Self> {
        match hint {
            UrlHint::Product | UrlHint::Detail => Some(Self::Product),
            UrlHint::News => Some(Self::Article),
            UrlHint::Literature => Some(Self::Document),
            UrlHint::About | UrlHint::Contact => Some(Self::Company),
            UrlHint::General => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Evidence behind a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSignals {
    /// Kind suggested by the URL
    pub structural: Option<ContentKind>,

    /// Kind suggested by keywords, with its score
    pub lexical: Option<ContentKind>,
    pub lexical_score: u32,

    pub confidence: Confidence,
}

/// Structured record derived from one fetched page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub source_url: String,
    pub kind: ContentKind,
    pub fields: BTreeMap<String, String>,
    pub confidence_signals: ConfidenceSignals,

    /// Source URLs of records merged into this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
}

/// Weighted keyword set for one kind
#[derive(Debug, Clone)]
struct KeywordSet {
    kind: ContentKind,
    keywords: Vec<(&'static str, u32)>,
}

impl KeywordSet {
    fn score(&self, haystack: &str) -> u32 {
        self.keywords
            .iter()
            .filter(|(word, _)| haystack.contains(word))
            .map(|(_, weight)| weight)
            .sum()
    }
}

/// Page classifier
///
/// Classification is a pure function of the page; the same input always
/// yields the same record.
#[derive(Debug)]
pub struct Classifier {
    structural: Vec<(ContentKind, Regex)>,
    lexical: Vec<KeywordSet>,
    rules: RuleSet,
    min_content_length: usize,
}

impl Classifier {
    /// Creates a classifier with the built-in patterns, keywords and rules
    pub fn new(config: &ClassifierConfig) -> Self {
        let structural = [
            (ContentKind::Product, r"product|display\.aspx|/goods|/item|00070001"),
            (ContentKind::Article, r"news|market|article|blog|00020001"),
            (ContentKind::Document, r"literature|download|/docs?/|00050001"),
            (ContentKind::Company, r"about|company|contact|00010001"),
        ]
        .into_iter()
        .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
        .collect();

        Self {
            structural,
            lexical: default_keywords(),
            rules: RuleSet::defaults(),
            min_content_length: config.min_content_length,
        }
    }

    /// Replaces the field extraction rules
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.rules
    }

    /// Kind suggested by the URL's path patterns, falling back to its hint
    pub fn structural_kind(&self, url: &Url) -> Option<ContentKind> {
        let mut key = url.path().to_ascii_lowercase();
        if let Some(query) = url.query() {
            key.push('?');
            key.push_str(&query.to_ascii_lowercase());
        }

        self.structural
            .iter()
            .find(|(_, pattern)| pattern.is_match(&key))
            .map(|(kind, _)| *kind)
            .or_else(|| ContentKind::from_hint(UrlHint::from_url(url)))
    }

    /// Kind with the highest keyword score, if it reaches the threshold
    ///
    /// Ties go to the kind listed first (product, article, document, company).
    pub fn lexical_kind(&self, title: &str, body: &str) -> (Option<ContentKind>, u32) {
        let haystack = format!("{}\n{}", title, body).to_lowercase();

        let mut best: Option<(ContentKind, u32)> = None;
        for set in &self.lexical {
            let score = set.score(&haystack);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((set.kind, score));
            }
        }

        match best {
            Some((kind, score)) if score >= LEXICAL_THRESHOLD => (Some(kind), score),
            Some((_, score)) => (None, score),
            None => (None, 0),
        }
    }

    /// Classifies a fetched page
    ///
    /// # Returns
    ///
    /// `None` when the body text is shorter than the minimum content length
    pub fn classify(&self, page: &FetchResult) -> Option<ClassifiedRecord> {
        let body = page.body_text.trim();
        if body.chars().count() < self.min_content_length.max(1) {
            tracing::debug!(url = %page.url, "Content too short to classify");
            return None;
        }

        let structural = self.structural_kind(&page.final_url);
        let title = page.title.as_deref().unwrap_or_default();
        let (lexical, lexical_score) = self.lexical_kind(title, body);

        let (kind, confidence) = match (structural, lexical) {
            (Some(s), Some(l)) if s == l => (s, Confidence::High),
            (Some(s), Some(_)) => (s, Confidence::Low),
            (Some(s), None) => (s, Confidence::Medium),
            (None, Some(l)) => (l, Confidence::Medium),
            (None, None) => (ContentKind::Page, Confidence::Low),
        };

        let mut fields = self.rules.extract(kind, body);
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        if !title.is_empty() {
            fields.insert("title".to_string(), title);
        }
        if kind == ContentKind::Product {
            if let Some(heading) = page
                .metadata
                .headings
                .first()
                .map(|h| h.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|h| !h.is_empty())
            {
                fields.insert("heading".to_string(), heading);
            }
        }

        tracing::debug!(url = %page.url, kind = %kind, ?confidence, fields = fields.len(), "Classified page");

        Some(ClassifiedRecord {
            source_url: page.url.to_string(),
            kind,
            fields,
            confidence_signals: ConfidenceSignals {
                structural,
                lexical,
                lexical_score,
                confidence,
            },
            merged_from: Vec::new(),
        })
    }

    /// Classifies every page, merging similar product records when configured
    pub fn classify_all(
        &self,
        pages: &[FetchResult],
        config: &ClassifierConfig,
    ) -> Vec<ClassifiedRecord> {
        let records: Vec<ClassifiedRecord> =
            pages.iter().filter_map(|page| self.classify(page)).collect();

        if config.merge_similar {
            merge_similar(records, config.similarity_threshold)
        } else {
            records
        }
    }
}

fn default_keywords() -> Vec<KeywordSet> {
    vec![
        KeywordSet {
            kind: ContentKind::Product,
            keywords: vec![
                ("产品", 2),
                ("试剂", 3),
                ("型号", 3),
                ("货号", 3),
                ("规格", 2),
                ("设备", 2),
                ("仪器", 2),
                ("培养箱", 2),
                ("检测", 1),
                ("product", 2),
                ("specification", 2),
            ],
        },
        KeywordSet {
            kind: ContentKind::Article,
            keywords: vec![
                ("新闻", 3),
                ("动向", 3),
                ("发布", 2),
                ("市场", 2),
                ("趋势", 2),
                ("发展", 1),
                ("news", 3),
                ("article", 2),
            ],
        },
        KeywordSet {
            kind: ContentKind::Document,
            keywords: vec![
                ("资料", 3),
                ("下载", 3),
                ("文献", 3),
                ("说明书", 3),
                ("手册", 2),
                ("literature", 3),
                ("download", 3),
                ("pdf", 2),
            ],
        },
        KeywordSet {
            kind: ContentKind::Company,
            keywords: vec![
                ("成立", 3),
                ("公司", 2),
                ("简介", 2),
                ("联系", 2),
                ("电话", 2),
                ("地址", 2),
                ("about us", 3),
                ("contact", 2),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{PageMetadata, Strategy};
    use chrono::Utc;

    fn create_test_page(url: &str, title: &str, body: &str) -> FetchResult {
        let url = Url::parse(url).unwrap();
        FetchResult {
            url: url.clone(),
            final_url: url,
            strategy_used: Strategy::Static,
            http_status: 200,
            title: (!title.is_empty()).then(|| title.to_string()),
            body_text: body.to_string(),
            raw_markup: None,
            metadata: PageMetadata::default(),
            timestamp: Utc::now(),
            elapsed_ms: 12,
            attempts: 1,
        }
    }

    fn create_test_classifier() -> Classifier {
        Classifier::new(&ClassifierConfig::default())
    }

    #[test]
    fn test_product_detail_with_model_number() {
        let page = create_test_page(
            "http://site.test/display.aspx?id=12",
            "Colilert",
            "产品详情 本页面介绍一款水质检测设备。\n型号: X200\n",
        );
        let record = create_test_classifier().classify(&page).unwrap();
        assert_eq!(record.kind, ContentKind::Product);
        assert_eq!(record.fields["型号"], "X200");
        assert_eq!(record.fields["title"], "Colilert");
        assert_eq!(record.confidence_signals.confidence, Confidence::High);
    }

    #[test]
    fn test_short_content_is_not_classified() {
        let page = create_test_page("http://site.test/product/1", "P", "too short");
        assert!(create_test_classifier().classify(&page).is_none());

        let empty = create_test_page("http://site.test/product/1", "P", "   ");
        assert!(create_test_classifier().classify(&empty).is_none());
    }

    #[test]
    fn test_structural_wins_on_disagreement() {
        let page = create_test_page(
            "http://site.test/about/index.html",
            "新闻",
            "最新新闻动向与市场趋势发布，行业发展持续向好。",
        );
        let record = create_test_classifier().classify(&page).unwrap();
        assert_eq!(record.kind, ContentKind::Company);
        assert_eq!(record.confidence_signals.lexical, Some(ContentKind::Article));
        assert_eq!(record.confidence_signals.confidence, Confidence::Low);
    }

    #[test]
    fn test_lexical_only_gives_medium_confidence() {
        let page = create_test_page(
            "http://site.test/page?id=7",
            "资料下载",
            "这里提供产品说明书和技术文献的下载服务，欢迎使用。",
        );
        let record = create_test_classifier().classify(&page).unwrap();
        assert_eq!(record.kind, ContentKind::Document);
        assert_eq!(record.confidence_signals.structural, None);
        assert_eq!(record.confidence_signals.confidence, Confidence::Medium);
    }

    #[test]
    fn test_no_signal_falls_back_to_page() {
        let page = create_test_page(
            "http://site.test/misc",
            "",
            "Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
        );
        let record = create_test_classifier().classify(&page).unwrap();
        assert_eq!(record.kind, ContentKind::Page);
        assert_eq!(record.confidence_signals.confidence, Confidence::Low);
        assert!(!record.fields.contains_key("title"));
    }

    #[test]
    fn test_hint_is_used_when_no_pattern_matches() {
        let classifier = create_test_classifier();
        let url = Url::parse("http://site.test/news-detail?id=3").unwrap();
        assert_eq!(classifier.structural_kind(&url), Some(ContentKind::Article));

        let url = Url::parse("http://site.test/detail/9").unwrap();
        assert_eq!(classifier.structural_kind(&url), Some(ContentKind::Product));
    }

    #[test]
    fn test_classification_is_idempotent() {
        let page = create_test_page(
            "http://site.test/product/5",
            "培养箱",
            "制造商：IDEXX\n规格：20 测试/盒\n本产品适用于微生物检测实验室使用。",
        );
        let classifier = create_test_classifier();
        assert_eq!(classifier.classify(&page), classifier.classify(&page));
    }

    #[test]
    fn test_same_titled_product_pages_stay_separate() {
        let title = "产品详情 - 上海安净生物";
        let pages = vec![
            create_test_page(
                "http://site.test/display.aspx?id=1",
                title,
                "本页面介绍一款水质检测设备。\n型号: X200\n货号: 111\n",
            ),
            create_test_page(
                "http://site.test/display.aspx?id=2",
                title,
                "本页面介绍另一款水质检测设备。\n型号: Q900\n",
            ),
        ];

        let config = ClassifierConfig::default();
        assert!(config.merge_similar);
        let records = create_test_classifier().classify_all(&pages, &config);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields["型号"], "X200");
        assert_eq!(records[1].fields["型号"], "Q900");
        assert!(!records[1].fields.contains_key("货号"));
        assert!(records.iter().all(|r| r.merged_from.is_empty()));
    }

    #[test]
    fn test_product_heading_becomes_name_field() {
        let mut page = create_test_page(
            "http://site.test/display.aspx?id=3",
            "产品详情 - 上海安净生物",
            "本页面介绍一款水质检测设备。\n型号: X200\n",
        );
        page.metadata.headings = vec!["Colilert-18  检测试剂".to_string(), "产品参数".to_string()];

        let record = create_test_classifier().classify(&page).unwrap();
        assert_eq!(record.fields["heading"], "Colilert-18 检测试剂");

        let mut article = create_test_page(
            "http://site.test/news/1",
            "市场动向",
            "最新新闻动向与市场趋势发布，行业发展持续向好。",
        );
        article.metadata.headings = vec!["市场动向".to_string()];
        let record = create_test_classifier().classify(&article).unwrap();
        assert!(!record.fields.contains_key("heading"));
    }

    #[test]
    fn test_custom_rules_replace_defaults() {
        let mut rules = RuleSet::new();
        rules.push(PatternRule::new("sku", r"SKU-(\d+)", &[]).unwrap());
        let classifier = create_test_classifier().with_rules(rules);

        let page = create_test_page(
            "http://site.test/product/5",
            "Widget",
            "Widget SKU-4411 is available now in all stores.\n型号: X1",
        );
        let record = classifier.classify(&page).unwrap();
        assert_eq!(record.fields["sku"], "4411");
        assert!(!record.fields.contains_key("型号"));
    }
}
