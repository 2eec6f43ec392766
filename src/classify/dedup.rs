//! Merging of near-duplicate product records

use super::{ClassifiedRecord, ContentKind};
use std::collections::HashMap;

/// Dice coefficient over character bigrams, ignoring case and whitespace
///
/// Returns a value in `0.0..=1.0`. Strings shorter than two characters only
/// match when they are equal.
pub fn dice_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    let b: Vec<char> = b.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();

    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut common = 0usize;
    for pair in b.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }

    (2 * common) as f64 / ((a.len() - 1) + (b.len() - 1)) as f64
}

/// Fields naming the product itself, in order of preference
///
/// The page title is not among them: detail pages of one site share a
/// template title.
const NAME_FIELDS: [&str; 3] = ["中文品名", "英文品名", "heading"];

/// Fields that tell two products apart regardless of their names
const IDENTIFYING_FIELDS: [&str; 2] = ["型号", "货号"];

/// Name used to compare product records
fn product_name(record: &ClassifiedRecord) -> Option<&str> {
    NAME_FIELDS
        .iter()
        .find_map(|key| record.fields.get(*key))
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// True when both records carry an identifying field with different values
fn conflicting_ids(a: &ClassifiedRecord, b: &ClassifiedRecord) -> bool {
    IDENTIFYING_FIELDS.iter().any(|key| {
        match (a.fields.get(*key), b.fields.get(*key)) {
            (Some(x), Some(y)) => !x.trim().eq_ignore_ascii_case(y.trim()),
            _ => false,
        }
    })
}

/// Merges product records whose names are at least `threshold` similar
///
/// Records without an extracted product name are never merged, nor are
/// records whose model or article numbers differ. The earlier record keeps
/// its fields; fields it lacks are filled from the later one, whose URL is
/// appended to `merged_from`. Other kinds pass through untouched and the
/// relative order of surviving records is kept.
pub fn merge_similar(records: Vec<ClassifiedRecord>, threshold: f64) -> Vec<ClassifiedRecord> {
    let mut merged: Vec<ClassifiedRecord> = Vec::with_capacity(records.len());

    for record in records {
        let target = (record.kind == ContentKind::Product)
            .then(|| product_name(&record))
            .flatten()
            .and_then(|name| {
                merged.iter().position(|kept| {
                    kept.kind == ContentKind::Product
                        && !conflicting_ids(kept, &record)
                        && product_name(kept)
                            .is_some_and(|other| dice_similarity(name, other) >= threshold)
                })
            });

        match target {
            Some(i) => {
                let kept = &mut merged[i];
                tracing::debug!(kept = %kept.source_url, merged = %record.source_url, "Merging similar product records");
                for (key, value) in record.fields {
                    kept.fields.entry(key).or_insert(value);
                }
                kept.merged_from.push(record.source_url);
                kept.merged_from.extend(record.merged_from);
            }
            None => merged.push(record),
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Confidence, ConfidenceSignals};
    use std::collections::BTreeMap;

    fn create_test_record(url: &str, kind: ContentKind, fields: &[(&str, &str)]) -> ClassifiedRecord {
        ClassifiedRecord {
            source_url: url.to_string(),
            kind,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            confidence_signals: ConfidenceSignals {
                structural: Some(kind),
                lexical: None,
                lexical_score: 0,
                confidence: Confidence::Medium,
            },
            merged_from: Vec::new(),
        }
    }

    #[test]
    fn test_dice_similarity_bounds() {
        assert_eq!(dice_similarity("Colilert", "colilert"), 1.0);
        assert_eq!(dice_similarity("abc", "xyz"), 0.0);
        assert_eq!(dice_similarity("", ""), 0.0);
        assert_eq!(dice_similarity("a", "b"), 0.0);
    }

    #[test]
    fn test_dice_similarity_partial_overlap() {
        // "night" / "nacht" share only the "ht" bigram
        let score = dice_similarity("night", "nacht");
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_similar_products_are_merged() {
        let records = vec![
            create_test_record(
                "http://site.test/p/1",
                ContentKind::Product,
                &[("中文品名", "Colilert-18 检测试剂"), ("型号", "C18"), ("产地", "美国")],
            ),
            create_test_record(
                "http://site.test/p/2",
                ContentKind::Product,
                &[("中文品名", "Colilert-18 检测试剂 "), ("产地", "USA"), ("货号", "98-12345")],
            ),
        ];

        let merged = merge_similar(records, 0.85);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].fields["型号"], "C18");
        assert_eq!(merged[0].fields["产地"], "美国");
        assert_eq!(merged[0].fields["货号"], "98-12345");
        assert_eq!(merged[0].merged_from, vec!["http://site.test/p/2".to_string()]);
    }

    #[test]
    fn test_shared_page_title_does_not_merge_products() {
        let records = vec![
            create_test_record(
                "http://site.test/display.aspx?id=1",
                ContentKind::Product,
                &[("title", "产品详情 - 上海安净生物"), ("型号", "X200")],
            ),
            create_test_record(
                "http://site.test/display.aspx?id=2",
                ContentKind::Product,
                &[("title", "产品详情 - 上海安净生物"), ("型号", "Q900")],
            ),
        ];

        let merged = merge_similar(records, 0.85);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].fields["型号"], "Q900");
        assert!(merged.iter().all(|r| r.merged_from.is_empty()));
    }

    #[test]
    fn test_different_model_numbers_are_not_merged() {
        let records = vec![
            create_test_record(
                "http://site.test/p/1",
                ContentKind::Product,
                &[("中文品名", "Quanti-Tray 定量盘"), ("货号", "WQT-2K")],
            ),
            create_test_record(
                "http://site.test/p/2",
                ContentKind::Product,
                &[("中文品名", "Quanti-Tray 定量盘"), ("货号", "WQT-51")],
            ),
            create_test_record(
                "http://site.test/p/3",
                ContentKind::Product,
                &[("中文品名", "Quanti-Tray 定量盘"), ("货号", "wqt-2k ")],
            ),
        ];

        let merged = merge_similar(records, 0.85);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].merged_from, vec!["http://site.test/p/3".to_string()]);
        assert_eq!(merged[1].fields["货号"], "WQT-51");
    }

    #[test]
    fn test_threshold_controls_merging() {
        let records = || {
            vec![
                create_test_record("http://site.test/p/1", ContentKind::Product, &[("英文品名", "Quanti-Tray 2000")]),
                create_test_record("http://site.test/p/2", ContentKind::Product, &[("英文品名", "Quanti-Tray")]),
            ]
        };

        let similarity = dice_similarity("Quanti-Tray 2000", "Quanti-Tray");
        assert!(similarity > 0.7 && similarity < 0.85);

        assert_eq!(merge_similar(records(), 0.85).len(), 2);
        assert_eq!(merge_similar(records(), 0.7).len(), 1);
    }

    #[test]
    fn test_non_products_are_never_merged() {
        let records = vec![
            create_test_record("http://site.test/n/1", ContentKind::Article, &[("title", "市场动向")]),
            create_test_record("http://site.test/n/2", ContentKind::Article, &[("title", "市场动向")]),
        ];
        assert_eq!(merge_similar(records, 0.85).len(), 2);
    }
}
