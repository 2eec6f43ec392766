use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Coarse content-type guess derived from a URL alone
///
/// Attached to every discovered URL and used by the classifier as its
/// structural signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlHint {
    Product,
    About,
    News,
    Literature,
    Contact,
    Detail,
    General,
}

impl UrlHint {
    /// Derives the hint from the URL's path and query
    ///
    /// Besides readable path words, the numeric column codes used by the
    /// target sites' CMS (`00070001` products, `00010001` about,
    /// `00020001` news, `00050001` literature) are recognized.
    pub fn from_url(url: &Url) -> Self {
        let mut key = url.path().to_ascii_lowercase();
        if let Some(query) = url.query() {
            key.push('?');
            key.push_str(&query.to_ascii_lowercase());
        }

        if key.contains("product") || key.contains("00070001") {
            Self::Product
        } else if key.contains("about") || key.contains("00010001") {
            Self::About
        } else if key.contains("news") || key.contains("market") || key.contains("00020001") {
            Self::News
        } else if key.contains("literature") || key.contains("00050001") {
            Self::Literature
        } else if key.contains("contact") {
            Self::Contact
        } else if key.contains("display.aspx") || key.contains("detail") {
            Self::Detail
        } else {
            Self::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::About => "about",
            Self::News => "news",
            Self::Literature => "literature",
            Self::Contact => "contact",
            Self::Detail => "detail",
            Self::General => "general",
        }
    }
}

impl fmt::Display for UrlHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
