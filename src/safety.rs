// src/safety.rs
//! Banned-category screen for listing text.
//!
//! A fixed table of category → keyword literals, matched as case-insensitive
//! substrings over `title + " " + description`. Categories and keywords are
//! tried in table order and the first hit wins. Pure and in-memory; callers
//! that want to skip it simply don't call it.

use serde::Serialize;

/// Customs/IP restricted product categories, in evaluation order.
pub const BANNED_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "food",
        &["食品", "食物", "零食", "糖果", "饼干", "巧克力", "饮料"],
    ),
    (
        "tableware",
        &["餐具", "碗", "盘子", "筷子", "勺子", "叉子", "杯子"],
    ),
    (
        "baby",
        &["婴儿", "儿童", "宝宝", "玩具", "奶瓶", "尿布", "童装"],
    ),
    (
        "cosmetic",
        &["化妆品", "护肤", "面膜", "口红", "眼影", "粉底"],
    ),
    (
        "replica",
        &[
            "Nike",
            "Adidas",
            "Gucci",
            "LV",
            "Louis Vuitton",
            "Chanel",
            "Disney",
            "迪士尼",
            "Supreme",
            "Rolex",
            "Apple",
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyVerdict {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_keyword: Option<&'static str>,
}

impl SafetyVerdict {
    fn pass() -> Self {
        Self {
            passed: true,
            category: None,
            matched_keyword: None,
        }
    }

    /// `"Banned category: replica (keyword: Nike)"`, or `"Pass"`.
    pub fn reason(&self) -> String {
        match (self.category, self.matched_keyword) {
            (Some(c), Some(k)) => format!("Banned category: {c} (keyword: {k})"),
            _ => "Pass".to_string(),
        }
    }
}

pub fn check(title: &str, description: &str) -> SafetyVerdict {
    let text = format!("{title} {description}").to_lowercase();
    for (category, keywords) in BANNED_CATEGORIES {
        for kw in *keywords {
            if text.contains(&kw.to_lowercase()) {
                return SafetyVerdict {
                    passed: false,
                    category: Some(category),
                    matched_keyword: Some(kw),
                };
            }
        }
    }
    SafetyVerdict::pass()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_in_korean_title_is_replica() {
        let v = check("Nike 운동화 도매", "");
        assert!(!v.passed);
        assert_eq!(v.category, Some("replica"));
        assert_eq!(v.matched_keyword, Some("Nike"));
        assert_eq!(v.reason(), "Banned category: replica (keyword: Nike)");
    }

    #[test]
    fn every_brand_matches_case_insensitively() {
        let (_, brands) = BANNED_CATEGORIES
            .iter()
            .find(|(c, _)| *c == "replica")
            .unwrap();
        for b in *brands {
            let title = format!("wholesale {} bag", b.to_uppercase());
            assert_eq!(check(&title, "").category, Some("replica"), "{b}");
            let title = format!("{} style", b.to_lowercase());
            assert_eq!(check(&title, "").category, Some("replica"), "{b}");
        }
    }

    #[test]
    fn description_counts_and_first_category_wins() {
        let v = check("gift set", "巧克力 and 玩具");
        assert_eq!(v.category, Some("food"));
        assert_eq!(v.matched_keyword, Some("巧克力"));

        let v = check("儿童 Disney 背包", "");
        assert_eq!(v.category, Some("baby"));
    }

    #[test]
    fn clean_listing_passes() {
        let v = check("折叠鞋架 不锈钢", "home storage");
        assert!(v.passed);
        assert_eq!(v.category, None);
        assert_eq!(v.reason(), "Pass");
    }

    #[test]
    fn substring_match_is_literal() {
        // "LV" is a plain substring, so it also fires inside other words.
        assert_eq!(check("silver hook", "").matched_keyword, Some("LV"));
    }
}
