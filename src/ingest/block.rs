// src/ingest/block.rs
//! Anti-bot page detection.
//!
//! Marketplaces answer scrapers with HTTP 200 and a challenge page instead
//! of an error. Such bodies are either tiny or carry well-known markers;
//! either way they mean "zero results", never a parse failure.

/// Real search result pages are far larger than this.
pub const MIN_BODY_BYTES: usize = 512;

/// Lower-cased substrings that only show up on block/challenge/login walls.
const BLOCK_MARKERS: &[&str] = &[
    "_____tmd_____",
    "x5secdata",
    "nc_1_n1z",
    "punish?x5",
    "slide to verify",
    "please slide to verify",
    "unusual traffic",
    "captcha-container",
    "g-recaptcha",
    "cf-challenge",
    "access denied",
    "滑动验证",
    "访问被拒绝",
    "亲，请拖动下方滑块",
    "login.1688.com/member/signin",
    "login.aliexpress.com",
];

/// Why a body looks like a block page, if it does.
pub fn detect_block_page(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.len() < MIN_BODY_BYTES {
        return Some(format!("response too short ({} bytes)", trimmed.len()));
    }
    let lower = trimmed.to_lowercase();
    BLOCK_MARKERS
        .iter()
        .find(|m| lower.contains(*m))
        .map(|m| format!("marker `{m}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(s: &str) -> String {
        format!("<html><body>{s}{}</body></html>", "<p>filler</p>".repeat(60))
    }

    #[test]
    fn short_bodies_are_blocks() {
        assert!(detect_block_page("").is_some());
        assert!(detect_block_page("<html>ok</html>").unwrap().contains("too short"));
    }

    #[test]
    fn markers_are_case_insensitive() {
        let body = padded("<div>Please SLIDE TO VERIFY</div>");
        assert!(detect_block_page(&body).unwrap().contains("slide to verify"));
        let cn = padded("<div>亲，请拖动下方滑块完成验证</div>");
        assert!(detect_block_page(&cn).is_some());
    }

    #[test]
    fn ordinary_pages_pass() {
        let body = padded("<div class=\"card-item\">shoe rack</div>");
        assert_eq!(detect_block_page(&body), None);
    }
}
