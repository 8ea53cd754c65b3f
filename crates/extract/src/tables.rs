//! Confidence-boost and keyword tables for field extraction.
//!
//! Every additive boost used by the extractors lives here as a named
//! constant so each one can be asserted independently in tests. Table order
//! is significant where noted.

/// Japanese imperial eras and their Western start years.
/// Western year = start + era year − 1 (元年 is era year 1).
pub const ERA_STARTS: &[(&str, i32)] = &[
    ("令和", 2019),
    ("平成", 1989),
    ("昭和", 1926),
    ("大正", 1912),
];

/// Single-letter era abbreviations (`R6.1.15` style).
pub const ERA_ABBREVIATIONS: &[(char, i32)] = &[('R', 2019), ('H', 1989), ('S', 1926), ('T', 1912)];

// ── Date boosts ──────────────────────────────────────────────────────────────

/// Full year/month/day pattern (Western or 年月日).
pub const DATE_BOOST_FULL_YMD: f32 = 0.2;
/// Full era name (令和6年1月15日).
pub const DATE_BOOST_FULL_ERA: f32 = 0.15;
/// Abbreviated era letter (R6.1.15).
pub const DATE_BOOST_ABBREV_ERA: f32 = 0.1;
/// Within 5 years of the current date.
pub const DATE_BOOST_RECENT: f32 = 0.1;
/// More than 20 years away from the current date.
pub const DATE_PENALTY_DISTANT: f32 = -0.2;
/// Source text sits in the upper 30% of the receipt's vertical extent.
pub const DATE_BOOST_UPPER_REGION: f32 = 0.1;
pub const DATE_UPPER_REGION_RATIO: f32 = 0.3;

// ── Payee boosts ─────────────────────────────────────────────────────────────

/// Business suffixes and their boosts. Best (highest) contained suffix wins.
pub const PAYEE_SUFFIX_BOOSTS: &[(&str, f32)] = &[
    ("株式会社", 0.4),
    ("有限会社", 0.4),
    ("合同会社", 0.4),
    ("(株)", 0.35),
    ("(有)", 0.35),
    ("商店", 0.35),
    ("商事", 0.3),
    ("店", 0.3),
    ("屋", 0.3),
    ("館", 0.25),
    ("堂", 0.25),
];

/// Corporate-entity prefixes; a text starting with one gets this boost.
pub const PAYEE_CORPORATE_PREFIXES: &[&str] =
    &["株式会社", "有限会社", "合同会社", "(株)", "(有)"];
pub const PAYEE_BOOST_CORPORATE_PREFIX: f32 = 0.3;

/// Located in the upper 40% of the receipt.
pub const PAYEE_BOOST_UPPER_REGION: f32 = 0.25;
pub const PAYEE_UPPER_REGION_RATIO: f32 = 0.4;

/// Plausible name length (3–30 chars).
pub const PAYEE_BOOST_GOOD_LENGTH: f32 = 0.15;
pub const PAYEE_PENALTY_TOO_LONG: f32 = -0.1;

/// Contains Japanese script or a business character and is not mostly digits.
pub const PAYEE_BOOST_BUSINESS_LOOK: f32 = 0.2;

/// Bounding-box height exceeds 120% of the average text height.
pub const PAYEE_BOOST_HEADING_HEIGHT: f32 = 0.1;
pub const PAYEE_HEADING_HEIGHT_RATIO: f32 = 1.2;

/// Receipt boilerplate (「領収書」, date/amount shapes, thank-you phrases).
pub const PAYEE_PENALTY_BOILERPLATE: f32 = -0.3;
pub const PAYEE_BOILERPLATE_MARKERS: &[&str] =
    &["領収書", "領収証", "レシート", "ありがとうございま", "ご来店", "御中"];

/// Merged multi-line candidate: min(pair confidence) + this.
pub const PAYEE_BOOST_MULTILINE_MERGE: f32 = 0.2;

// ── Amount boosts ────────────────────────────────────────────────────────────

/// Amount labels and their boosts, checked in table order (compound labels
/// like 合計 must come before their substrings like 計).
pub const AMOUNT_LABEL_BOOSTS: &[(&str, f32)] = &[
    ("合計", 0.4),
    ("総額", 0.35),
    ("お会計", 0.35),
    ("税込", 0.3),
    ("小計", 0.25),
    ("計", 0.2),
    ("金額", 0.15),
];

pub const AMOUNT_BOOST_COMMA_GROUPING: f32 = 0.1;
pub const AMOUNT_BOOST_CURRENCY_SYMBOL: f32 = 0.1;
/// Common receipt range [100, 100_000].
pub const AMOUNT_BOOST_COMMON_RANGE: f32 = 0.15;
/// Plausible range [10, 1_000_000].
pub const AMOUNT_BOOST_PLAUSIBLE_RANGE: f32 = 0.05;
pub const AMOUNT_PENALTY_IMPLAUSIBLE_RANGE: f32 = -0.2;
/// Located in the lower 30% of the receipt.
pub const AMOUNT_BOOST_LOWER_REGION: f32 = 0.1;
pub const AMOUNT_LOWER_REGION_RATIO: f32 = 0.3;
/// Values under 10 are likely quantities, not totals.
pub const AMOUNT_PENALTY_TINY: f32 = -0.3;
pub const AMOUNT_BOOST_ROUND_VALUE: f32 = 0.05;

/// Accepted value range, inclusive.
pub const AMOUNT_MIN: i64 = 1;
pub const AMOUNT_MAX: i64 = 10_000_000;

// ── Usage (expense category) tables ──────────────────────────────────────────

/// Keyword → (category, weight). Order is significant: the first matching
/// keyword wins in normalization, and weights feed candidate scoring.
pub const USAGE_CATEGORIES: &[(&str, &str, f32)] = &[
    ("会議", "会議費", 0.3),
    ("打合せ", "会議費", 0.3),
    ("打ち合わせ", "会議費", 0.3),
    ("ミーティング", "会議費", 0.25),
    ("接待", "接待交際費", 0.3),
    ("懇親会", "接待交際費", 0.3),
    ("宴会", "接待交際費", 0.25),
    ("タクシー", "交通費", 0.3),
    ("電車", "交通費", 0.3),
    ("バス", "交通費", 0.3),
    ("駐車場", "交通費", 0.25),
    ("ガソリン", "交通費", 0.25),
    ("高速道路", "交通費", 0.25),
    ("宿泊", "宿泊費", 0.3),
    ("ホテル", "宿泊費", 0.3),
    ("ランチ", "飲食代", 0.25),
    ("コーヒー", "飲食代", 0.2),
    ("弁当", "飲食代", 0.2),
    ("飲食", "飲食代", 0.25),
    ("文房具", "消耗品費", 0.25),
    ("事務用品", "消耗品費", 0.25),
    ("コピー用紙", "消耗品費", 0.2),
    ("切手", "通信費", 0.25),
    ("郵便", "通信費", 0.25),
    ("宅配", "通信費", 0.2),
    ("書籍", "新聞図書費", 0.25),
    ("雑誌", "新聞図書費", 0.2),
    ("新聞", "新聞図書費", 0.2),
];

/// Business-type hints: a payee/line containing the keyword implies the
/// category even without an explicit usage line.
pub const USAGE_BUSINESS_HINTS: &[(&str, &str)] = &[
    ("レストラン", "飲食代"),
    ("カフェ", "飲食代"),
    ("食堂", "飲食代"),
    ("居酒屋", "飲食代"),
    ("珈琲", "飲食代"),
    ("ホテル", "宿泊費"),
    ("タクシー", "交通費"),
    ("交通", "交通費"),
    ("書店", "新聞図書費"),
    ("薬局", "雑費"),
];

/// Broad substring fallbacks, tried only when everything else came up empty.
pub const USAGE_SUBSTRING_FALLBACKS: &[(&str, &str)] = &[
    ("食", "飲食代"),
    ("飲食", "飲食代"),
    ("交通", "交通費"),
    ("電車", "交通費"),
    ("バス", "交通費"),
];

/// Explicit label-value lines (用途: …) get this boost.
pub const USAGE_BOOST_EXPLICIT_LABEL: f32 = 0.3;
/// Category inferred from business-type keywords.
pub const USAGE_BOOST_BUSINESS_HINT: f32 = 0.2;
/// Frequency-scan fallback: confidence = base + step × occurrence count.
pub const USAGE_FREQUENCY_BASE: f32 = 0.4;
pub const USAGE_FREQUENCY_STEP: f32 = 0.1;
/// Final fallback category and its confidence.
pub const USAGE_DEFAULT_CATEGORY: &str = "雑費";
pub const USAGE_DEFAULT_CONFIDENCE: f32 = 0.2;
/// Vertical slice scanned for usage lines: middle 20–80%.
pub const USAGE_SLICE_TOP_RATIO: f32 = 0.2;
pub const USAGE_SLICE_BOTTOM_RATIO: f32 = 0.8;

// ── Normalization ────────────────────────────────────────────────────────────

/// Unconditional OCR-confusion substitutions applied to payee text.
/// Kana/kanji lookalikes (ロ↔口) are handled contextually in `normalize`.
pub const OCR_CONFUSION_PAIRS: &[(char, char)] = &[('會', '会'), ('舘', '館')];
