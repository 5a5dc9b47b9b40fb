use std::fmt;
use std::sync::LazyLock;

use querygate_core::QueryError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Replacement for every maximal run of decimal digits.
pub const DIGIT_PLACEHOLDER: &str = "<n>";

const SCHEMA_SENTINEL: &str = "__schema__";

// The rule set shrinks or stabilises the string on every pass, so a handful
// of passes always reaches the fixed point for real queries.
const MAX_PASSES: usize = 8;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static HOW_MANY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"몇\s*개").unwrap());

static DEFAULT_NORMALIZER: LazyLock<QueryNormalizer> = LazyLock::new(|| {
    QueryNormalizer::new(NormalizerConfig::default())
        .expect("built-in normalizer tables are valid")
});

/// Normalize with the built-in tables.
pub fn normalize(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}

/// Cache and coalescing key: hex SHA-256 of a normalized query, or the fixed
/// sentinel of the schema singleton.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_normalized(normalized: &str) -> Self {
        Self(hex::encode(Sha256::digest(normalized.as_bytes())))
    }

    pub fn schema() -> Self {
        Self(SCHEMA_SENTINEL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tables driving [`QueryNormalizer`].
///
/// All matching is exact against these lists; there is no morphological
/// analysis. The defaults target Korean logistics questions ("서울 물류센터
/// 재고 보여줘") and leave other scripts mostly untouched apart from case,
/// spacing and digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// When false, queries are keyed verbatim.
    pub enabled: bool,
    /// Replace digit runs with [`DIGIT_PLACEHOLDER`]. Trades accuracy ("top 10"
    /// and "top 20" share an entry) for hit rate.
    pub replace_digits: bool,
    /// Case-marking particles stripped from the end of Hangul words.
    pub particles: Vec<String>,
    /// Question words removed wherever they appear.
    pub interrogatives: Vec<String>,
    /// Verb stems that, optionally followed by `줘`, collapse into `canonical_verb`.
    pub verb_synonyms: Vec<String>,
    pub canonical_verb: String,
    /// A query containing none of these gets `canonical_verb` appended.
    pub verb_set: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            enabled: true,
            replace_digits: true,
            particles: strings(&["은", "는", "이", "가", "을", "를", "의", "에서", "에", "으로", "로"]),
            interrogatives: strings(&["뭐야", "뭐지", "무엇인가요", "무엇인가", "무엇이야"]),
            verb_synonyms: strings(&["보여", "알려", "찾아", "조회해"]),
            canonical_verb: "보여줘".to_string(),
            verb_set: strings(&["보여줘", "해줘", "줘"]),
        }
    }
}

impl NormalizerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_replace_digits(mut self, replace: bool) -> Self {
        self.replace_digits = replace;
        self
    }
}

/// Maps raw queries to canonical strings so that near-duplicate phrasings
/// share one cache entry.
///
/// Each pass runs, in order: lowercase, quote unification, whitespace
/// collapse, digit placeholders, interrogative removal, verb
/// canonicalization, particle stripping, default verb, and joining of
/// spaced-apart Hangul words. Passes repeat until the output stops changing,
/// so `normalize(normalize(q)) == normalize(q)` holds for every input.
#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    config: NormalizerConfig,
    interrogatives: Option<Regex>,
    verbs: Option<Regex>,
    particles: Option<Regex>,
}

impl QueryNormalizer {
    pub fn new(config: NormalizerConfig) -> Result<Self, QueryError> {
        if config.enabled && config.canonical_verb.trim().is_empty() {
            return Err(QueryError::Configuration(
                "normalizer canonical_verb must not be empty".to_string(),
            ));
        }
        let interrogatives = alternation(&config.interrogatives)
            .map(|alt| compile(&format!(r"\s*(?:{alt})\??")))
            .transpose()?;
        let verbs = alternation(&config.verb_synonyms)
            .map(|alt| compile(&format!(r"(?:{alt})\s*줘?")))
            .transpose()?;
        let particles = alternation(&config.particles)
            .map(|alt| compile(&format!(r"([가-힣])(?:{alt})(\s|$)")))
            .transpose()?;
        Ok(Self {
            config,
            interrogatives,
            verbs,
            particles,
        })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(&self, raw: &str) -> String {
        if !self.config.enabled {
            return raw.to_string();
        }
        let mut current = self.pass(raw);
        for _ in 1..MAX_PASSES {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    pub fn key(&self, raw: &str) -> CacheKey {
        CacheKey::from_normalized(&self.normalize(raw))
    }

    fn pass(&self, input: &str) -> String {
        let mut s = input.to_lowercase().replace('"', "'");
        s = collapse_whitespace(&s);

        if self.config.replace_digits {
            s = DIGITS.replace_all(&s, DIGIT_PLACEHOLDER).into_owned();
            s = HOW_MANY
                .replace_all(&s, format!("{DIGIT_PLACEHOLDER}개").as_str())
                .into_owned();
        }

        if let Some(re) = &self.interrogatives {
            s = re.replace_all(&s, "").into_owned();
        }
        s = collapse_whitespace(s.trim_end_matches(&['?', ' '][..]));

        if let Some(re) = &self.verbs {
            s = re
                .replace_all(&s, regex::NoExpand(&self.config.canonical_verb))
                .into_owned();
        }

        if let Some(re) = &self.particles {
            // Stacked particles ("센터에서는") come off one per round.
            loop {
                let stripped = re.replace_all(&s, "${1}${2}").into_owned();
                if stripped == s {
                    break;
                }
                s = stripped;
            }
        }
        s = collapse_whitespace(&s);

        if !self.config.verb_set.iter().any(|verb| s.contains(verb.as_str())) {
            if !s.is_empty() {
                s.push(' ');
            }
            s.push_str(&self.config.canonical_verb);
        }

        join_hangul_words(&s)
    }
}

/// Longest alternatives first so that `에서` wins over `에`.
fn alternation(items: &[String]) -> Option<String> {
    let mut items: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return None;
    }
    items.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    items.dedup();
    Some(
        items
            .into_iter()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|"),
    )
}

fn compile(pattern: &str) -> Result<Regex, QueryError> {
    Regex::new(pattern)
        .map_err(|e| QueryError::Configuration(format!("invalid normalizer table: {e}")))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Drop single spaces sitting between two Hangul syllables.
fn join_hangul_words(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' '
            && i > 0
            && i + 1 < chars.len()
            && is_hangul_syllable(chars[i - 1])
            && is_hangul_syllable(chars[i + 1])
        {
            continue;
        }
        out.push(c);
    }
    out
}
