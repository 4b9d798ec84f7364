//! Dictionary - Payload dictionary for string mutations
//!
//! Injection, SQL, path traversal and unicode payload lists. Sampling is
//! always driven by a caller-provided seeded RNG.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

const COMMAND_INJECTION: &[&str] = &[
    "$(id)",
    "; uname -a",
    "| cat /proc/self/environ",
    "&& ping -c 1 127.0.0.1",
    "`sleep 3`",
    "%0aid",
    "{{7*'7'}}",
    "${jndi:ldap://127.0.0.1/a}",
    "<%= 7*7 %>",
    "\r\nX-Injected: 1",
    "<svg onload=alert(1)>",
];

const UNICODE: &[&str] = &[
    "\u{0000}",
    "\u{200B}",
    "\u{FEFF}",
    "\u{202E}",
    "\u{FFFD}",
    "\u{1F600}",
    "\u{10FFFF}",
    "a\u{0308}",
    "\u{FF0F}",
    "\u{2028}",
];

const PATH_TRAVERSAL: &[&str] = &[
    "../../../../etc/hosts",
    "..%2f..%2f..%2fetc%2fhosts",
    "%2e%2e/%2e%2e/",
    "..\\..\\boot.ini",
    "/./.././../",
    "..%c0%af",
    "%00",
];

const SQL_INJECTION: &[&str] = &[
    "' OR 1=1--",
    "1; SELECT pg_sleep(3)--",
    "' UNION SELECT NULL,NULL--",
    "') OR ('a'='a",
    "1 AND 1=CONVERT(int,@@version)",
    "'||(SELECT '')||'",
    "\" OR \"1\"=\"1",
    "{\"$gt\": \"\"}",
];

/// Payload dictionary for mutations
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    tokens: Vec<String>,
    categories: HashMap<TokenCategory, Vec<String>>,
}

/// Category of dictionary tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenCategory {
    /// Shell, template and header-splitting payloads
    CommandInjection,
    Unicode,
    PathTraversal,
    SqlInjection,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads aimed at HTTP query, path, header and JSON slots
    pub fn http_default() -> Self {
        let mut dict = Self::new();
        for (category, tokens) in [
            (TokenCategory::CommandInjection, COMMAND_INJECTION),
            (TokenCategory::Unicode, UNICODE),
            (TokenCategory::PathTraversal, PATH_TRAVERSAL),
            (TokenCategory::SqlInjection, SQL_INJECTION),
        ] {
            dict.add_tokens(category, tokens.to_vec());
        }
        dict
    }

    /// Add tokens to a category
    pub fn add_tokens(&mut self, category: TokenCategory, tokens: Vec<&str>) {
        let entry = self.categories.entry(category).or_default();
        for token in tokens {
            let owned = token.to_string();
            entry.push(owned.clone());
            self.tokens.push(owned);
        }
    }

    /// Get all tokens in a category
    pub fn tokens_in(&self, category: TokenCategory) -> &[String] {
        self.categories
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Shuffle a category and split it into the first `count` tokens and
    /// the remainder. The split depends only on the RNG state.
    pub fn split_sample(
        &self,
        category: TokenCategory,
        count: usize,
        rng: &mut impl Rng,
    ) -> (Vec<String>, Vec<String>) {
        let mut tokens = self.tokens_in(category).to_vec();
        tokens.shuffle(rng);
        let rest = tokens.split_off(count.min(tokens.len()));
        (tokens, rest)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
