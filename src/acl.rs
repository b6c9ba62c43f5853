use serde::{Deserialize, Deserializer};

/// A compiled repository glob.
///
/// `*` and `?` stay inside one path segment, `**` may cross `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPattern {
    raw: String,
    tokens: Vec<Token>,
}

impl RepoPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let tokens = tokenize(&raw);
        Self { raw, tokens }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, repository: &str) -> bool {
        let text: Vec<char> = repository.chars().collect();
        glob_match(&self.tokens, &text)
    }
}

/// The per-user repository allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoAcl {
    patterns: Vec<RepoPattern>,
}

impl RepoAcl {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(RepoPattern::new).collect(),
        }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// An empty list places no restriction on the user.
    pub fn is_unrestricted(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[RepoPattern] {
        &self.patterns
    }

    pub fn rule_for(&self, repository: &str) -> Option<&RepoPattern> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(repository))
    }

    pub fn can_access(&self, repository: &str) -> bool {
        self.is_unrestricted() || self.rule_for(repository).is_some()
    }
}

impl<'de> Deserialize<'de> for RepoAcl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let patterns = Option::<Vec<String>>::deserialize(deserializer)?;
        Ok(Self::new(patterns.unwrap_or_default()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    Star,
    DoubleStar,
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' if chars.peek() == Some(&'*') => {
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                tokens.push(Token::DoubleStar);
            }
            '*' => tokens.push(Token::Star),
            '?' => tokens.push(Token::AnyChar),
            literal => tokens.push(Token::Literal(literal)),
        }
    }
    tokens
}

/// Row-by-row table over (pattern position, text position); runs in
/// `O(pattern * text)` whatever the number of stars.
fn glob_match(pattern: &[Token], text: &[char]) -> bool {
    let len = text.len();
    // `next[j]`: does pattern[i + 1..] match text[j..]
    let mut next = vec![false; len + 1];
    next[len] = true;
    let mut row = vec![false; len + 1];

    for token in pattern.iter().rev() {
        for j in (0..=len).rev() {
            let ch = text.get(j).copied();
            row[j] = match *token {
                Token::Literal(literal) => ch == Some(literal) && next[j + 1],
                Token::AnyChar => matches!(ch, Some(c) if c != '/') && next[j + 1],
                Token::Star => next[j] || (matches!(ch, Some(c) if c != '/') && row[j + 1]),
                Token::DoubleStar => next[j] || (ch.is_some() && row[j + 1]),
            };
        }
        std::mem::swap(&mut next, &mut row);
    }
    next[0]
}
