//! RSE expressions: a tiny set language over endpoints.
//!
//! ```text
//! expr := term (op term)*          op: '|' union, '&' intersection, '\' difference
//! term := '(' expr ')' | '*' | key=value | key<number | key>number | name
//! ```
//!
//! Operators have equal precedence and associate to the left, so
//! `A|B&C` is `(A|B)&C`. Use parentheses to say anything else.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::ids::RseId;
use super::rse::Rse;

/// Deepest parenthesis nesting accepted.
pub const MAX_NESTING: usize = 32;

/// Most terms accepted in one expression.
pub const MAX_TERMS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unbalanced parenthesis at offset {0}")]
    UnbalancedParen(usize),

    #[error("'{value}' is not a number (in {key} comparison)")]
    InvalidNumber { key: String, value: String },

    #[error("parentheses nested deeper than {limit} levels at offset {offset}")]
    TooDeep { offset: usize, limit: usize },

    #[error("expression has more than {limit} terms")]
    TooManyTerms { limit: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Union,
    Intersection,
    Difference,
    Star,
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Union => f.write_str("|"),
            Token::Intersection => f.write_str("&"),
            Token::Difference => f.write_str("\\"),
            Token::Star => f.write_str("*"),
            Token::Word(w) => f.write_str(w),
        }
    }
}

fn tokenize(input: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '|' => Token::Union,
            '&' => Token::Intersection,
            '\\' => Token::Difference,
            '*' => Token::Star,
            _ => {
                let mut word = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() || "()|&\\*".contains(next) {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                Token::Word(word)
            }
        };
        tokens.push((offset, token));
    }
    tokens
}

/// Parsed RSE expression.
#[derive(Debug, Clone, PartialEq)]
pub enum RseExpression {
    All,
    Name(String),
    Equals { key: String, value: String },
    LessThan { key: String, value: f64 },
    GreaterThan { key: String, value: f64 },
    Union(Box<RseExpression>, Box<RseExpression>),
    Intersection(Box<RseExpression>, Box<RseExpression>),
    Difference(Box<RseExpression>, Box<RseExpression>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
    depth: usize,
    terms: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expr(&mut self) -> Result<RseExpression, ExpressionError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some((_, Token::Union)) => RseExpression::Union,
                Some((_, Token::Intersection)) => RseExpression::Intersection,
                Some((_, Token::Difference)) => RseExpression::Difference,
                _ => return Ok(left),
            };
            self.next();
            let right = self.term()?;
            left = op(Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<RseExpression, ExpressionError> {
        self.terms += 1;
        if self.terms > MAX_TERMS {
            return Err(ExpressionError::TooManyTerms { limit: MAX_TERMS });
        }
        match self.next() {
            Some((open, Token::LParen)) => {
                if self.depth >= MAX_NESTING {
                    return Err(ExpressionError::TooDeep {
                        offset: open,
                        limit: MAX_NESTING,
                    });
                }
                self.depth += 1;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some((_, Token::RParen)) => Ok(inner),
                    Some((offset, found)) => Err(ExpressionError::UnexpectedToken {
                        found: found.to_string(),
                        offset,
                    }),
                    None => Err(ExpressionError::UnbalancedParen(open)),
                }
            }
            Some((_, Token::Star)) => Ok(RseExpression::All),
            Some((_, Token::Word(word))) => primitive(&word),
            Some((offset, found)) => Err(ExpressionError::UnexpectedToken {
                found: found.to_string(),
                offset,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

fn primitive(word: &str) -> Result<RseExpression, ExpressionError> {
    if let Some((key, value)) = word.split_once('=') {
        return Ok(RseExpression::Equals {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    let number = |key: &str, value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| ExpressionError::InvalidNumber {
                key: key.to_string(),
                value: value.to_string(),
            })
    };
    if let Some((key, value)) = word.split_once('<') {
        return Ok(RseExpression::LessThan {
            key: key.to_string(),
            value: number(key, value)?,
        });
    }
    if let Some((key, value)) = word.split_once('>') {
        return Ok(RseExpression::GreaterThan {
            key: key.to_string(),
            value: number(key, value)?,
        });
    }
    Ok(RseExpression::Name(word.to_string()))
}

impl FromStr for RseExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s);
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser {
            len: tokens.len(),
            tokens,
            pos: 0,
            depth: 0,
            terms: 0,
        };
        let expr = parser.expr()?;
        if parser.pos < parser.len {
            let (offset, found) = parser.tokens[parser.pos].clone();
            return Err(match found {
                Token::RParen => ExpressionError::UnbalancedParen(offset),
                other => ExpressionError::UnexpectedToken {
                    found: other.to_string(),
                    offset,
                },
            });
        }
        Ok(expr)
    }
}

impl RseExpression {
    pub fn parse(s: &str) -> Result<Self, ExpressionError> {
        s.parse()
    }

    fn numeric(rse: &Rse, key: &str) -> Option<f64> {
        rse.attribute(key).and_then(|v| v.parse::<f64>().ok())
    }

    /// Set of endpoints in `rses` matched by this expression.
    pub fn evaluate(&self, rses: &[Rse]) -> BTreeSet<RseId> {
        match self {
            RseExpression::Union(a, b) => {
                let mut set = a.evaluate(rses);
                set.extend(b.evaluate(rses));
                set
            }
            RseExpression::Intersection(a, b) => {
                let right = b.evaluate(rses);
                a.evaluate(rses)
                    .into_iter()
                    .filter(|id| right.contains(id))
                    .collect()
            }
            RseExpression::Difference(a, b) => {
                let right = b.evaluate(rses);
                a.evaluate(rses)
                    .into_iter()
                    .filter(|id| !right.contains(id))
                    .collect()
            }
            atom => rses
                .iter()
                .filter(|rse| atom.matches(rse))
                .map(|rse| rse.id.clone())
                .collect(),
        }
    }

    /// Does this expression select `rse`?
    pub fn matches(&self, rse: &Rse) -> bool {
        match self {
            RseExpression::All => true,
            RseExpression::Name(name) => {
                rse.id.as_str() == name
                    || rse
                        .attribute(name)
                        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
            }
            RseExpression::Equals { key, value } => rse.attribute(key) == Some(value.as_str()),
            RseExpression::LessThan { key, value } => {
                Self::numeric(rse, key).is_some_and(|v| v < *value)
            }
            RseExpression::GreaterThan { key, value } => {
                Self::numeric(rse, key).is_some_and(|v| v > *value)
            }
            RseExpression::Union(a, b) => a.matches(rse) || b.matches(rse),
            RseExpression::Intersection(a, b) => a.matches(rse) && b.matches(rse),
            RseExpression::Difference(a, b) => a.matches(rse) && !b.matches(rse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rses() -> Vec<Rse> {
        vec![
            Rse::new("CERN_DATADISK")
                .with_attribute("tier", "0")
                .with_attribute("country", "ch")
                .with_attribute("istape", "false"),
            Rse::new("CERN_TAPE")
                .with_attribute("tier", "0")
                .with_attribute("country", "ch")
                .with_attribute("istape", "true"),
            Rse::new("BNL_DATADISK")
                .with_vo("atlas")
                .with_attribute("tier", "1")
                .with_attribute("country", "us")
                .with_attribute("freespace", "120.5"),
            Rse::new("DESY_SCRATCH")
                .with_attribute("tier", "2")
                .with_attribute("country", "de")
                .with_attribute("freespace", "7"),
        ]
    }

    fn names(set: BTreeSet<RseId>) -> Vec<String> {
        set.into_iter().map(|id| id.to_string()).collect()
    }

    #[rstest]
    #[case::all("*", &["BNL_DATADISK", "CERN_DATADISK", "CERN_TAPE", "DESY_SCRATCH"])]
    #[case::name("CERN_TAPE", &["CERN_TAPE"])]
    #[case::boolean_attribute("istape", &["CERN_TAPE"])]
    #[case::equals("country=ch", &["CERN_DATADISK", "CERN_TAPE"])]
    #[case::builtin_vo("vo=atlas", &["BNL_DATADISK"])]
    #[case::less_than("freespace<10", &["DESY_SCRATCH"])]
    #[case::greater_than("tier>0", &["BNL_DATADISK", "DESY_SCRATCH"])]
    #[case::union("CERN_TAPE|DESY_SCRATCH", &["CERN_TAPE", "DESY_SCRATCH"])]
    #[case::intersection("tier=0&istape", &["CERN_TAPE"])]
    #[case::difference("*\\istape", &["BNL_DATADISK", "CERN_DATADISK", "DESY_SCRATCH"])]
    #[case::left_assoc("country=ch|tier=1&istape", &["CERN_TAPE"])]
    #[case::grouped("country=ch|(tier=1&istape)", &["CERN_DATADISK", "CERN_TAPE"])]
    #[case::whitespace(" country=de | country=us ", &["BNL_DATADISK", "DESY_SCRATCH"])]
    #[case::no_match("country=fr", &[])]
    fn evaluates(#[case] input: &str, #[case] expected: &[&str]) {
        let expr = RseExpression::parse(input).unwrap();
        assert_eq!(names(expr.evaluate(&rses())), expected);
    }

    #[rstest]
    #[case::empty("", ExpressionError::Empty)]
    #[case::blank("   ", ExpressionError::Empty)]
    #[case::dangling_op("tier=0|", ExpressionError::UnexpectedEnd)]
    #[case::unclosed("(tier=0", ExpressionError::UnbalancedParen(0))]
    #[case::stray_close("tier=0)", ExpressionError::UnbalancedParen(6))]
    #[case::leading_op("|tier=0", ExpressionError::UnexpectedToken { found: "|".into(), offset: 0 })]
    fn rejects_malformed(#[case] input: &str, #[case] expected: ExpressionError) {
        assert_eq!(RseExpression::parse(input).unwrap_err(), expected);
    }

    #[test]
    fn rejects_non_numeric_comparison() {
        let err = RseExpression::parse("freespace<lots").unwrap_err();
        assert!(matches!(err, ExpressionError::InvalidNumber { .. }));
    }

    #[test]
    fn nesting_is_bounded() {
        let ok = format!("{}tier=0{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(RseExpression::parse(&ok).is_ok());

        let deep = format!("{}tier=0{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(
            RseExpression::parse(&deep).unwrap_err(),
            ExpressionError::TooDeep {
                offset: MAX_NESTING,
                limit: MAX_NESTING,
            }
        );
    }

    #[test]
    fn term_count_is_bounded() {
        let ok = vec!["tier=0"; MAX_TERMS].join("|");
        assert!(RseExpression::parse(&ok).is_ok());

        let long = vec!["tier=0"; 100_000].join("|");
        assert_eq!(
            RseExpression::parse(&long).unwrap_err(),
            ExpressionError::TooManyTerms { limit: MAX_TERMS }
        );
    }

    #[test]
    fn matches_agrees_with_evaluate() {
        let expr = RseExpression::parse("(country=ch|country=us)\\istape").unwrap();
        let all = rses();
        let selected = expr.evaluate(&all);
        for rse in &all {
            assert_eq!(expr.matches(rse), selected.contains(&rse.id), "{}", rse.id);
        }
    }
}
