use crate::agents::AgentResult;
use crate::shared::ids::TeamId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub condition: String,
    #[serde(default)]
    pub next_team: Option<TeamId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    #[serde(default)]
    pub default: Option<TeamId>,
}

/// What a routing predicate can see: the team's task results and its
/// aggregated data.
pub struct RoutingScope<'a> {
    pub results: &'a [AgentResult],
    pub data: &'a Value,
}

/// Evaluate rules in declaration order; the first match decides. A rule
/// whose predicate fails to evaluate is logged and treated as non-matching.
/// No match falls through to the policy default.
pub fn evaluate_routing(
    policy: &RoutingPolicy,
    scope: &RoutingScope<'_>,
) -> Option<TeamId> {
    for rule in &policy.rules {
        match evaluate_condition(&rule.condition, scope) {
            Ok(true) => return rule.next_team.clone(),
            Ok(false) => {}
            Err(reason) => {
                log::warn!(
                    "routing: condition `{}` failed to evaluate ({reason}); treating as no match",
                    rule.condition
                );
            }
        }
    }
    policy.default.clone()
}

/// Total, side-effect-free predicate language: the success aggregates
/// (`all_success`, `any_failure`, and their duals), dotted-path existence,
/// a `.length` pseudo-segment, integer comparison, `and`/`or`/`not` and
/// parentheses.
pub fn evaluate_condition(condition: &str, scope: &RoutingScope<'_>) -> Result<bool, String> {
    let tokens = tokenize(condition)?;
    let mut parser = Parser {
        tokens: &tokens,
        position: 0,
        scope,
    };
    let value = parser.expression()?;
    if parser.position != tokens.len() {
        return Err(format!(
            "unexpected trailing input at token {}",
            parser.position + 1
        ));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Compare(Comparison),
    LParen,
    RParen,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        match ch {
            ' ' | '\t' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let two = input.get(i..i + 2).unwrap_or("");
                let (comparison, width) = match two {
                    "==" => (Comparison::Eq, 2),
                    "!=" => (Comparison::Ne, 2),
                    "<=" => (Comparison::Le, 2),
                    ">=" => (Comparison::Ge, 2),
                    _ if ch == '<' => (Comparison::Lt, 1),
                    _ if ch == '>' => (Comparison::Gt, 1),
                    _ => return Err(format!("unexpected operator at byte {i}")),
                };
                tokens.push(Token::Compare(comparison));
                i += width;
            }
            _ if ch.is_ascii_digit() || (ch == '-' && peek_digit(bytes, i + 1)) => {
                let start = i;
                i += 1;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let literal = &input[start..i];
                let value = literal
                    .parse::<i64>()
                    .map_err(|_| format!("invalid integer `{literal}`"))?;
                tokens.push(Token::Int(value));
            }
            _ if is_ident_char(ch) => {
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i] as char) {
                    i += 1;
                }
                let word = &input[start..i];
                tokens.push(match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word.to_string()),
                });
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }
    Ok(tokens)
}

fn peek_digit(bytes: &[u8], index: usize) -> bool {
    bytes
        .get(index)
        .map(|b| (*b as char).is_ascii_digit())
        .unwrap_or(false)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
}

struct Parser<'a, 'b> {
    tokens: &'a [Token],
    position: usize,
    scope: &'a RoutingScope<'b>,
}

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<bool, String> {
        let mut value = self.conjunction()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.conjunction()?;
            value = value || right;
        }
        Ok(value)
    }

    fn conjunction(&mut self) -> Result<bool, String> {
        let mut value = self.unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.unary()?;
            value = value && right;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<bool, String> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(!self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, String> {
        match self.advance().cloned() {
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::Ident(word)) => self.ident_term(&word),
            Some(other) => Err(format!("unexpected token {other:?}")),
            None => Err("unexpected end of condition".to_string()),
        }
    }

    fn ident_term(&mut self, word: &str) -> Result<bool, String> {
        match word {
            "all_success" => {
                return Ok(self.scope.results.iter().all(|r| r.success));
            }
            "any_success" => {
                return Ok(self.scope.results.iter().any(|r| r.success));
            }
            "all_failure" => {
                return Ok(self.scope.results.iter().all(|r| !r.success));
            }
            "any_failure" => {
                return Ok(self.scope.results.iter().any(|r| !r.success));
            }
            _ => {}
        }

        if let Some(Token::Compare(comparison)) = self.peek().cloned() {
            self.advance();
            let Some(Token::Int(expected)) = self.advance().cloned() else {
                return Err(format!("comparison against `{word}` needs an integer"));
            };
            let actual = self
                .resolve_integer(word)
                .ok_or_else(|| format!("path `{word}` does not resolve to an integer"))?;
            return Ok(match comparison {
                Comparison::Eq => actual == expected,
                Comparison::Ne => actual != expected,
                Comparison::Lt => actual < expected,
                Comparison::Le => actual <= expected,
                Comparison::Gt => actual > expected,
                Comparison::Ge => actual >= expected,
            });
        }

        // Bare dotted path: existence check.
        Ok(self
            .resolve_path(word)
            .map(|value| !value.is_null())
            .unwrap_or(false))
    }

    fn resolve_integer(&self, path: &str) -> Option<i64> {
        if let Some(prefix) = path.strip_suffix(".length") {
            let value = self.resolve_path(prefix)?;
            let length = match value {
                Value::Array(items) => items.len(),
                Value::String(text) => text.len(),
                Value::Object(map) => map.len(),
                _ => return None,
            };
            return i64::try_from(length).ok();
        }
        self.resolve_path(path)?.as_i64()
    }

    fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = match first {
            "data" => self.scope.data,
            _ => return None,
        };
        for segment in segments {
            if segment.is_empty() {
                return None;
            }
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}
