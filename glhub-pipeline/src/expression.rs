//! Rule condition evaluator
//!
//! Evaluates the expressions found in `rules:if` against a variable map.
//! Precedence from weakest to strongest: `||`, `&&`, comparison
//! (`==`, `!=`, `=~`, `!~`), unary `!`, primary.
//!
//! Evaluation is total: any input yields a boolean. Malformed fragments
//! evaluate to the null value and an invalid regex never matches.

use std::collections::HashMap;
use std::hash::BuildHasher;

use indexmap::IndexMap;
use regex::RegexBuilder;

/// Maximum parenthesis nesting; deeper groups evaluate to null
const MAX_DEPTH: usize = 64;

/// Characters that end a bare identifier
const BARE_STOP: &str = "()!=&|\"'~$";

/// Read-only variable context for expression evaluation
pub trait Variables {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl<S: BuildHasher> Variables for HashMap<String, String, S> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl<S: BuildHasher> Variables for IndexMap<String, String, S> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Evaluate `expr` against `vars`
///
/// An empty expression is true.
pub fn evaluate<V: Variables + ?Sized>(expr: &str, vars: &V) -> bool {
    if expr.trim().is_empty() {
        return true;
    }
    Parser::new(expr, vars).parse_or().truthy()
}

/// Value produced while evaluating; `Null` stands for an undefined variable
#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Null,
    Text(String),
}

impl Operand {
    fn from_bool(value: bool) -> Self {
        Operand::Text(value.to_string())
    }

    fn truthy(&self) -> bool {
        match self {
            Operand::Null => false,
            Operand::Text(s) => !s.is_empty() && s != "false" && s != "0",
        }
    }
}

struct Parser<'a, V: ?Sized> {
    src: &'a str,
    pos: usize,
    depth: usize,
    vars: &'a V,
}

impl<'a, V: Variables + ?Sized> Parser<'a, V> {
    fn new(src: &'a str, vars: &'a V) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
            vars,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    // ===== Binary operators =====

    fn parse_or(&mut self) -> Operand {
        let mut left = self.parse_and();
        loop {
            self.skip_ws();
            if !self.eat("||") {
                return left;
            }
            let right = self.parse_and();
            left = Operand::from_bool(left.truthy() || right.truthy());
        }
    }

    fn parse_and(&mut self) -> Operand {
        let mut left = self.parse_comparison();
        loop {
            self.skip_ws();
            if !self.eat("&&") {
                return left;
            }
            let right = self.parse_comparison();
            left = Operand::from_bool(left.truthy() && right.truthy());
        }
    }

    fn parse_comparison(&mut self) -> Operand {
        let left = self.parse_unary();
        self.skip_ws();

        if self.eat("==") {
            let right = self.parse_unary();
            Operand::from_bool(left == right)
        } else if self.eat("!=") {
            let right = self.parse_unary();
            Operand::from_bool(left != right)
        } else if self.eat("=~") {
            Operand::from_bool(self.match_pattern(&left))
        } else if self.eat("!~") {
            Operand::from_bool(!self.match_pattern(&left))
        } else {
            left
        }
    }

    // ===== Unary and primary =====

    fn parse_unary(&mut self) -> Operand {
        let mut negations = 0usize;
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with('!') && !rest.starts_with("!=") && !rest.starts_with("!~") {
                self.bump();
                negations += 1;
            } else {
                break;
            }
        }

        let value = self.parse_primary();
        if negations == 0 {
            value
        } else {
            Operand::from_bool(value.truthy() ^ (negations % 2 == 1))
        }
    }

    fn parse_primary(&mut self) -> Operand {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Operand::Null;
        };

        match c {
            '(' => {
                self.bump();
                if self.depth >= MAX_DEPTH {
                    return Operand::Null;
                }
                self.depth += 1;
                let inner = self.parse_or();
                self.depth -= 1;
                self.skip_ws();
                self.eat(")");
                Operand::from_bool(inner.truthy())
            }
            '"' => {
                self.bump();
                Operand::Text(self.read_double_quoted())
            }
            '\'' => {
                self.bump();
                Operand::Text(self.read_until('\''))
            }
            '$' => {
                self.bump();
                self.read_variable()
            }
            _ => self.read_bare(),
        }
    }

    fn read_double_quoted(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => break,
                '\\' => {
                    if let Some(escaped) = self.bump() {
                        out.push(escaped);
                    }
                }
                other => out.push(other),
            }
        }
        out
    }

    fn read_until(&mut self, end: char) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump() {
            if c == end {
                break;
            }
            out.push(c);
        }
        out
    }

    fn read_variable(&mut self) -> Operand {
        let braced = self.eat("{");
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let name = &self.src[start..self.pos];
        if braced {
            self.eat("}");
        }

        if name.is_empty() {
            return Operand::Null;
        }
        match self.vars.lookup(name) {
            Some(value) => Operand::Text(value.to_string()),
            None => Operand::Null,
        }
    }

    fn read_bare(&mut self) -> Operand {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !BARE_STOP.contains(c))
        {
            self.bump();
        }
        let word = &self.src[start..self.pos];

        if word.is_empty() {
            // Stray operator character; consume it so evaluation moves on
            if self.peek() != Some(')') {
                self.bump();
            }
            return Operand::Null;
        }

        match word {
            "null" => Operand::Null,
            other => Operand::Text(other.to_string()),
        }
    }

    // ===== Regex matching =====

    /// Parse the right-hand side of `=~` and match `left` against it
    fn match_pattern(&mut self, left: &Operand) -> bool {
        self.skip_ws();
        let (pattern, case_insensitive) = if self.peek() == Some('/') {
            self.bump();
            self.read_pattern_literal()
        } else {
            match self.parse_unary() {
                Operand::Null => return false,
                Operand::Text(text) => split_pattern_text(&text),
            }
        };

        let Operand::Text(subject) = left else {
            return false;
        };

        match RegexBuilder::new(&pattern)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(re) => re.is_match(subject),
            Err(_) => false,
        }
    }

    /// Read a `/pattern/flags` literal after the opening slash
    fn read_pattern_literal(&mut self) -> (String, bool) {
        let mut pattern = String::new();
        while let Some(c) = self.bump() {
            match c {
                '/' => break,
                '\\' => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(escaped) => {
                        pattern.push('\\');
                        pattern.push(escaped);
                    }
                    None => pattern.push('\\'),
                },
                other => pattern.push(other),
            }
        }

        let mut case_insensitive = false;
        while let Some(flag) = self.peek().filter(char::is_ascii_lowercase) {
            self.bump();
            if flag == 'i' {
                case_insensitive = true;
            }
        }
        (pattern, case_insensitive)
    }
}

/// A pattern held in a variable, either `/re/flags` or a plain regex
fn split_pattern_text(text: &str) -> (String, bool) {
    if let Some(body) = text.strip_prefix('/') {
        if let Some(end) = body.rfind('/') {
            let flags = &body[end + 1..];
            if flags.chars().all(|c| c.is_ascii_lowercase()) {
                return (body[..end].to_string(), flags.contains('i'));
            }
        }
    }
    (text.to_string(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_expression_is_true() {
        assert!(evaluate("", &vars(&[])));
        assert!(evaluate("   ", &vars(&[])));
    }

    #[test]
    fn test_equality() {
        let ctx = vars(&[("CI_PIPELINE_SOURCE", "push"), ("EMPTY", "")]);
        assert!(evaluate(r#"$CI_PIPELINE_SOURCE == "push""#, &ctx));
        assert!(evaluate(r#"${CI_PIPELINE_SOURCE} == 'push'"#, &ctx));
        assert!(!evaluate(r#"$CI_PIPELINE_SOURCE == "merge_request_event""#, &ctx));
        assert!(evaluate(r#"$CI_PIPELINE_SOURCE != "schedule""#, &ctx));
        assert!(evaluate(r#"$EMPTY == """#, &ctx));
    }

    #[test]
    fn test_null_is_distinct_from_empty() {
        let ctx = vars(&[("EMPTY", "")]);
        assert!(evaluate("$UNDEFINED == null", &ctx));
        assert!(!evaluate("$EMPTY == null", &ctx));
        assert!(!evaluate(r#"$UNDEFINED == """#, &ctx));
        assert!(evaluate("$EMPTY != null", &ctx));
    }

    #[test]
    fn test_truthiness() {
        let ctx = vars(&[("ON", "yes"), ("OFF", "false"), ("ZERO", "0"), ("EMPTY", "")]);
        assert!(evaluate("$ON", &ctx));
        assert!(!evaluate("$OFF", &ctx));
        assert!(!evaluate("$ZERO", &ctx));
        assert!(!evaluate("$EMPTY", &ctx));
        assert!(!evaluate("$MISSING", &ctx));
        assert!(evaluate("!$MISSING", &ctx));
        assert!(evaluate("!!$ON", &ctx));
        assert!(evaluate("true", &ctx));
        assert!(!evaluate("false", &ctx));
    }

    #[test]
    fn test_boolean_operators_and_precedence() {
        let ctx = vars(&[("A", "1"), ("B", "2")]);
        assert!(evaluate(r#"$A == "1" && $B == "2""#, &ctx));
        assert!(!evaluate(r#"$A == "1" && $B == "3""#, &ctx));
        assert!(evaluate(r#"$A == "9" || $B == "2""#, &ctx));
        // && binds tighter than ||
        assert!(evaluate(r#"$A == "1" || $B == "3" && $A == "9""#, &ctx));
        assert!(!evaluate(r#"($A == "1" || $B == "3") && $A == "9""#, &ctx));
    }

    #[test]
    fn test_regex_match() {
        let ctx = vars(&[("BRANCH", "release/1.2"), ("NAME", "Feature-X")]);
        assert!(evaluate(r"$BRANCH =~ /^release\/\d+/", &ctx));
        assert!(!evaluate(r"$BRANCH !~ /^release/", &ctx));
        assert!(evaluate("$NAME =~ /feature/i", &ctx));
        assert!(!evaluate("$NAME =~ /feature/", &ctx));
    }

    #[test]
    fn test_regex_null_and_invalid() {
        let ctx = vars(&[("A", "abc")]);
        assert!(!evaluate("$A =~ null", &ctx));
        assert!(evaluate("$A !~ null", &ctx));
        assert!(!evaluate("$A =~ /(unclosed/", &ctx));
        assert!(evaluate("$A !~ /(unclosed/", &ctx));
        assert!(!evaluate("$MISSING =~ /.*/", &ctx));
    }

    #[test]
    fn test_regex_from_variable() {
        let ctx = vars(&[("A", "abc"), ("PATTERN", "/^AB/i")]);
        assert!(evaluate("$A =~ $PATTERN", &ctx));
    }

    #[test]
    fn test_double_quoted_escape() {
        let ctx = vars(&[("Q", "say \"hi\"")]);
        assert!(evaluate(r#"$Q == "say \"hi\"""#, &ctx));
    }

    #[test]
    fn test_bare_identifier_is_literal() {
        let ctx = vars(&[("ENV", "production")]);
        assert!(evaluate("$ENV == production", &ctx));
    }

    #[test]
    fn test_deep_nesting_terminates() {
        let expr = format!("{}$A{}", "(".repeat(500), ")".repeat(500));
        let _ = evaluate(&expr, &vars(&[("A", "1")]));
    }

    proptest! {
        #[test]
        fn prop_evaluate_is_total(expr in "\\PC{0,80}") {
            let ctx = vars(&[("A", "1"), ("B", "")]);
            let _ = evaluate(&expr, &ctx);
        }

        #[test]
        fn prop_evaluate_is_total_on_operator_soup(
            expr in r#"[ $A-B_=!~/()&|"'a-z0-9{}\\]{0,64}"#
        ) {
            let ctx = vars(&[("A", "1"), ("B", "x")]);
            let _ = evaluate(&expr, &ctx);
        }
    }
}
