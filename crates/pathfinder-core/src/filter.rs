//! Subscription filter: an LDAP-like predicate over a [`Props`] multimap.
//!
//! Grammar (informal):
//!
//! ```text
//! filter     := '(' body ')'
//! body       := and | or | not | item
//! and        := '&' filter+
//! or         := '|' filter+
//! not        := '!' filter
//! item       := key ('=' | '<=' | '>=' | '<' | '>') value
//! ```
//!
//! `key = *` is presence. A string `value` containing `*` is matched with
//! glob semantics (`*` matches any substring, including the empty one); a
//! `value` with no `*` that also parses as an integer literal is compared
//! numerically. Comparison operators (`< <= > >=`) always parse their
//! operand as an integer and are a syntax error otherwise.
//!
//! A leaf matches a [`Props`] multimap iff *any* element of the value set at
//! `key` satisfies the relation; comparing an integer relation against a
//! string value (or vice versa) makes that element fail, not error.

use crate::props::{Props, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Leaf {
    /// `key = *`
    Present(String),
    /// `key = <int>` with no wildcard.
    EqInt(String, i64),
    /// `key = <glob>`, where glob may or may not contain `*`.
    EqGlob(String, String),
    /// `key <op> <int>`
    Cmp(String, CmpOp, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Leaf(Leaf),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

/// A parsed, ready-to-evaluate subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    root: Node,
    node_count: usize,
}

/// The filter text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSyntaxError(pub String);

impl fmt::Display for FilterSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FilterSyntaxError {}

impl Filter {
    /// Parse `text` into a compiled filter. The empty filter `"()"` is not
    /// accepted; every leaf must name a key.
    pub fn parse(text: &str) -> Result<Filter, FilterSyntaxError> {
        let chars: Vec<char> = text.chars().collect();
        let mut p = Parser { chars: &chars, pos: 0 };
        p.skip_ws();
        let root = p.parse_filter()?;
        p.skip_ws();
        if p.pos != chars.len() {
            return Err(FilterSyntaxError(format!(
                "trailing input after filter at position {}",
                p.pos
            )));
        }
        let node_count = count_nodes(&root);
        Ok(Filter { root, node_count })
    }

    /// Number of nodes in the compiled tree — the resource charge for this
    /// subscription's filter complexity.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Evaluate the filter against a property multimap.
    pub fn matches(&self, props: &Props) -> bool {
        eval(&self.root, props)
    }
}

fn count_nodes(node: &Node) -> usize {
    match node {
        Node::Leaf(_) => 1,
        Node::Not(inner) => 1 + count_nodes(inner),
        Node::And(children) | Node::Or(children) => {
            1 + children.iter().map(count_nodes).sum::<usize>()
        }
    }
}

fn eval(node: &Node, props: &Props) -> bool {
    match node {
        Node::Leaf(leaf) => eval_leaf(leaf, props),
        Node::And(children) => children.iter().all(|c| eval(c, props)),
        Node::Or(children) => children.iter().any(|c| eval(c, props)),
        Node::Not(inner) => !eval(inner, props),
    }
}

fn eval_leaf(leaf: &Leaf, props: &Props) -> bool {
    match leaf {
        Leaf::Present(key) => props.get(key).next().is_some(),
        Leaf::EqInt(key, want) => props.get(key).any(|v| matches!(v, Value::Int(n) if n == want)),
        Leaf::EqGlob(key, pattern) => props.get(key).any(|v| match v {
            Value::Str(s) => glob_match(pattern, s),
            Value::Int(_) => false,
        }),
        Leaf::Cmp(key, op, want) => props.get(key).any(|v| match v {
            Value::Int(n) => match op {
                CmpOp::Lt => n < want,
                CmpOp::Le => n <= want,
                CmpOp::Gt => n > want,
                CmpOp::Ge => n >= want,
            },
            Value::Str(_) => false,
        }),
    }
}

/// `*` matches any substring (including empty); every other character must
/// match literally. Supports any number of `*` tokens.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == candidate;
    }

    let mut rest = candidate;
    for (i, seg) in segments.iter().enumerate() {
        if i == 0 {
            if !rest.starts_with(seg) {
                return false;
            }
            rest = &rest[seg.len()..];
            continue;
        }
        if i == segments.len() - 1 {
            return rest.ends_with(seg);
        }
        match rest.find(seg) {
            Some(idx) if !seg.is_empty() => rest = &rest[idx + seg.len()..],
            Some(_) => {} // empty segment between two wildcards, matches trivially
            None => return false,
        }
    }
    true
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), FilterSyntaxError> {
        if self.bump() == Some(c) {
            Ok(())
        } else {
            Err(FilterSyntaxError(format!(
                "expected '{c}' at position {}",
                self.pos.saturating_sub(1)
            )))
        }
    }

    /// Parses one `( ... )` group.
    fn parse_filter(&mut self) -> Result<Node, FilterSyntaxError> {
        self.expect('(')?;
        let node = match self.peek() {
            Some('&') => {
                self.bump();
                let children = self.parse_filter_list()?;
                Node::And(children)
            }
            Some('|') => {
                self.bump();
                let children = self.parse_filter_list()?;
                Node::Or(children)
            }
            Some('!') => {
                self.bump();
                let inner = self.parse_filter()?;
                Node::Not(Box::new(inner))
            }
            _ => Node::Leaf(self.parse_item()?),
        };
        self.expect(')')?;
        Ok(node)
    }

    fn parse_filter_list(&mut self) -> Result<Vec<Node>, FilterSyntaxError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(')') {
                break;
            }
            out.push(self.parse_filter()?);
        }
        if out.is_empty() {
            return Err(FilterSyntaxError(
                "conjunction/disjunction requires at least one child".to_string(),
            ));
        }
        Ok(out)
    }

    fn parse_item(&mut self) -> Result<Leaf, FilterSyntaxError> {
        let key_start = self.pos;
        while matches!(self.peek(), Some(c) if c != '=' && c != '<' && c != '>' && c != ')') {
            self.pos += 1;
        }
        if self.pos == key_start {
            return Err(FilterSyntaxError(format!(
                "expected attribute name at position {key_start}"
            )));
        }
        let key: String = self.chars[key_start..self.pos].iter().collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(FilterSyntaxError(format!(
                "empty attribute name at position {key_start}"
            )));
        }

        let op = self.parse_op()?;

        let value_start = self.pos;
        while matches!(self.peek(), Some(c) if c != ')') {
            self.pos += 1;
        }
        let value: String = self.chars[value_start..self.pos].iter().collect();

        match op {
            Op::Eq => {
                if value == "*" {
                    Ok(Leaf::Present(key))
                } else if !value.contains('*') {
                    if let Ok(n) = value.parse::<i64>() {
                        Ok(Leaf::EqInt(key, n))
                    } else {
                        Ok(Leaf::EqGlob(key, value))
                    }
                } else {
                    Ok(Leaf::EqGlob(key, value))
                }
            }
            Op::Cmp(cmp) => {
                let n: i64 = value.parse().map_err(|_| {
                    FilterSyntaxError(format!(
                        "comparison on '{key}' requires an integer operand, got '{value}'"
                    ))
                })?;
                Ok(Leaf::Cmp(key, cmp, n))
            }
        }
    }

    fn parse_op(&mut self) -> Result<Op, FilterSyntaxError> {
        match self.bump() {
            Some('=') => Ok(Op::Eq),
            Some('<') => {
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(Op::Cmp(CmpOp::Le))
                } else {
                    Ok(Op::Cmp(CmpOp::Lt))
                }
            }
            Some('>') => {
                if self.peek() == Some('=') {
                    self.bump();
                    Ok(Op::Cmp(CmpOp::Ge))
                } else {
                    Ok(Op::Cmp(CmpOp::Gt))
                }
            }
            other => Err(FilterSyntaxError(format!(
                "expected a relational operator, got {other:?} at position {}",
                self.pos.saturating_sub(1)
            ))),
        }
    }
}

enum Op {
    Eq,
    Cmp(CmpOp),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Props {
        let mut p = Props::new();
        for (k, v) in pairs {
            p.insert(*k, v.clone());
        }
        p
    }

    #[test]
    fn equality_matches_any_element_of_multivalue() {
        let f = Filter::parse("(name=foo)").unwrap();
        let p = props(&[("name", Value::from("bar")), ("name", Value::from("foo"))]);
        assert!(f.matches(&p));
    }

    #[test]
    fn presence_requires_nonempty_key() {
        let f = Filter::parse("(color=*)").unwrap();
        assert!(f.matches(&props(&[("color", Value::from("green"))])));
        assert!(!f.matches(&Props::new()));
    }

    #[test]
    fn glob_wildcard_matches_substring() {
        let f = Filter::parse("(name=fo*)").unwrap();
        assert!(f.matches(&props(&[("name", Value::from("foobar"))])));
        assert!(!f.matches(&props(&[("name", Value::from("barfoo"))])));

        let f = Filter::parse("(name=*bar)").unwrap();
        assert!(f.matches(&props(&[("name", Value::from("foobar"))])));

        let f = Filter::parse("(name=*oob*)").unwrap();
        assert!(f.matches(&props(&[("name", Value::from("foobar"))])));
    }

    #[test]
    fn integer_comparisons() {
        let f = Filter::parse("(port>=8000)").unwrap();
        assert!(f.matches(&props(&[("port", Value::Int(8080))])));
        assert!(!f.matches(&props(&[("port", Value::Int(80))])));
    }

    #[test]
    fn type_mismatch_fails_rather_than_errors() {
        let f = Filter::parse("(port>8000)").unwrap();
        assert!(!f.matches(&props(&[("port", Value::from("not-a-number"))])));

        let f = Filter::parse("(name=foo)").unwrap();
        assert!(!f.matches(&props(&[("name", Value::Int(5))])));
    }

    #[test]
    fn conjunction_disjunction_negation() {
        let f = Filter::parse("(&(name=foo)(color=green))").unwrap();
        assert!(f.matches(&props(&[
            ("name", Value::from("foo")),
            ("color", Value::from("green"))
        ])));
        assert!(!f.matches(&props(&[("name", Value::from("foo"))])));

        let f = Filter::parse("(|(name=foo)(name=bar))").unwrap();
        assert!(f.matches(&props(&[("name", Value::from("bar"))])));

        let f = Filter::parse("(!(name=foo))").unwrap();
        assert!(f.matches(&props(&[("name", Value::from("bar"))])));
        assert!(!f.matches(&props(&[("name", Value::from("foo"))])));
    }

    #[test]
    fn node_count_counts_every_node() {
        // And + two leaves = 3
        let f = Filter::parse("(&(name=foo)(color=green))").unwrap();
        assert_eq!(f.node_count(), 3);

        let f = Filter::parse("(name=foo)").unwrap();
        assert_eq!(f.node_count(), 1);
    }

    #[test]
    fn unbalanced_parens_is_syntax_error() {
        assert!(Filter::parse("(&(name=x)").is_err());
    }

    #[test]
    fn empty_conjunction_is_syntax_error() {
        assert!(Filter::parse("(&)").is_err());
    }

    #[test]
    fn filter_round_trip_against_witness() {
        // For every compiled filter, evaluation against its own witness
        // property set returns true.
        for (text, witness) in [
            ("(name=foo)", vec![("name", Value::from("foo"))]),
            ("(count>=3)", vec![("count", Value::Int(3))]),
            ("(tag=*)", vec![("tag", Value::from("anything"))]),
        ] {
            let f = Filter::parse(text).unwrap();
            let p = props(&witness);
            assert!(f.matches(&p), "filter {text} should match its witness");
        }
    }
}
