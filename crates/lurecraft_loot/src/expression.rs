//! # Expression Evaluator
//!
//! Evaluates arithmetic weight expressions once every placeholder has been
//! substituted.
//!
//! ## Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('^' unary)?
//! primary := number | ident '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Functions: `min`, `max`, `abs`, `floor`, `ceil`, `round`, `sqrt`.
//!
//! Any `{` or `}` left in the text means a placeholder was never
//! substituted, which is an error rather than a silent zero.
//!
//! Nesting (parentheses, calls, sign and exponent chains) is capped at
//! [`MAX_NESTING`] levels; deeper input is an evaluation error.

use crate::error::{LootError, LootResult};

/// Deepest nesting the parser accepts.
pub const MAX_NESTING: usize = 256;

/// Evaluates an arithmetic expression.
///
/// # Errors
///
/// Returns [`LootError::Evaluation`] on malformed syntax, a leftover
/// placeholder token, an unknown function, division by zero, or nesting
/// deeper than [`MAX_NESTING`].
pub fn evaluate(text: &str) -> LootResult<f64> {
    if text.contains(['{', '}']) {
        return Err(LootError::evaluation(text, "unresolved placeholder"));
    }

    let mut parser = Parser::new(text);
    let value = parser.expr()?;
    parser.skip_whitespace();
    if let Some(c) = parser.peek() {
        return Err(parser.fail(format!("unexpected '{c}'")));
    }
    Ok(value)
}

/// Recursive-descent parser over the expression bytes.
struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn fail(&self, reason: impl Into<String>) -> LootError {
        LootError::evaluation(self.src, format!("{} at offset {}", reason.into(), self.pos))
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.bytes.get(self.pos).map(|&b| char::from(b))
    }

    /// Consumes `expected` if it is the next non-blank character.
    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> LootResult<f64> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> LootResult<f64> {
        let mut value = self.unary()?;
        loop {
            if self.eat('*') {
                value *= self.unary()?;
            } else if self.eat('/') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(self.fail("division by zero"));
                }
                value /= rhs;
            } else if self.eat('%') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(self.fail("modulo by zero"));
                }
                value %= rhs;
            } else {
                return Ok(value);
            }
        }
    }

    /// Every recursive path passes through here, so this is where depth
    /// is counted.
    fn unary(&mut self) -> LootResult<f64> {
        if self.depth >= MAX_NESTING {
            return Err(self.fail("expression nested too deeply"));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> LootResult<f64> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> LootResult<f64> {
        let base = self.primary()?;
        if self.eat('^') {
            // Right-associative: 2^3^2 == 2^(3^2)
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> LootResult<f64> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if !self.eat(')') {
                    return Err(self.fail("expected ')'"));
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.call(),
            Some(c) => Err(self.fail(format!("unexpected '{c}'"))),
            None => Err(self.fail("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> LootResult<f64> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_digit() || self.bytes[self.pos] == b'.')
        {
            self.pos += 1;
        }
        // Scientific notation: 1e3, 2.5E-2
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }

        let src = self.src;
        let literal = &src[start..self.pos];
        literal
            .parse::<f64>()
            .map_err(|_| self.fail(format!("invalid number '{literal}'")))
    }

    fn call(&mut self) -> LootResult<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let src = self.src;
        let name = &src[start..self.pos];

        if !self.eat('(') {
            return Err(self.fail(format!("unknown identifier '{name}'")));
        }
        let mut args = vec![self.expr()?];
        while self.eat(',') {
            args.push(self.expr()?);
        }
        if !self.eat(')') {
            return Err(self.fail("expected ')'"));
        }

        match (name, args.as_slice()) {
            ("min", [a, b]) => Ok(a.min(*b)),
            ("max", [a, b]) => Ok(a.max(*b)),
            ("abs", [x]) => Ok(x.abs()),
            ("floor", [x]) => Ok(x.floor()),
            ("ceil", [x]) => Ok(x.ceil()),
            ("round", [x]) => Ok(x.round()),
            ("sqrt", [x]) => Ok(x.sqrt()),
            _ => Err(self.fail(format!(
                "unknown function {name}/{}",
                args.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> f64 {
        evaluate(text).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("7 % 4"), 3.0);
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("  42 "), 42.0);
        assert_eq!(eval(".5 + 1.25"), 1.75);
        assert_eq!(eval("1e3"), 1000.0);
        assert_eq!(eval("2.5E-1 * 4"), 1.0);
        assert_eq!(eval("--3"), 3.0);
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("min(3, 5) + max(3, 5)"), 8.0);
        assert_eq!(eval("abs(-2.5) * floor(2.9)"), 5.0);
        assert_eq!(eval("round(2.5) + ceil(0.1) + sqrt(16)"), 8.0);
    }

    #[test]
    fn test_malformed_input_fails() {
        for bad in ["", "1 +", "(1 + 2", "1 2", "foo", "pow(2, 3)", "3 * * 2"] {
            assert!(
                matches!(evaluate(bad), Err(LootError::Evaluation { .. })),
                "{bad:?} should fail"
            );
        }
    }

    #[test]
    fn test_leftover_placeholder_fails() {
        let err = evaluate("{{group_a&b}} * 0.5").unwrap_err();
        assert!(matches!(err, LootError::Evaluation { ref reason, .. } if reason.contains("placeholder")));
        assert!(evaluate("{level} + 1").is_err());
        assert!(evaluate("%player_level% * 2").is_err());
    }

    #[test]
    fn test_division_by_zero_fails() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("5 % (2 - 2)").is_err());
    }

    #[test]
    fn test_deep_nesting_fails_without_overflow() {
        let parens = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = evaluate(&parens).unwrap_err();
        assert!(matches!(err, LootError::Evaluation { ref reason, .. } if reason.contains("nested too deeply")));

        let signs = format!("{}1", "-".repeat(200_000));
        assert!(evaluate(&signs).is_err());

        let calls = format!("{}1{}", "abs(".repeat(10_000), ")".repeat(10_000));
        assert!(evaluate(&calls).is_err());

        let powers = vec!["2"; 10_000].join("^");
        assert!(evaluate(&powers).is_err());
    }

    #[test]
    fn test_moderate_nesting_still_evaluates() {
        let text = format!("{}7{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(eval(&text), 7.0);
        assert_eq!(eval(&format!("{}7", "-".repeat(100))), 7.0);
    }

    #[test]
    fn test_deterministic() {
        let text = "max(1, 150.0 * 0.1) / 3 + 2";
        assert_eq!(evaluate(text), evaluate(text));
    }
}
