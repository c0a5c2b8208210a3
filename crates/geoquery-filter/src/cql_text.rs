//! Recursive-descent parser for CQL text (ECQL / CQL2 text subset)
//!
//! ```text
//! or        := and ( OR and )*
//! and       := not ( AND not )*
//! not       := NOT not | primary
//! primary   := '(' or ')' | spatial | predicate
//! predicate := field ( op literal | [NOT] LIKE str | ILIKE str
//!                    | [NOT] BETWEEN literal AND literal
//!                    | [NOT] IN '(' literal, ... ')' | IS [NOT] NULL )
//!            | literal op field
//! ```

use crate::lexer::{Lexer, Token, TokenKind};
use crate::resolve::{
    between, check_depth, check_nesting, check_relate_pattern, combine, comparison, in_list,
    number_literal, parse_date, parse_timestamp, spatial_operator,
};
use crate::{FilterContext, FilterDialect, FilterParser};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{
    BoundingBox, ComparisonOperator, Crs, Distance, DistanceUnit, FilterExpression, Geometry,
    Literal, LogicalOperator, SpatialFilter, SpatialPredicate,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CqlTextParser;

impl FilterParser for CqlTextParser {
    fn dialect(&self) -> FilterDialect {
        FilterDialect::CqlText
    }

    fn parse(&self, input: &str, ctx: &FilterContext<'_>) -> Result<FilterExpression> {
        let mut parser = Parser::new(input, ctx)?;
        let expression = parser.or_expr()?;
        if parser.current.kind != TokenKind::Eof {
            return Err(parser.unexpected("end of filter"));
        }
        check_depth(&expression, &ctx.limits)?;
        Ok(expression)
    }
}

const RESERVED: &[&str] = &["AND", "OR", "NOT", "LIKE", "ILIKE", "BETWEEN", "IN", "IS", "NULL"];

const WKT_TAGS: &[&str] = &[
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
    "SRID",
];

struct Parser<'a, 'c> {
    lexer: Lexer<'a>,
    current: Token,
    ctx: &'c FilterContext<'c>,
    nesting: usize,
}

impl<'a, 'c> Parser<'a, 'c> {
    fn new(input: &'a str, ctx: &'c FilterContext<'c>) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current, ctx, nesting: 0 })
    }

    fn advance(&mut self) -> Result<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn peek(&self) -> Result<Token> {
        self.lexer.clone().next_token()
    }

    fn unexpected(&self, expected: &str) -> GeoqueryError {
        GeoqueryError::parse(format!("Expected {}", expected), self.current.locator())
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        if self.current.kind != kind {
            return Err(self.unexpected(expected));
        }
        self.advance()
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if !self.current.is_keyword(keyword) {
            return Err(self.unexpected(keyword));
        }
        self.advance()?;
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.nesting += 1;
        check_nesting(self.nesting, &self.ctx.limits, self.current.locator())
    }

    fn or_expr(&mut self) -> Result<FilterExpression> {
        let mut operands = vec![self.and_expr()?];
        while self.current.is_keyword("OR") {
            self.advance()?;
            operands.push(self.and_expr()?);
        }
        Ok(combine(LogicalOperator::Or, operands))
    }

    fn and_expr(&mut self) -> Result<FilterExpression> {
        let mut operands = vec![self.not_expr()?];
        while self.current.is_keyword("AND") {
            self.advance()?;
            operands.push(self.not_expr()?);
        }
        Ok(combine(LogicalOperator::And, operands))
    }

    fn not_expr(&mut self) -> Result<FilterExpression> {
        if self.current.is_keyword("NOT") {
            self.advance()?;
            self.enter()?;
            let inner = self.not_expr()?;
            self.nesting -= 1;
            return Ok(FilterExpression::not(inner));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<FilterExpression> {
        if self.current.kind == TokenKind::LParen {
            self.advance()?;
            self.enter()?;
            let inner = self.or_expr()?;
            self.nesting -= 1;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(inner);
        }

        if let TokenKind::Word(word) = &self.current.kind {
            if self.peek()?.kind == TokenKind::LParen {
                if let Some((predicate, negated)) = spatial_operator(word) {
                    return self.spatial(predicate, negated);
                }
            }
        }

        if self.starts_literal() {
            return self.reversed_comparison();
        }
        self.predicate()
    }

    fn starts_literal(&self) -> bool {
        match &self.current.kind {
            TokenKind::Str(_) | TokenKind::Number(_) => true,
            TokenKind::Word(_) => ["TRUE", "FALSE", "TIMESTAMP", "DATE"]
                .iter()
                .any(|k| self.current.is_keyword(k)),
            _ => false,
        }
    }

    /// `field` or `"quoted field"`, returning the name and its locator
    fn field_name(&mut self) -> Result<(String, String)> {
        let locator = self.current.locator();
        match &self.current.kind {
            TokenKind::Word(word)
                if !RESERVED.iter().any(|r| word.eq_ignore_ascii_case(r)) =>
            {
                let name = word.clone();
                self.advance()?;
                Ok((name, locator))
            }
            TokenKind::QuotedIdent(name) => {
                let name = name.clone();
                self.advance()?;
                Ok((name, locator))
            }
            _ => Err(self.unexpected("field name")),
        }
    }

    fn operator(&mut self) -> Result<Option<ComparisonOperator>> {
        let operator = match self.current.kind {
            TokenKind::Op("=") => ComparisonOperator::Equal,
            TokenKind::Op("<>") => ComparisonOperator::NotEqual,
            TokenKind::Op("<") => ComparisonOperator::LessThan,
            TokenKind::Op("<=") => ComparisonOperator::LessThanOrEqual,
            TokenKind::Op(">") => ComparisonOperator::GreaterThan,
            TokenKind::Op(">=") => ComparisonOperator::GreaterThanOrEqual,
            _ => return Ok(None),
        };
        self.advance()?;
        Ok(Some(operator))
    }

    fn predicate(&mut self) -> Result<FilterExpression> {
        let (name, locator) = self.field_name()?;
        let fields = self.ctx.fields;

        if let Some(operator) = self.operator()? {
            let field = fields.property(&name, locator)?;
            let value = self.literal()?;
            return comparison(field, operator, value);
        }

        if self.current.is_keyword("IS") {
            self.advance()?;
            let negated = self.current.is_keyword("NOT");
            if negated {
                self.advance()?;
            }
            self.expect_keyword("NULL")?;
            let field = fields.resolve(&name, locator)?;
            return Ok(FilterExpression::IsNull { field: field.name.clone(), negated });
        }

        let negated = self.current.is_keyword("NOT");
        if negated {
            self.advance()?;
        }

        let field = fields.property(&name, locator)?;
        let expression = if self.current.is_keyword("LIKE") || self.current.is_keyword("ILIKE") {
            let operator = if self.current.is_keyword("LIKE") {
                ComparisonOperator::Like
            } else {
                ComparisonOperator::ILike
            };
            self.advance()?;
            let pattern = self.literal()?;
            comparison(field, operator, pattern)?
        } else if self.current.is_keyword("BETWEEN") {
            self.advance()?;
            let lower = self.literal()?;
            self.expect_keyword("AND")?;
            let upper = self.literal()?;
            between(field, lower, upper)?
        } else if self.current.is_keyword("IN") {
            let in_locator = self.current.locator();
            self.advance()?;
            self.expect(TokenKind::LParen, "'('")?;
            let mut values = vec![self.literal()?];
            while self.current.kind == TokenKind::Comma {
                self.advance()?;
                values.push(self.literal()?);
                if values.len() > self.ctx.limits.max_in_values {
                    break;
                }
            }
            if values.len() <= self.ctx.limits.max_in_values {
                self.expect(TokenKind::RParen, "')'")?;
            }
            in_list(field, values, &self.ctx.limits, in_locator)?
        } else {
            return Err(self.unexpected("comparison operator"));
        };

        Ok(if negated { FilterExpression::not(expression) } else { expression })
    }

    /// `literal op field`, normalized to `field flipped-op literal`
    fn reversed_comparison(&mut self) -> Result<FilterExpression> {
        let value = self.literal()?;
        let operator = self.operator()?.ok_or_else(|| self.unexpected("comparison operator"))?;
        let (name, locator) = self.field_name()?;
        let field = self.ctx.fields.property(&name, locator)?;
        comparison(field, operator.flipped(), value)
    }

    fn literal(&mut self) -> Result<Literal> {
        let token = self.current.clone();
        let locator = token.locator();
        let literal = match &token.kind {
            TokenKind::Str(s) => Literal::String(s.clone()),
            TokenKind::Number(n) => number_literal(n, locator)?,
            TokenKind::Word(_) if token.is_keyword("TRUE") => Literal::Boolean(true),
            TokenKind::Word(_) if token.is_keyword("FALSE") => Literal::Boolean(false),
            TokenKind::Word(_) if token.is_keyword("TIMESTAMP") || token.is_keyword("DATE") => {
                self.advance()?;
                self.expect(TokenKind::LParen, "'('")?;
                let raw = match &self.current.kind {
                    TokenKind::Str(s) => s.clone(),
                    _ => return Err(self.unexpected("quoted date/time")),
                };
                let inner = self.current.locator();
                self.advance()?;
                if self.current.kind != TokenKind::RParen {
                    return Err(self.unexpected("')'"));
                }
                if token.is_keyword("DATE") {
                    Literal::DateTime(parse_date(&raw, inner)?)
                } else {
                    Literal::DateTime(parse_timestamp(&raw, inner)?)
                }
            }
            _ => return Err(self.unexpected("literal value")),
        };
        self.advance()?;
        Ok(literal)
    }

    fn number(&mut self) -> Result<f64> {
        match self.literal()? {
            Literal::Integer(i) => Ok(i as f64),
            Literal::Double(d) => Ok(d),
            _ => Err(GeoqueryError::parse("Expected a number", self.current.locator())),
        }
    }

    fn comma(&mut self) -> Result<()> {
        self.expect(TokenKind::Comma, "','")?;
        Ok(())
    }

    fn spatial(&mut self, predicate: SpatialPredicate, negated: bool) -> Result<FilterExpression> {
        let operator = self.advance()?;
        self.expect(TokenKind::LParen, "'('")?;
        let (name, locator) = self.field_name()?;
        let field = self.ctx.fields.geometry(Some(&name), locator)?;
        self.comma()?;

        let filter = match predicate {
            SpatialPredicate::BBox => {
                let min_x = self.number()?;
                self.comma()?;
                let min_y = self.number()?;
                self.comma()?;
                let max_x = self.number()?;
                self.comma()?;
                let max_y = self.number()?;
                let crs = if self.current.kind == TokenKind::Comma {
                    self.advance()?;
                    let locator = self.current.locator();
                    match self.literal()? {
                        Literal::String(raw) => Some(Crs::parse(&raw).map_err(|e| {
                            GeoqueryError::parse(e.to_string(), locator)
                        })?),
                        _ => return Err(GeoqueryError::parse("Expected CRS string", locator)),
                    }
                } else {
                    None
                };
                let bbox = BoundingBox::new(min_x, min_y, max_x, max_y)?;
                let default = crs.or(self.ctx.geometry.default_crs()).unwrap_or_else(Crs::wgs84);
                let geometry = self.ctx.geometry.accept(Geometry::envelope(&bbox, default))?.geometry;
                SpatialFilter::new(SpatialPredicate::BBox, field.name.clone(), geometry)
            }
            SpatialPredicate::DWithin => {
                let geometry = self.geometry()?;
                self.comma()?;
                let value = self.number()?;
                self.comma()?;
                let unit_locator = self.current.locator();
                let token = match &self.current.kind {
                    TokenKind::Word(w) | TokenKind::Str(w) => w.clone(),
                    _ => return Err(self.unexpected("distance unit")),
                };
                self.advance()?;
                let unit = DistanceUnit::from_token(&token).ok_or_else(|| {
                    GeoqueryError::parse(format!("Unknown distance unit '{}'", token), unit_locator)
                })?;
                SpatialFilter::dwithin(field.name.clone(), geometry, Distance::new(value, unit))
            }
            SpatialPredicate::Relate => {
                let geometry = self.geometry()?;
                self.comma()?;
                let locator = self.current.locator();
                let pattern = match self.literal()? {
                    Literal::String(p) => check_relate_pattern(&p, locator)?,
                    _ => return Err(GeoqueryError::parse("Expected DE-9IM pattern string", locator)),
                };
                SpatialFilter::relate(field.name.clone(), geometry, pattern)
            }
            other => SpatialFilter::new(other, field.name.clone(), self.geometry()?),
        };

        self.expect(TokenKind::RParen, "')'")?;
        tracing::debug!(operator = %operator.locator(), field = %filter.field, "Parsed spatial predicate");

        let expression = FilterExpression::Spatial(filter);
        Ok(if negated { FilterExpression::not(expression) } else { expression })
    }

    /// WKT literal or `ENVELOPE(west, east, north, south)`
    fn geometry(&mut self) -> Result<Geometry> {
        let token = self.current.clone();
        let TokenKind::Word(word) = &token.kind else {
            return Err(self.unexpected("geometry literal"));
        };

        if word.eq_ignore_ascii_case("ENVELOPE") {
            self.advance()?;
            self.expect(TokenKind::LParen, "'('")?;
            let west = self.number()?;
            self.comma()?;
            let east = self.number()?;
            self.comma()?;
            let north = self.number()?;
            self.comma()?;
            let south = self.number()?;
            self.expect(TokenKind::RParen, "')'")?;
            let bbox = BoundingBox::new(west, south, east, north)?;
            let crs = self.ctx.geometry.default_crs().unwrap_or_else(Crs::wgs84);
            return Ok(self.ctx.geometry.accept(Geometry::envelope(&bbox, crs))?.geometry);
        }

        if !WKT_TAGS.iter().any(|tag| word.eq_ignore_ascii_case(tag)) {
            return Err(self.unexpected("geometry literal"));
        }

        let raw = self.lexer.balanced_from(token.offset)?;
        self.current = self.lexer.next_token()?;
        let parsed = self.ctx.geometry.parse_wkt(raw).map_err(|e| match e {
            GeoqueryError::Parse { message, .. } => GeoqueryError::parse(message, token.locator()),
            other => other,
        })?;
        Ok(parsed.geometry)
    }
}
