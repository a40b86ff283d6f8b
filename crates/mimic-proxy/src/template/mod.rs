//! Dynamic template rendering for mock responses and injected proxy headers.
//!
//! Text outside `{{ ... }}` is copied verbatim. An action is a pipeline of
//! commands separated by `|`; the result of each command is passed as the last
//! argument of the next one. Operands are string literals (`"..."` or
//! `` `raw` ``), integers, request fields (`.Method`, `.Path`, `.Body`),
//! parenthesized pipelines and function names.
//!
//! | Function | Result |
//! |---|---|
//! | `uuid` | fresh v4 UUID |
//! | `now` | current time, RFC 3339 |
//! | `random from to` | integer in `from..=to`, or `from` when `from >= to` |
//! | `reqHeader name` | first header value, case-insensitive |
//! | `reqPathParam index` | zero-based path segment |
//! | `reqQueryParam name` | first query value |
//! | `reqBody path` | value at `a.b[2].c` in the JSON body, or the raw text body for `""` |
//! | `config key` | value from the configured value store |
//!
//! `{{-` and `-}}` trim adjacent whitespace; `{{/* ... */}}` is a comment.
//! Absent values render as the empty string.

mod functions;
mod json_path;
mod lexer;

use crate::config::ValueStore;
use crate::model::RequestContext;
use functions::TemplateValue;
use lexer::{Segment, Token};
use std::sync::Arc;
use tracing::warn;

pub use json_path::navigate as navigate_json;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("template syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown field '.{0}'")]
    UnknownField(String),
    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("{function}: {message}")]
    Argument { function: String, message: String },
}

/// Renders templates against a request and the shared value store.
#[derive(Clone, Default)]
pub struct Renderer {
    values: Arc<ValueStore>,
}

impl Renderer {
    pub fn new(values: Arc<ValueStore>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &Arc<ValueStore> {
        &self.values
    }

    pub fn render(&self, template: &str, ctx: &RequestContext) -> Result<String, RenderError> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }

        let mut out = String::with_capacity(template.len());
        for segment in lexer::split(template)? {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Action { body, offset } => {
                    let tokens = lexer::tokenize(body, offset)?;
                    let pipeline = Parser::new(tokens, offset).parse()?;
                    out.push_str(&self.eval_pipeline(&pipeline, ctx)?.render());
                }
            }
        }
        Ok(out)
    }

    /// Render, falling back to the literal template on failure.
    pub fn render_or_literal(&self, template: &str, ctx: &RequestContext) -> String {
        match self.render(template, ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(path = %ctx.path, "Template render failed, using literal text: {}", e);
                template.to_string()
            }
        }
    }

    fn eval_pipeline(
        &self,
        pipeline: &[Command],
        ctx: &RequestContext,
    ) -> Result<TemplateValue, RenderError> {
        let mut piped = None;
        for command in pipeline {
            piped = Some(self.eval_command(command, piped, ctx)?);
        }
        Ok(piped.unwrap_or(TemplateValue::Nil))
    }

    fn eval_command(
        &self,
        command: &Command,
        piped: Option<TemplateValue>,
        ctx: &RequestContext,
    ) -> Result<TemplateValue, RenderError> {
        match command.operands.split_first() {
            Some((Operand::Ident(name), rest)) => {
                let mut args = rest
                    .iter()
                    .map(|operand| self.eval_operand(operand, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                args.extend(piped);
                functions::call(name, args, ctx, &self.values)
            }
            Some((operand, [])) if piped.is_none() => self.eval_operand(operand, ctx),
            _ => Err(RenderError::Syntax {
                offset: command.offset,
                message: "can't give argument to non-function".into(),
            }),
        }
    }

    fn eval_operand(
        &self,
        operand: &Operand,
        ctx: &RequestContext,
    ) -> Result<TemplateValue, RenderError> {
        match operand {
            Operand::Ident(name) => functions::call(name, Vec::new(), ctx, &self.values),
            Operand::Field(name) => functions::field(name, ctx),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Sub(pipeline) => self.eval_pipeline(pipeline, ctx),
        }
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Ident(String),
    Field(String),
    Literal(TemplateValue),
    Sub(Vec<Command>),
}

#[derive(Debug, Clone)]
struct Command {
    operands: Vec<Operand>,
    offset: usize,
}

struct Parser {
    tokens: std::vec::IntoIter<Token>,
    offset: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, offset: usize) -> Self {
        Self {
            tokens: tokens.into_iter(),
            offset,
        }
    }

    fn parse(mut self) -> Result<Vec<Command>, RenderError> {
        self.pipeline(false)
    }

    fn pipeline(&mut self, nested: bool) -> Result<Vec<Command>, RenderError> {
        let mut commands = Vec::new();
        let mut operands = Vec::new();

        loop {
            match self.tokens.next() {
                None if nested => return Err(self.error("unclosed '('")),
                None => break,
                Some(Token::RParen) if nested => break,
                Some(Token::RParen) => return Err(self.error("unexpected ')'")),
                Some(Token::Pipe) => {
                    if operands.is_empty() {
                        return Err(self.error("missing command before '|'"));
                    }
                    commands.push(self.command(std::mem::take(&mut operands)));
                }
                Some(Token::LParen) => operands.push(Operand::Sub(self.pipeline(true)?)),
                Some(Token::Ident(name)) => operands.push(Operand::Ident(name)),
                Some(Token::Field(name)) => operands.push(Operand::Field(name)),
                Some(Token::Str(s)) => operands.push(Operand::Literal(TemplateValue::Str(s))),
                Some(Token::Int(i)) => operands.push(Operand::Literal(TemplateValue::Int(i))),
            }
        }

        if operands.is_empty() {
            return Err(self.error("missing command"));
        }
        commands.push(self.command(operands));
        Ok(commands)
    }

    fn command(&self, operands: Vec<Operand>) -> Command {
        Command {
            operands,
            offset: self.offset,
        }
    }

    fn error(&self, message: &str) -> RenderError {
        RenderError::Syntax {
            offset: self.offset,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;

    fn renderer() -> Renderer {
        let values = ValueStore::default();
        values.insert("TOKEN", "t0k3n");
        values.insert("HEADER_NAME", "x-user");
        Renderer::new(Arc::new(values))
    }

    fn ctx() -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("x-user", "ada".parse().unwrap());
        RequestContext::new(
            "POST",
            "/orders/77",
            Some("lang=en"),
            &headers,
            br#"{"order": {"items": [{"sku": "A1"}, {"sku": "B2"}]}, "total": 30}"#,
        )
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(renderer().render("no actions here", &ctx()).unwrap(), "no actions here");
    }

    #[test]
    fn test_request_functions() {
        let out = renderer()
            .render(
                r#"{"user": "{{ reqHeader "X-User" }}", "id": "{{ reqPathParam 1 }}", "lang": "{{reqQueryParam "lang"}}", "sku": "{{ reqBody "order.items[1].sku" }}", "total": {{ reqBody "total" }}}"#,
                &ctx(),
            )
            .unwrap();
        assert_eq!(
            out,
            r#"{"user": "ada", "id": "77", "lang": "en", "sku": "B2", "total": 30}"#
        );
    }

    #[test]
    fn test_structured_body_value_renders_as_json() {
        let out = renderer().render(r#"{{ reqBody "order.items[0]" }}"#, &ctx()).unwrap();
        assert_eq!(out, r#"{"sku":"A1"}"#);
    }

    #[test]
    fn test_missing_body_path_renders_empty() {
        let out = renderer().render(r#"[{{ reqBody "order.nope" }}]"#, &ctx()).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_config_and_fields() {
        let out = renderer()
            .render("Bearer {{ config \"TOKEN\" }} {{ .Method }} {{.Path}}", &ctx())
            .unwrap();
        assert_eq!(out, "Bearer t0k3n POST /orders/77");
    }

    #[test]
    fn test_generated_values() {
        let r = renderer();
        let id = r.render("{{ uuid }}", &ctx()).unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_ne!(id, r.render("{{ uuid }}", &ctx()).unwrap());

        let now = r.render("{{ now }}", &ctx()).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());

        let n: i64 = r.render("{{ random 10 20 }}", &ctx()).unwrap().parse().unwrap();
        assert!((10..=20).contains(&n));
        assert_eq!(r.render("{{ random 5 1 }}", &ctx()).unwrap(), "5");
    }

    #[test]
    fn test_pipelines_and_parentheses() {
        let r = renderer();
        assert_eq!(r.render(r#"{{ "x-user" | reqHeader }}"#, &ctx()).unwrap(), "ada");
        assert_eq!(
            r.render(r#"{{ reqHeader (config "HEADER_NAME") }}"#, &ctx()).unwrap(),
            "ada"
        );
    }

    #[test]
    fn test_trim_and_comments() {
        let out = renderer()
            .render("a  {{- /* dropped */ -}}  b {{- \" c\" }}", &ctx())
            .unwrap();
        assert_eq!(out, "ab c");
    }

    #[test]
    fn test_errors() {
        let r = renderer();
        assert!(matches!(r.render("{{ nope }}", &ctx()), Err(RenderError::UnknownFunction(_))));
        assert!(matches!(r.render("{{ .Nope }}", &ctx()), Err(RenderError::UnknownField(_))));
        assert!(matches!(r.render("{{ }}", &ctx()), Err(RenderError::Syntax { .. })));
        assert!(matches!(r.render("{{ uuid", &ctx()), Err(RenderError::Syntax { .. })));
        assert!(matches!(r.render("{{ \"a\" \"b\" }}", &ctx()), Err(RenderError::Syntax { .. })));
        assert!(matches!(r.render("{{ (uuid }}", &ctx()), Err(RenderError::Syntax { .. })));
        assert!(matches!(
            r.render("{{ reqPathParam \"x\" }}", &ctx()),
            Err(RenderError::Argument { .. })
        ));
    }

    #[test]
    fn test_render_or_literal_falls_back() {
        let template = "value: {{ broken(";
        assert_eq!(renderer().render_or_literal(template, &ctx()), template);
    }
}
