//! Built-in template functions and request fields.

use super::json_path;
use super::RenderError;
use crate::config::ValueStore;
use crate::model::RequestContext;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde_json::Value;

/// Runtime value flowing through a template pipeline.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum TemplateValue {
    Nil,
    Str(String),
    Int(i64),
    Json(Value),
}

impl TemplateValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => TemplateValue::Nil,
            Value::String(s) => TemplateValue::Str(s.clone()),
            other => TemplateValue::Json(other.clone()),
        }
    }

    /// Text written to the output. Nil renders as nothing; structured JSON
    /// renders compactly.
    pub(super) fn render(&self) -> String {
        match self {
            TemplateValue::Nil => String::new(),
            TemplateValue::Str(s) => s.clone(),
            TemplateValue::Int(i) => i.to_string(),
            TemplateValue::Json(v) => v.to_string(),
        }
    }
}

pub(super) fn call(
    name: &str,
    args: Vec<TemplateValue>,
    ctx: &RequestContext,
    values: &ValueStore,
) -> Result<TemplateValue, RenderError> {
    match name {
        "uuid" => {
            arity(name, &args, 0)?;
            Ok(TemplateValue::Str(uuid::Uuid::new_v4().to_string()))
        }
        "now" => {
            arity(name, &args, 0)?;
            Ok(TemplateValue::Str(
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ))
        }
        "random" => {
            arity(name, &args, 2)?;
            let from = int_arg(name, &args[0])?;
            let to = int_arg(name, &args[1])?;
            Ok(TemplateValue::Int(random_inclusive(from, to)))
        }
        "reqHeader" => {
            arity(name, &args, 1)?;
            let header = str_arg(name, &args[0])?;
            Ok(TemplateValue::Str(
                ctx.header(&header).unwrap_or_default().to_string(),
            ))
        }
        "reqPathParam" => {
            arity(name, &args, 1)?;
            let index = int_arg(name, &args[0])?;
            let segment = usize::try_from(index)
                .ok()
                .and_then(|i| ctx.path_param(i))
                .unwrap_or_default();
            Ok(TemplateValue::Str(segment.to_string()))
        }
        "reqQueryParam" => {
            arity(name, &args, 1)?;
            let param = str_arg(name, &args[0])?;
            Ok(TemplateValue::Str(
                ctx.query_param(&param).unwrap_or_default().to_string(),
            ))
        }
        "reqBody" => {
            if args.len() > 1 {
                return Err(RenderError::Arity {
                    function: name.to_string(),
                    expected: 1,
                    got: args.len(),
                });
            }
            let path = match args.first() {
                Some(arg) => str_arg(name, arg)?,
                None => String::new(),
            };
            Ok(request_body(ctx, &path))
        }
        "config" => {
            arity(name, &args, 1)?;
            let key = str_arg(name, &args[0])?;
            Ok(TemplateValue::Str(values.get(&key).unwrap_or_default()))
        }
        other => Err(RenderError::UnknownFunction(other.to_string())),
    }
}

/// `.Method`, `.Path` and `.Body` of the request context.
pub(super) fn field(name: &str, ctx: &RequestContext) -> Result<TemplateValue, RenderError> {
    match name {
        "Method" => Ok(TemplateValue::Str(ctx.method.clone())),
        "Path" => Ok(TemplateValue::Str(ctx.path.clone())),
        "Body" => Ok(ctx
            .body_text()
            .map(TemplateValue::Str)
            .unwrap_or(TemplateValue::Nil)),
        other => Err(RenderError::UnknownField(other.to_string())),
    }
}

fn request_body(ctx: &RequestContext, path: &str) -> TemplateValue {
    match &ctx.body {
        None => TemplateValue::Nil,
        Some(Value::String(raw)) if path.is_empty() => TemplateValue::Str(raw.clone()),
        Some(Value::String(_)) => TemplateValue::Nil,
        Some(json) => json_path::navigate(json, path)
            .map(TemplateValue::from_json)
            .unwrap_or(TemplateValue::Nil),
    }
}

fn random_inclusive(from: i64, to: i64) -> i64 {
    if from >= to {
        return from;
    }
    rand::thread_rng().gen_range(from..=to)
}

fn arity(function: &str, args: &[TemplateValue], expected: usize) -> Result<(), RenderError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RenderError::Arity {
            function: function.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn str_arg(function: &str, arg: &TemplateValue) -> Result<String, RenderError> {
    match arg {
        TemplateValue::Str(s) => Ok(s.clone()),
        other => Err(RenderError::Argument {
            function: function.to_string(),
            message: format!("expected string, got {}", other.render()),
        }),
    }
}

fn int_arg(function: &str, arg: &TemplateValue) -> Result<i64, RenderError> {
    match arg {
        TemplateValue::Int(i) => Ok(*i),
        TemplateValue::Json(Value::Number(n)) if n.is_i64() => Ok(n.as_i64().unwrap_or_default()),
        other => Err(RenderError::Argument {
            function: function.to_string(),
            message: format!("expected integer, got '{}'", other.render()),
        }),
    }
}
