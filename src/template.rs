//! Positional interpolation of path captures into response content.
//!
//! Templates use `{0}`, `{1}`, ... placeholders (or bare `{}` with automatic
//! numbering) and `{{` / `}}` to escape literal braces. JSON content is
//! interpolated recursively through nested objects and arrays; only string
//! values are rendered.

use crate::error::TemplateError;
use serde::ser::Error as _;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Serializer, Value};
use std::io;

#[derive(Clone, Copy, PartialEq)]
enum Numbering {
    Unset,
    Auto,
    Manual,
}

/// Render a text template against the ordered capture groups.
pub fn render_str(template: &str, groups: &[String]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut numbering = Numbering::Unset;
    let mut next_auto = 0usize;

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(TemplateError::UnmatchedBrace('{')),
                    }
                }
                let index = resolve_index(&field, &mut numbering, &mut next_auto)?;
                let value = groups.get(index).ok_or(TemplateError::IndexOutOfRange {
                    index,
                    available: groups.len(),
                })?;
                out.push_str(value);
            }
            '}' => return Err(TemplateError::UnmatchedBrace('}')),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

fn resolve_index(
    field: &str,
    numbering: &mut Numbering,
    next_auto: &mut usize,
) -> Result<usize, TemplateError> {
    if field.is_empty() {
        if *numbering == Numbering::Manual {
            return Err(TemplateError::MixedNumbering);
        }
        *numbering = Numbering::Auto;
        let index = *next_auto;
        *next_auto += 1;
        return Ok(index);
    }
    if *numbering == Numbering::Auto {
        return Err(TemplateError::MixedNumbering);
    }
    *numbering = Numbering::Manual;
    field
        .parse::<usize>()
        .map_err(|_| TemplateError::Field(field.to_string()))
}

/// Render a JSON template, substituting placeholders in every string value.
/// Non-string scalars pass through untouched.
pub fn render_value(value: &Value, groups: &[String]) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => Ok(Value::String(render_str(s, groups)?)),
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|v| render_value(v, groups))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) => {
            let mut rendered = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                rendered.insert(k.clone(), render_value(v, groups)?);
            }
            Ok(Value::Object(rendered))
        }
        _ => Ok(value.clone()),
    }
}

/// Compact JSON encoding with a space after `,` and `:`. Existing spec
/// files record body expectations in this exact encoding.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serialize a JSON value in the canonical spec encoding.
pub fn to_json_string(value: &Value) -> Result<String, serde_json::Error> {
    let mut out = Vec::with_capacity(128);
    let mut ser = Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut ser)?;
    String::from_utf8(out).map_err(|_| serde_json::Error::custom("encoded JSON is not UTF-8"))
}
