//! Positional argument coercion.
//!
//! The parser hands over raw string tokens; here they are zipped with the
//! tool's declared parameters and converted to JSON values of the declared
//! type just before invocation.

use serde_json::{Map, Number, Value};

use mcpilot_core::{Error, ParamSpec, ParamType, Result, ToolDescriptor};

/// Coerce raw positional tokens into a named argument map.
///
/// Tokens are trimmed. A missing required argument, a surplus non-empty
/// token, or a value that does not fit its declared type is
/// `Error::ParameterType`. Missing optional arguments are left out.
pub fn coerce_args(tool: &ToolDescriptor, raw: &[String]) -> Result<Map<String, Value>> {
    if let Some(extra) = raw
        .iter()
        .skip(tool.parameters.len())
        .find(|t| !t.trim().is_empty())
    {
        return Err(Error::ParameterType {
            tool: tool.name.clone(),
            parameter: format!("#{}", tool.parameters.len() + 1),
            expected: format!("at most {} argument(s)", tool.parameters.len()),
            value: extra.clone(),
            reason: format!("{} takes {} argument(s), got {}", tool.signature(), tool.parameters.len(), raw.len()),
        });
    }

    let mut args = Map::new();
    for (i, param) in tool.parameters.iter().enumerate() {
        let token = raw.get(i).map(|t| t.trim());

        let token = match token {
            Some(t) if !(t.is_empty() && !param.required && param.param_type != ParamType::String) => t,
            Some(_) => continue,
            None if param.required => {
                return Err(type_error(tool, param, "", "missing required argument".into()));
            }
            None => continue,
        };

        let value =
            coerce_value(&param.param_type, token).map_err(|reason| type_error(tool, param, token, reason))?;
        args.insert(param.name.clone(), value);
    }

    Ok(args)
}

fn type_error(tool: &ToolDescriptor, param: &ParamSpec, value: &str, reason: String) -> Error {
    Error::ParameterType {
        tool: tool.name.clone(),
        parameter: param.name.clone(),
        expected: param.param_type.to_string(),
        value: value.to_string(),
        reason,
    }
}

/// Convert one trimmed token to `ty`. The error is a short reason.
fn coerce_value(ty: &ParamType, token: &str) -> std::result::Result<Value, String> {
    match ty {
        ParamType::String | ParamType::Other(_) => Ok(Value::String(token.to_string())),
        ParamType::Integer => token
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| e.to_string()),
        ParamType::Number => {
            let n = token.parse::<f64>().map_err(|e| e.to_string())?;
            Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| "not a finite number".to_string())
        }
        ParamType::Boolean => match token.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err("expected true/false".to_string()),
        },
        ParamType::Array(items) => {
            let inner = token
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .unwrap_or(token)
                .trim();
            if inner.is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            inner
                .split(',')
                .map(|element| {
                    let element = element.trim();
                    coerce_value(items, element).map_err(|e| format!("element '{element}': {e}"))
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        ParamType::Object => match serde_json::from_str::<Value>(token) {
            Ok(v @ Value::Object(_)) => Ok(v),
            Ok(_) => Err("expected a JSON object".to_string()),
            Err(e) => Err(e.to_string()),
        },
    }
}
