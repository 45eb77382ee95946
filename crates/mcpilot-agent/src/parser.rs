//! Response parser for the single-line instruction grammar.
//!
//! ```text
//! FUNCTION_CALL: <name>|<arg1>|<arg2>|...
//! FINAL_ANSWER: <value>
//! ERROR: <message>
//! UNCERTAIN: <message>
//! ```
//!
//! Arguments are split on `|` with no escaping, so an argument cannot
//! contain a literal `|`.

use mcpilot_core::{Error, Instruction, Result};

/// Parse one model response into an [`Instruction`].
///
/// Surrounding whitespace is ignored. Anything else that is not exactly one
/// grammar line fails with `Error::MalformedResponse`.
pub fn parse(raw: &str) -> Result<Instruction> {
    let line = raw.trim();

    if line.is_empty() {
        return Err(Error::malformed("empty response", raw));
    }
    if line.contains(['\n', '\r']) {
        return Err(Error::malformed("response spans multiple lines", raw));
    }

    let Some((keyword, body)) = line.split_once(':') else {
        return Err(Error::malformed("missing 'KEYWORD:' prefix", raw));
    };
    let body = body.trim();

    match keyword {
        "FUNCTION_CALL" => {
            let mut parts = body.split('|');
            let name = parts.next().unwrap_or_default().trim();
            if name.is_empty() {
                return Err(Error::malformed("FUNCTION_CALL without a function name", raw));
            }
            if name.contains(char::is_whitespace) {
                return Err(Error::malformed(
                    format!("function name '{name}' contains whitespace"),
                    raw,
                ));
            }
            Ok(Instruction::FunctionCall {
                name: name.to_string(),
                args: parts.map(str::to_string).collect(),
            })
        }
        "FINAL_ANSWER" => {
            if body.is_empty() {
                return Err(Error::malformed("FINAL_ANSWER without a value", raw));
            }
            Ok(Instruction::FinalAnswer {
                value: body.to_string(),
            })
        }
        "ERROR" => Ok(Instruction::Error {
            message: body.to_string(),
        }),
        "UNCERTAIN" => Ok(Instruction::Uncertain {
            message: body.to_string(),
        }),
        other => Err(Error::malformed(format!("unknown keyword '{other}'"), raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[&str]) -> Instruction {
        Instruction::FunctionCall {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn assert_malformed(raw: &str) {
        match parse(raw) {
            Err(Error::MalformedResponse { raw: kept, .. }) => assert_eq!(kept, raw),
            other => panic!("expected MalformedResponse for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn function_call_with_args() {
        assert_eq!(parse("FUNCTION_CALL: add|2|3").unwrap(), call("add", &["2", "3"]));
    }

    #[test]
    fn function_call_without_args() {
        assert_eq!(parse("FUNCTION_CALL: open_paint").unwrap(), call("open_paint", &[]));
    }

    #[test]
    fn function_call_keeps_args_as_written() {
        assert_eq!(
            parse("FUNCTION_CALL: send_email|a@b.com|Hello there|[1,2]").unwrap(),
            call("send_email", &["a@b.com", "Hello there", "[1,2]"])
        );
        assert_eq!(parse("FUNCTION_CALL: f||x").unwrap(), call("f", &["", "x"]));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            parse("  \n FINAL_ANSWER: 42 \n").unwrap(),
            Instruction::FinalAnswer { value: "42".into() }
        );
    }

    #[test]
    fn final_answer_value_is_verbatim() {
        assert_eq!(
            parse("FINAL_ANSWER: [42]").unwrap(),
            Instruction::FinalAnswer { value: "[42]".into() }
        );
        assert_eq!(
            parse("FINAL_ANSWER: a: b | c").unwrap(),
            Instruction::FinalAnswer { value: "a: b | c".into() }
        );
    }

    #[test]
    fn error_and_uncertain() {
        assert_eq!(
            parse("ERROR: INVALID_INPUT|Number too large").unwrap(),
            Instruction::Error {
                message: "INVALID_INPUT|Number too large".into()
            }
        );
        assert_eq!(
            parse("UNCERTAIN: AMBIGUOUS|which account?").unwrap(),
            Instruction::Uncertain {
                message: "AMBIGUOUS|which account?".into()
            }
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        for line in [
            "FUNCTION_CALL: add|2|3",
            "FINAL_ANSWER: 42",
            "ERROR: TOOL_FAILURE|boom",
            "UNCERTAIN: AMBIGUOUS|x",
        ] {
            assert_eq!(parse(line).unwrap().to_string(), line);
        }
    }

    #[test]
    fn rejects_empty() {
        assert_malformed("");
        assert_malformed("   \n\t ");
    }

    #[test]
    fn rejects_multiple_lines() {
        assert_malformed("FUNCTION_CALL: add|2|3\nFINAL_ANSWER: 5");
        assert_malformed("Let me think.\nFINAL_ANSWER: 5");
    }

    #[test]
    fn rejects_unknown_keyword() {
        assert_malformed("ANSWER: 42");
        assert_malformed("final_answer: 42");
    }

    #[test]
    fn rejects_missing_colon() {
        assert_malformed("FINAL_ANSWER 42");
        assert_malformed("The answer is 42");
    }

    #[test]
    fn rejects_keyword_with_spaces_or_prefix() {
        assert_malformed("FINAL_ANSWER : 42");
        assert_malformed("Answer -> FINAL_ANSWER: 42");
    }

    #[test]
    fn rejects_bad_function_name() {
        assert_malformed("FUNCTION_CALL: |2|3");
        assert_malformed("FUNCTION_CALL:");
        assert_malformed("FUNCTION_CALL: add two|2");
    }

    #[test]
    fn rejects_empty_final_answer() {
        assert_malformed("FINAL_ANSWER:");
    }
}
