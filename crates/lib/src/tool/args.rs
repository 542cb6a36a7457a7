//! Command-line handling for the converter's argument string.
//!
//! The invoker never validates the string. On Windows it is handed to the
//! process verbatim; elsewhere it is split into argv the way a Windows command
//! line would be read: whitespace separates arguments, double quotes group, and
//! `\"` is a literal quote.

/// Split an argument string into individual arguments.
pub fn split_arguments(arguments: &str) -> Vec<String> {
  let mut args = Vec::new();
  let mut current = String::new();
  let mut in_arg = false;
  let mut quoted = false;
  let mut chars = arguments.chars().peekable();

  while let Some(c) = chars.next() {
    match c {
      '\\' if chars.peek() == Some(&'"') => {
        current.push('"');
        chars.next();
        in_arg = true;
      }
      '"' => {
        quoted = !quoted;
        in_arg = true;
      }
      c if c.is_whitespace() && !quoted => {
        if in_arg {
          args.push(std::mem::take(&mut current));
          in_arg = false;
        }
      }
      c => {
        current.push(c);
        in_arg = true;
      }
    }
  }

  if in_arg {
    args.push(current);
  }
  args
}

/// Quote `value` so [`split_arguments`] yields it back as a single argument.
pub fn quote_argument(value: &str) -> String {
  if !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '"') {
    return value.to_string();
  }
  format!("\"{}\"", value.replace('"', "\\\""))
}
