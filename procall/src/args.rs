//! Argument vector construction.
//!
//! Positional arguments are passed through verbatim. Named arguments become
//! flags: `v=true` turns into `-v`, `dry_run=true` into `--dry-run` and
//! `level=2` into the two tokens `--level 2`.

use std::fmt;

/// A named argument's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part: 1.0 renders as "1.0", not "1".
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Positional and named arguments for a single bake or call.
///
/// Named arguments are kept in insertion order, but callers should not rely
/// on any ordering between different keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<String>,
    named: Vec<(String, Value)>,
}

impl Args {
    /// An empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a positional argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Add multiple positional arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positional.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a named argument.
    pub fn named(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.push((key.into(), value.into()));
        self
    }

    /// Add a value-less flag; shorthand for `named(key, true)`.
    pub fn flag(self, key: impl Into<String>) -> Self {
        self.named(key, true)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Flatten into an argument vector.
    pub fn build(&self) -> Vec<String> {
        build_arguments(&self.positional, &self.named)
    }
}

/// Build an argument vector from positional and named parts.
pub fn build_arguments<S: AsRef<str>>(positional: &[S], named: &[(String, Value)]) -> Vec<String> {
    let mut args: Vec<String> = positional.iter().map(|a| a.as_ref().to_string()).collect();

    for (key, value) in named {
        args.push(flag_name(key));

        // `true` is enough on its own: verbose=true becomes --verbose
        if matches!(value, Value::Bool(true)) {
            continue;
        }

        args.push(value.to_string());
    }

    args
}

fn flag_name(key: &str) -> String {
    if key.chars().count() == 1 {
        format!("-{key}")
    } else {
        format!("--{}", key.replace('_', "-"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacent(args: &[String], first: &str, second: &str) -> bool {
        args.windows(2).any(|w| w[0] == first && w[1] == second)
    }

    #[test]
    fn test_positional_first_and_in_order() {
        let args = Args::new().arg("a").named("level", 2).arg("b").build();
        assert_eq!(&args[..2], ["a", "b"]);
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_float_keeps_fraction() {
        let args = Args::new().named("ratio", 1.0).named("scale", 0.25).build();
        assert_eq!(args, vec!["--ratio", "1.0", "--scale", "0.25"]);
    }

    #[test]
    fn test_single_char_flag() {
        let args = Args::new().flag("l").build();
        assert_eq!(args, vec!["-l"]);
    }

    #[test]
    fn test_single_char_with_value() {
        let args = Args::new().named("n", 5).build();
        assert_eq!(args, vec!["-n", "5"]);
    }

    #[test]
    fn test_long_flag_replaces_underscores() {
        let args = Args::new().flag("dry_run").build();
        assert_eq!(args, vec!["--dry-run"]);
    }

    #[test]
    fn test_long_key_with_value_is_two_tokens() {
        let args = Args::new()
            .named("please_forgive_me", "yes please")
            .flag("v")
            .build();
        assert!(adjacent(&args, "--please-forgive-me", "yes please"));
        assert!(args.contains(&"-v".to_string()));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_false_is_emitted_as_value() {
        let args = Args::new().named("color", false).build();
        assert_eq!(args, vec!["--color", "false"]);
    }

    #[test]
    fn test_numbers_are_stringified() {
        let args = Args::new().named("ratio", 0.5).named("depth", -3).build();
        assert!(adjacent(&args, "--ratio", "0.5"));
        assert!(adjacent(&args, "--depth", "-3"));
    }

    #[test]
    fn test_spaces_are_not_split() {
        let args = Args::new().arg("hello world").build();
        assert_eq!(args, vec!["hello world"]);
    }

    #[test]
    fn test_multibyte_single_char_key() {
        let args = Args::new().flag("é").build();
        assert_eq!(args, vec!["-é"]);
    }

    #[test]
    fn test_build_is_pure() {
        let args = Args::new().arg("x").named("key", "v");
        assert_eq!(args.build(), args.build());
    }
}
