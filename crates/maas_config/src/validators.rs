//! Typed validators for individual configuration options.
//!
//! A validator converts between the raw value held by a backend and the
//! typed value callers work with. Every validator carries a default, so an
//! option can never be declared without one.

use crate::error::Invalid;
use regex::Regex;
use serde_json::Value;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Conversion rules between stored and typed values.
///
/// For every raw value accepted by [`Validator::to_typed`],
/// `to_raw(&to_typed(raw)?) == *raw`.
pub trait Validator {
    type Output;

    /// Validate raw stored data and convert it to the typed value.
    fn to_typed(&self, raw: &Value) -> Result<Self::Output, Invalid>;

    /// Convert a typed value back into its stored form.
    fn to_raw(&self, value: &Self::Output) -> Value;

    /// Value used when the backend has no entry.
    fn if_missing(&self) -> Self::Output;
}

/// A string option.
#[derive(Debug, Clone, Copy)]
pub struct UnicodeString {
    pub if_missing: &'static str,
}

impl Validator for UnicodeString {
    type Output = String;

    fn to_typed(&self, raw: &Value) -> Result<String, Invalid> {
        match raw {
            Value::String(s) => Ok(s.clone()),
            other => Err(Invalid::new(format!("The input must be a string (not {})", other))),
        }
    }

    fn to_raw(&self, value: &String) -> Value {
        Value::String(value.clone())
    }

    fn if_missing(&self) -> String {
        self.if_missing.to_string()
    }
}

/// An integer option with optional inclusive bounds.
#[derive(Debug, Clone, Copy)]
pub struct Int {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub if_missing: i64,
}

impl Int {
    pub(crate) fn check_range(&self, n: i64) -> Result<i64, Invalid> {
        if let Some(min) = self.min {
            if n < min {
                return Err(Invalid::new(format!(
                    "Please enter a number that is {} or greater",
                    min
                )));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return Err(Invalid::new(format!(
                    "Please enter a number that is {} or smaller",
                    max
                )));
            }
        }
        Ok(n)
    }
}

impl Validator for Int {
    type Output = i64;

    fn to_typed(&self, raw: &Value) -> Result<i64, Invalid> {
        let n = raw
            .as_i64()
            .ok_or_else(|| Invalid::new(format!("Please enter an integer value (not {})", raw)))?;
        self.check_range(n)
    }

    fn to_raw(&self, value: &i64) -> Value {
        Value::from(*value)
    }

    fn if_missing(&self) -> i64 {
        self.if_missing
    }
}

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?ix)
        ^(http|https)://
        (?:[%:\w]*@)?                                   # authenticator
        (?:                                             # ip or domain
          (?P<ip>(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}
              (?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?))
        | (?P<ipv6>\[?(?:[a-f0-9]{1,4}:){7}[a-f0-9]{1,4}\]?)
        | (?P<ipv6short>\[[a-f0-9:.]+\])
        | (?:[a-z0-9][a-z0-9\-]{0,62}\.)*               # subdomain
          (?P<tld>[a-z0-9\-]{1,63})                     # tld or hostname
        )
        (?::[0-9]{1,5})?                                # port
        (?P<path>/[a-z0-9\-._~:/?\#\[\]@!%$&'()*+,;=]*)?
        $"#,
    )
    .expect("URL pattern is valid")
});

/// A URL option.
///
/// Accepts http and https URLs whose host is an IPv4 literal, an IPv6
/// literal (bracketed, or unbracketed in full eight-group form), or a
/// hostname. Hostnames may be a single character or start with a digit.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedUrl {
    pub if_missing: &'static str,
}

impl ExtendedUrl {
    pub fn is_valid(url: &str) -> bool {
        match URL_RE.captures(url) {
            Some(caps) => match caps.name("ipv6short") {
                Some(m) => {
                    let inner = &m.as_str()[1..m.as_str().len() - 1];
                    inner.parse::<Ipv6Addr>().is_ok()
                }
                None => true,
            },
            None => false,
        }
    }
}

impl Validator for ExtendedUrl {
    type Output = String;

    fn to_typed(&self, raw: &Value) -> Result<String, Invalid> {
        let url = raw
            .as_str()
            .ok_or_else(|| Invalid::new(format!("The input must be a string (not {})", raw)))?;
        if Self::is_valid(url) {
            Ok(url.to_string())
        } else {
            Err(Invalid::new(format!("That is not a valid URL: {:?}", url)))
        }
    }

    fn to_raw(&self, value: &String) -> Value {
        Value::String(value.clone())
    }

    fn if_missing(&self) -> String {
        self.if_missing.to_string()
    }
}

/// A directory on the local filesystem. The directory must exist.
///
/// The default is returned as-is when nothing is stored, without checking
/// that it exists.
#[derive(Debug, Clone, Copy)]
pub struct Directory {
    pub if_missing: &'static str,
}

impl Validator for Directory {
    type Output = PathBuf;

    fn to_typed(&self, raw: &Value) -> Result<PathBuf, Invalid> {
        let path = raw
            .as_str()
            .ok_or_else(|| Invalid::new(format!("The input must be a string (not {})", raw)))?;
        if PathBuf::from(path).is_dir() {
            Ok(PathBuf::from(path))
        } else {
            Err(Invalid::new(format!("{:?} does not exist or is not a directory", path)))
        }
    }

    fn to_raw(&self, value: &PathBuf) -> Value {
        Value::String(value.to_string_lossy().into_owned())
    }

    fn if_missing(&self) -> PathBuf {
        PathBuf::from(self.if_missing)
    }
}
