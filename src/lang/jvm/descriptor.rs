/// JVM field and method descriptors
use super::ClassFormatError;
use std::fmt;

const MAX_ARRAY_DIMENSIONS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// One of `B C D F I J S Z`
    Base(char),
    /// Internal class name, `java/lang/String`
    Object(String),
    Array(Box<FieldType>),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(c) => write!(f, "{}", c),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(inner) => write!(f, "[{}", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `V`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, ClassFormatError> {
        let bad = || ClassFormatError::Descriptor(descriptor.to_string());
        let rest = descriptor.strip_prefix('(').ok_or_else(bad)?;
        let (params_part, ret_part) = rest.split_once(')').ok_or_else(bad)?;

        let mut params = Vec::new();
        let mut cursor = params_part;
        while !cursor.is_empty() {
            let (field, next) = parse_field(cursor).ok_or_else(bad)?;
            params.push(field);
            cursor = next;
        }

        let ret = if ret_part == "V" {
            None
        } else {
            match parse_field(ret_part) {
                Some((field, "")) => Some(field),
                _ => return Err(bad()),
            }
        };
        Ok(Self { params, ret })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        match &self.ret {
            Some(ret) => write!(f, "){}", ret),
            None => write!(f, ")V"),
        }
    }
}

/// Parse one field type from the front of `input`, returning the rest.
fn parse_field(input: &str) -> Option<(FieldType, &str)> {
    let dims = input.bytes().take_while(|b| *b == b'[').count();
    if dims > MAX_ARRAY_DIMENSIONS {
        return None;
    }
    let rest = &input[dims..];
    let first = rest.chars().next()?;

    let (mut field, rest) = match first {
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => (FieldType::Base(first), &rest[1..]),
        'L' => {
            let end = rest.find(';')?;
            let name = &rest[1..end];
            if !is_class_name(name) {
                return None;
            }
            (FieldType::Object(name.to_string()), &rest[end + 1..])
        }
        _ => return None,
    };

    for _ in 0..dims {
        field = FieldType::Array(Box::new(field));
    }
    Some((field, rest))
}

fn is_class_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('/')
            .all(|part| !part.is_empty() && !part.contains(['.', ';', '[']))
}

/// Class named by a `CONSTANT_Class` entry, looking through array types.
///
/// `java/io/File` → `java/io/File`, `[[Ljava/io/File;` → `java/io/File`, `[I` → none.
pub fn referenced_class(name: &str) -> Option<&str> {
    if !name.starts_with('[') {
        return Some(name);
    }
    let element = name.trim_start_matches('[');
    element.strip_prefix('L')?.strip_suffix(';')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_required_descriptor() {
        let d = MethodDescriptor::parse("(Lcom/ttsudio/alphaback/State;)Ljava/util/List;").unwrap();
        assert_eq!(d.arity(), 1);
        assert_eq!(
            d.params[0],
            FieldType::Object("com/ttsudio/alphaback/State".to_string())
        );
        assert_eq!(d.ret, Some(FieldType::Object("java/util/List".to_string())));
    }

    #[test]
    fn test_parse_mixed() {
        let d = MethodDescriptor::parse("(I[[JLjava/lang/String;Z)V").unwrap();
        assert_eq!(d.arity(), 4);
        assert_eq!(d.ret, None);
        assert_eq!(d.to_string(), "(I[[JLjava/lang/String;Z)V");
    }

    #[test]
    fn test_reject_malformed() {
        for bad in ["", "()", "(V)V", "(L;)V", "(Ljava/lang/String)V", "(I)VV", "I)V", "(Q)V"] {
            assert!(MethodDescriptor::parse(bad).is_err(), "{}", bad);
        }
        let deep = format!("({}I)V", "[".repeat(256));
        assert!(MethodDescriptor::parse(&deep).is_err());
    }

    #[test]
    fn test_referenced_class() {
        assert_eq!(referenced_class("java/io/File"), Some("java/io/File"));
        assert_eq!(referenced_class("[Ljava/io/File;"), Some("java/io/File"));
        assert_eq!(referenced_class("[[Ljava/net/URL;"), Some("java/net/URL"));
        assert_eq!(referenced_class("[I"), None);
    }
}
