use std::borrow::Cow;
use std::fmt;

/// Internal (`/`-separated) name of a class or interface ([JVMS 4.2.1][0])
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.1
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: &str) -> Result<(), String>;

    fn as_str(&self) -> &str;

    fn from_string(name: String) -> Result<Self, String>;

    fn from_str(name: &str) -> Result<Self, String> {
        Self::from_string(name.to_owned())
    }
}

impl Name for BinaryName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("class name is empty"));
        }
        let bad_segment = name
            .split('/')
            .any(|segment| segment.is_empty() || segment.contains(&['.', ';', '['][..]));
        if bad_segment {
            Err(format!("'{}' is not a valid class name", name))
        } else {
            Ok(())
        }
    }

    fn as_str(&self) -> &str {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl fmt::Debug for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl BinaryName {
    pub const OBJECT: BinaryName = BinaryName(Cow::Borrowed("java/lang/Object"));
    pub const STRING: BinaryName = BinaryName(Cow::Borrowed("java/lang/String"));

    /// Last segment of the name, without the package or any enclosing classes
    ///
    /// `java/util/Map$Entry` has a short name of `Entry`.
    pub fn short_name(&self) -> &str {
        let simple = self.as_str().rsplit('/').next().unwrap_or("");
        simple.rsplit('$').next().unwrap_or(simple)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binary_names() {
        assert!(BinaryName::from_str("java/lang/Object").is_ok());
        assert!(BinaryName::from_str("I").is_ok());
        assert!(BinaryName::from_str("").is_err());
        assert!(BinaryName::from_str("java//Object").is_err());
        assert!(BinaryName::from_str("java.lang.Object").is_err());
        assert!(BinaryName::from_str("[I").is_err());
        assert_eq!(BinaryName::OBJECT.to_string(), "java/lang/Object");
        assert_eq!(
            BinaryName::from_str("java/util/Map$Entry").unwrap().short_name(),
            "Entry"
        );
        assert_eq!(BinaryName::STRING.short_name(), "String");
    }
}
