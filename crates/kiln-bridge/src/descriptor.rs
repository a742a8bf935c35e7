use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A reference to a backend object: a dotted module path, optionally followed by `:` and a dotted
/// attribute chain, e.g. `flit_core.buildapi` or `backend:api.v2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendDescriptor {
    module_path: String,
    attribute_chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("The module path is empty")]
    EmptyModulePath,
    #[error("The module path contains an empty segment")]
    EmptyModuleSegment,
    #[error("The attribute chain after `:` is empty")]
    EmptyAttributeChain,
    #[error("The attribute chain contains an empty segment")]
    EmptyAttributeSegment,
    #[error("Descriptors can't contain whitespace")]
    Whitespace,
    #[error("Descriptors can contain at most one `:`")]
    RepeatedSeparator,
}

impl BackendDescriptor {
    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn attribute_chain(&self) -> &[String] {
        &self.attribute_chain
    }
}

impl FromStr for BackendDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.chars().any(char::is_whitespace) {
            return Err(DescriptorError::Whitespace);
        }
        if s.matches(':').count() > 1 {
            return Err(DescriptorError::RepeatedSeparator);
        }

        let (module_path, attributes) = match s.split_once(':') {
            Some((module_path, attributes)) => (module_path, Some(attributes)),
            None => (s, None),
        };

        if module_path.is_empty() {
            return Err(DescriptorError::EmptyModulePath);
        }
        if module_path.split('.').any(str::is_empty) {
            return Err(DescriptorError::EmptyModuleSegment);
        }

        let attribute_chain = match attributes {
            None => Vec::new(),
            Some("") => return Err(DescriptorError::EmptyAttributeChain),
            Some(attributes) => {
                if attributes.split('.').any(str::is_empty) {
                    return Err(DescriptorError::EmptyAttributeSegment);
                }
                attributes.split('.').map(ToString::to_string).collect()
            }
        };

        Ok(Self {
            module_path: module_path.to_string(),
            attribute_chain,
        })
    }
}

impl Display for BackendDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.module_path)?;
        if !self.attribute_chain.is_empty() {
            write!(f, ":{}", self.attribute_chain.join("."))?;
        }
        Ok(())
    }
}
