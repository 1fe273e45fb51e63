use std::fmt;

/// Value types of the source language, as seen by the code generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Str,
    Void,
    Class(String),
}

impl Type {
    /// Field descriptor in the target VM encoding.
    pub fn descriptor(&self) -> String {
        match self {
            Type::Int => "I".to_owned(),
            Type::Float => "F".to_owned(),
            Type::Str => "Ljava/lang/String;".to_owned(),
            Type::Void => "V".to_owned(),
            Type::Class(name) => format!("L{name};"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Class(name) => write!(f, "{name}"),
        }
    }
}

/// Call-signature descriptor, e.g. `(IF)V`.
pub fn method_descriptor(ret: &Type, params: &[Type]) -> String {
    let params: String = params.iter().map(Type::descriptor).collect();
    format!("({params}){}", ret.descriptor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors() {
        assert_eq!(Type::Str.descriptor(), "Ljava/lang/String;");
        assert_eq!(Type::Class("Point".into()).descriptor(), "LPoint;");
        assert_eq!(
            method_descriptor(&Type::Void, &[Type::Int, Type::Float, Type::Str]),
            "(IFLjava/lang/String;)V"
        );
        assert_eq!(method_descriptor(&Type::Int, &[]), "()I");
    }
}
