use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Int(i32),
    String(String),
    None,
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Int(i) => write!(f, "{}", i),
            Val::String(s) => write!(f, "{}", s),
            Val::None => write!(f, "None"),
        }
    }
}
