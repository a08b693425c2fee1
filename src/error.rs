use std::error::Error;

/// Iterates over an error and its chain of sources.
pub struct ErrorStack<'a>(Option<&'a (dyn Error + 'static)>);

impl<'a> ErrorStack<'a> {
    pub fn new(value: &'a (dyn Error + 'static)) -> Self {
        ErrorStack(Some(value))
    }

    pub fn into_string(self) -> String {
        self.map(ToString::to_string).collect::<Vec<_>>().join("\n")
    }
}

impl<'a> Iterator for ErrorStack<'a> {
    type Item = &'a (dyn Error + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.0?;
        self.0 = current.source();
        Some(current)
    }
}
