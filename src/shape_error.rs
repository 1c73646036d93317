/// A served page did not have the structure the flows rely on, which means
/// the portal changed or answered with an unexpected state.
#[derive(Debug)]
pub struct ShapeMismatchError {
    pub page: String,
    pub details: String,
}

impl ShapeMismatchError {
    pub fn new(page: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            details: details.into(),
        }
    }
}

impl std::fmt::Display for ShapeMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unexpected page shape at {}: {}", self.page, self.details)
    }
}

impl std::error::Error for ShapeMismatchError {}
