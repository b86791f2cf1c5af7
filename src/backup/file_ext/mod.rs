use std::sync::Arc;

/// Suffix appended to artifact names produced through a given component.
pub trait FileExtProvider {
    fn file_ext(&self) -> Option<Arc<str>>;
}
