/// Controls how conflicting registrations are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// When true, a duplicate or non-positive id fails the build instead of
    /// being skipped with a warning.
    pub reject_duplicates: bool,
}

impl RegistryConfig {
    /// Configuration that fails the build on any conflicting registration.
    pub fn strict() -> Self {
        Self {
            reject_duplicates: true,
        }
    }
}
